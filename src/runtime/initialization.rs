//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics, server
//! startup, Kubernetes client setup and backend construction.

use crate::backend::cleaner::CharsetCleaner;
use crate::backend::eventmesh::{
    EventMeshBackend, EventMeshCredentials, EventMeshRestClient, EventMeshSettings, WebhookAuth,
};
use crate::backend::stream::nats::NatsStreamClient;
use crate::backend::stream::{StreamBackend, StreamSettings};
use crate::backend::Backend;
use crate::config::{ControllerConfig, ServerConfig};
use crate::constants::CONTROLLER_NAME;
use crate::controller::apirule::{ApiRuleManager, KubeApiRuleStore, RouteSettings};
use crate::controller::events::KubeEventPublisher;
use crate::controller::reconciler::Reconciler;
use crate::controller::sink::KubeServiceRegistry;
use crate::controller::store::KubeSubscriptionStore;
use crate::observability;
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub controller_config: ControllerConfig,
    pub server_config: ServerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field(
                "server_ready",
                &self
                    .server_state
                    .is_ready
                    .load(std::sync::atomic::Ordering::Relaxed),
            )
            .field("backend", &self.controller_config.backend)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
pub async fn initialize(
    controller_config: ControllerConfig,
    server_config: ServerConfig,
) -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    init_tracing(&controller_config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %controller_config.backend,
        "Starting eventing controller"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    info!("Controller initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        server_state,
        controller_config,
        server_config,
    })
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `LOG_LEVEL`. `LOG_FORMAT=json` switches to structured output.
pub fn init_tracing(config: &ControllerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "eventing_controller={}",
            config.log_level.to_lowercase()
        ))
    });

    let result = if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_ansi(config.log_enable_color)
            .with_env_filter(filter)
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Stream backend bound to the configured JetStream stream
///
/// # Errors
/// Returns an error when the server cannot be reached or the stream does not exist.
pub async fn stream_backend(
    config: &ControllerConfig,
) -> Result<StreamBackend<NatsStreamClient>> {
    let client = NatsStreamClient::connect(
        &config.stream.url,
        &config.stream.stream_name,
        &config.stream.deliver_prefix,
    )
    .await?;
    Ok(StreamBackend::new(
        client,
        Box::new(CharsetCleaner::for_stream()?),
        StreamSettings {
            prefix: config.event_type_prefix.clone(),
            default_max_in_flight: config.max_in_flight_default,
        },
    ))
}

/// Event-mesh backend talking to the configured messaging endpoint
///
/// # Errors
/// Returns an error when the credentials are incomplete or the HTTP client cannot be built.
pub fn event_mesh_backend(
    config: &ControllerConfig,
) -> Result<EventMeshBackend<EventMeshRestClient>> {
    let mesh = &config.event_mesh;
    if mesh.messaging_url.is_empty() || mesh.token_url.is_empty() || mesh.client_id.is_empty() {
        anyhow::bail!("EVENT_MESH_URL, EVENT_MESH_TOKEN_URL and EVENT_MESH_CLIENT_ID must be set");
    }
    let client = EventMeshRestClient::new(EventMeshCredentials {
        messaging_url: mesh.messaging_url.clone(),
        token_url: mesh.token_url.clone(),
        client_id: mesh.client_id.clone(),
        client_secret: mesh.client_secret.clone(),
    })?;
    let webhook_auth = (!mesh.webhook_client_id.is_empty()).then(|| WebhookAuth {
        type_: "oauth2".to_string(),
        grant_type: "client_credentials".to_string(),
        client_id: mesh.webhook_client_id.clone(),
        client_secret: mesh.webhook_client_secret.clone(),
        token_url: mesh.webhook_token_url.clone(),
    });
    Ok(EventMeshBackend::new(
        client,
        Box::new(CharsetCleaner::for_event_mesh()?),
        EventMeshSettings {
            prefix: config.event_type_prefix.clone(),
            namespace: mesh.namespace.clone(),
            qos: mesh.qos.clone(),
            content_mode: mesh.content_mode.clone(),
            exempt_handshake: mesh.exempt_handshake,
            webhook_auth,
            activation_timeout: Duration::from_secs(mesh.activation_timeout_secs),
        },
    ))
}

/// Reconciler wired to the cluster API
pub fn reconciler<B: Backend>(
    client: &Client,
    backend: B,
    config: ControllerConfig,
) -> Reconciler<B> {
    let subscriptions = Arc::new(KubeSubscriptionStore::new(client.clone()));
    let routes = ApiRuleManager::new(
        Arc::new(KubeApiRuleStore::new(client.clone())),
        subscriptions.clone(),
        RouteSettings {
            domain: config.domain.clone(),
            gateway: config.gateway.clone(),
            jwks_url: config.jwks_url.clone(),
        },
    );
    Reconciler::new(
        backend,
        subscriptions,
        routes,
        Arc::new(KubeServiceRegistry::new(client.clone())),
        Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME)),
        config,
    )
}
