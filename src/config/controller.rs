//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Event-delivery backend selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Stream,
    EventMesh,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stream" | "nats" => Ok(BackendKind::Stream),
            "eventmesh" | "event-mesh" | "beb" => Ok(BackendKind::EventMesh),
            other => Err(format!("unknown backend '{other}', expected 'stream' or 'eventmesh'")),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Stream => write!(f, "stream"),
            BackendKind::EventMesh => write!(f, "eventmesh"),
        }
    }
}

/// Stream backend connection settings
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub stream_name: String,
    /// Subjects consumers push to, one per consumer below this prefix
    pub deliver_prefix: String,
}

/// Event-mesh connection and subscription settings
#[derive(Clone)]
pub struct EventMeshConfig {
    pub messaging_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Event source registered on remote subscriptions
    pub namespace: String,
    pub qos: String,
    pub content_mode: String,
    pub exempt_handshake: bool,
    /// Credentials the mesh uses to call webhooks; webhook auth is disabled when empty
    pub webhook_client_id: String,
    pub webhook_client_secret: String,
    pub webhook_token_url: String,
    pub activation_timeout_secs: u64,
}

impl std::fmt::Debug for EventMeshConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMeshConfig")
            .field("messaging_url", &self.messaging_url)
            .field("token_url", &self.token_url)
            .field("namespace", &self.namespace)
            .field("qos", &self.qos)
            .field("content_mode", &self.content_mode)
            .field("exempt_handshake", &self.exempt_handshake)
            .field("activation_timeout_secs", &self.activation_timeout_secs)
            .finish_non_exhaustive()
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub backend: BackendKind,
    /// Exponential backoff starting value (milliseconds)
    /// Initial delay before retrying after an error
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value (milliseconds)
    /// Maximum delay between retries
    pub backoff_max_ms: u64,
    /// Requeue delay when a backend subscription is not yet visible (seconds)
    pub missing_subscription_requeue_secs: u64,
    /// Requeue delay while a backend subscription is not yet active (seconds)
    pub inactive_requeue_secs: u64,
    /// Periodic resync of healthy subscriptions (seconds)
    pub resync_interval_secs: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Prefix of every backend subject
    pub event_type_prefix: String,
    /// Domain APIRule hosts are created under
    pub domain: String,
    /// Gateway APIRules are attached to
    pub gateway: String,
    /// JWKS URL configured on the webhook access strategy
    pub jwks_url: String,
    /// Delivery concurrency when a Subscription does not set one
    pub max_in_flight_default: i64,
    pub stream: StreamConfig,
    pub event_mesh: EventMeshConfig,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable color in text format logs
    pub log_enable_color: bool,
    /// Maximum concurrent reconciliations
    /// Limits how many resources can be reconciled simultaneously
    pub max_concurrent_reconciliations: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            backend: BackendKind::Stream,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            missing_subscription_requeue_secs: DEFAULT_MISSING_SUBSCRIPTION_REQUEUE_SECS,
            inactive_requeue_secs: DEFAULT_INACTIVE_REQUEUE_SECS,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            event_type_prefix: DEFAULT_EVENT_TYPE_PREFIX.to_string(),
            domain: "example.com".to_string(),
            gateway: "octopilot-system/octopilot-gateway".to_string(),
            jwks_url: String::new(),
            max_in_flight_default: 10,
            stream: StreamConfig {
                url: "nats://eventing-nats.octopilot-system.svc.cluster.local:4222".to_string(),
                stream_name: "octopilot".to_string(),
                deliver_prefix: "octopilot.deliver".to_string(),
            },
            event_mesh: EventMeshConfig {
                messaging_url: String::new(),
                token_url: String::new(),
                client_id: String::new(),
                client_secret: String::new(),
                namespace: String::new(),
                qos: "AT_LEAST_ONCE".to_string(),
                content_mode: "BINARY".to_string(),
                exempt_handshake: true,
                webhook_client_id: String::new(),
                webhook_client_secret: String::new(),
                webhook_token_url: String::new(),
                activation_timeout_secs: DEFAULT_ACTIVATION_TIMEOUT_SECS,
            },
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            log_enable_color: false,
            max_concurrent_reconciliations: 10,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        let defaults = Self::default();
        Self {
            backend: env_var_or_default("BACKEND", defaults.backend),
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            missing_subscription_requeue_secs: env_var_or_default(
                "MISSING_SUBSCRIPTION_REQUEUE_SECS",
                DEFAULT_MISSING_SUBSCRIPTION_REQUEUE_SECS,
            ),
            inactive_requeue_secs: env_var_or_default(
                "INACTIVE_REQUEUE_SECS",
                DEFAULT_INACTIVE_REQUEUE_SECS,
            ),
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            event_type_prefix: env_var_or_default_str("EVENT_TYPE_PREFIX", DEFAULT_EVENT_TYPE_PREFIX),
            domain: env_var_or_default_str("DOMAIN", &defaults.domain),
            gateway: env_var_or_default_str("GATEWAY", &defaults.gateway),
            jwks_url: env_var_or_default_str("JWKS_URL", ""),
            max_in_flight_default: env_var_or_default(
                "MAX_IN_FLIGHT_DEFAULT",
                defaults.max_in_flight_default,
            ),
            stream: StreamConfig {
                url: env_var_or_default_str("NATS_URL", &defaults.stream.url),
                stream_name: env_var_or_default_str("STREAM_NAME", &defaults.stream.stream_name),
                deliver_prefix: env_var_or_default_str(
                    "STREAM_DELIVER_PREFIX",
                    &defaults.stream.deliver_prefix,
                ),
            },
            event_mesh: EventMeshConfig {
                messaging_url: env_var_or_default_str("EVENT_MESH_URL", ""),
                token_url: env_var_or_default_str("EVENT_MESH_TOKEN_URL", ""),
                client_id: env_var_or_default_str("EVENT_MESH_CLIENT_ID", ""),
                client_secret: env_var_or_default_str("EVENT_MESH_CLIENT_SECRET", ""),
                namespace: env_var_or_default_str("EVENT_MESH_NAMESPACE", ""),
                qos: env_var_or_default_str("EVENT_MESH_QOS", &defaults.event_mesh.qos),
                content_mode: env_var_or_default_str(
                    "EVENT_MESH_CONTENT_MODE",
                    &defaults.event_mesh.content_mode,
                ),
                exempt_handshake: env_var_or_default_bool("EVENT_MESH_EXEMPT_HANDSHAKE", true),
                webhook_client_id: env_var_or_default_str("EVENT_MESH_WEBHOOK_CLIENT_ID", ""),
                webhook_client_secret: env_var_or_default_str(
                    "EVENT_MESH_WEBHOOK_CLIENT_SECRET",
                    "",
                ),
                webhook_token_url: env_var_or_default_str("EVENT_MESH_WEBHOOK_TOKEN_URL", ""),
                activation_timeout_secs: env_var_or_default(
                    "ACTIVATION_TIMEOUT_SECS",
                    DEFAULT_ACTIVATION_TIMEOUT_SECS,
                ),
            },
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            log_enable_color: env_var_or_default_bool("LOG_ENABLE_COLOR", false),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
        }
    }

    pub fn missing_subscription_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.missing_subscription_requeue_secs)
    }

    pub fn inactive_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.inactive_requeue_secs)
    }

    pub fn resync_interval_duration(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    /// Get backoff start duration
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff max duration
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
