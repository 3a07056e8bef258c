//! # Eventing Controller
//!
//! Kubernetes controller reconciling Subscriptions against the configured backend.
//!
//! All settings come from environment variables (see [`ControllerConfig::from_env`]);
//! the flags below override the most common ones.

use anyhow::Result;
use clap::Parser;
use eventing_controller::config::{BackendKind, ControllerConfig, ServerConfig};
use eventing_controller::runtime::initialization::{
    event_mesh_backend, initialize, reconciler, stream_backend,
};
use eventing_controller::runtime::watch_loop::run_watch_loop;
use std::sync::Arc;
use tracing::info;

/// Eventing controller
#[derive(Debug, Parser)]
#[command(name = "eventing-controller", version, about, long_about = None)]
struct Args {
    /// Backend to reconcile against (stream or eventmesh), overrides BACKEND
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Port of the metrics and probe server, overrides METRICS_PORT
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut controller_config = ControllerConfig::from_env();
    let mut server_config = ServerConfig::from_env();
    if let Some(backend) = args.backend {
        controller_config.backend = backend;
    }
    if let Some(port) = args.metrics_port {
        server_config.metrics_port = port;
    }

    let init = initialize(controller_config, server_config).await?;
    let config = init.controller_config.clone();

    match config.backend {
        BackendKind::Stream => {
            let backend = stream_backend(&config).await?;
            let reconciler = Arc::new(reconciler(&init.client, backend, config));
            run_watch_loop(init.client, reconciler, init.server_state).await?;
        }
        BackendKind::EventMesh => {
            let backend = event_mesh_backend(&config)?;
            let reconciler = Arc::new(reconciler(&init.client, backend, config));
            run_watch_loop(init.client, reconciler, init.server_state).await?;
        }
    }

    info!("Controller stopped");
    Ok(())
}
