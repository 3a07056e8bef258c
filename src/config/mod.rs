//! # Configuration
//!
//! Controller and server settings, read once at startup from environment variables.

mod controller;
mod server;

pub use controller::{BackendKind, ControllerConfig, EventMeshConfig, StreamConfig};
pub use server::ServerConfig;
