//! Eventing Controller Library
//!
//! Reconciles event Subscriptions against a stream or event-mesh backend and the shared
//! APIRules exposing subscriber services to webhook delivery.
//!
//! ## Quick Start
//!
//! ```rust
//! use eventing_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod backend;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;
pub mod webhook;
