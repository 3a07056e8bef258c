//! # Runtime
//!
//! Process-level wiring around the reconciler.
//!
//! - `initialization`: tracing, metrics, probe server, client and backend construction
//! - `watch_loop`: the controller stream over Subscriptions and APIRules
//! - `error_policy`: requeue decisions for failed reconciles and watch errors

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
