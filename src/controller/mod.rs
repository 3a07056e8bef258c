//! # Controller
//!
//! Core controller modules for the eventing controller.
//!
//! - `apirule`: shared APIRule lifecycle
//! - `backoff`: exponential backoff for retries
//! - `events`: Kubernetes events on Subscriptions
//! - `reconciler`: core reconciliation logic
//! - `sink`: sink resolution and lookup
//! - `store`: Subscription reads and writes

pub mod apirule;
pub mod backoff;
pub mod events;
pub mod reconciler;
pub mod sink;
pub mod store;
