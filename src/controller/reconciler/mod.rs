//! # Reconciler
//!
//! Brings one Subscription in line with its backend and routing resources.
//!
//! - `types`: the shared context and error classification
//! - `reconcile`: the live pipeline
//! - `deletion`: the finalizer protocol
//! - `status`: condition updates and the gated status write

mod deletion;
mod reconcile;
pub mod status;
mod types;

pub use reconcile::reconcile;
pub use types::{Reconciler, ReconcilerError};
