//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use eventing_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Backend port
pub use crate::backend::{Backend, BackendError, DeliveryHealth, ResolvedType, SyncReport};

// Reconciler types
pub use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};

// Collaborator seams
pub use crate::controller::apirule::{ApiRuleManager, ApiRuleStore, RouteError, RouteSettings};
pub use crate::controller::events::EventPublisher;
pub use crate::controller::sink::{ServiceRegistry, SinkError, SinkTarget};
pub use crate::controller::store::{StoreError, SubscriptionStore};

// Config types
pub use crate::config::{BackendKind, ControllerConfig, ServerConfig};
