//! # Backend Port
//!
//! Contract shared by the event-delivery backends. The reconciler only ever talks to
//! a [`Backend`]; which implementation is used is decided once at startup.
//!
//! - [`stream::StreamBackend`] keeps one durable consumer per event type on a stream
//! - [`eventmesh::EventMeshBackend`] keeps one subscription per Subscription on a remote event mesh

pub mod cleaner;
pub mod eventmesh;
pub mod stream;

use crate::backend::cleaner::CleanError;
use crate::crd::Subscription;
use async_trait::async_trait;
use thiserror::Error;

/// An event type resolved for a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    /// As written in `spec.types`
    pub original_type: String,
    /// Normalised by the cleaner (unchanged for exact matching)
    pub clean_type: String,
    /// Backend native subject
    pub subject: String,
}

/// Delivery health reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryHealth {
    Healthy,
    Failing(String),
}

/// Outcome of a successful sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// The backend reports the subscription as active
    pub active: bool,
    pub delivery: DeliveryHealth,
}

impl SyncReport {
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            active: true,
            delivery: DeliveryHealth::Healthy,
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// Created but not yet visible; heals on its own
    #[error("backend subscription for subject {subject} is not yet available")]
    MissingSubscription { subject: String },
    #[error(transparent)]
    Clean(#[from] CleanError),
    #[error("subject {subject} exceeds the limit of {limit} segments")]
    SubjectTooLong { subject: String, limit: usize },
    #[error("invalid config {key}: {value}")]
    InvalidConfig { key: String, value: String },
    #[error("backend transport error: {0}")]
    Transport(String),
    #[error("backend rejected credentials: {0}")]
    Unauthorized(String),
    #[error("backend returned unexpected status {code}: {message}")]
    UnexpectedStatus { code: u16, message: String },
    #[error("subscription not active after {0}s")]
    ActivationTimeout(u64),
    /// The public webhook URL has not been computed yet
    #[error("external sink of subscription {0} is not known yet")]
    ExternalSinkUnknown(String),
}

impl BackendError {
    /// The known eventual-consistency race
    #[must_use]
    pub fn is_missing_subscription(&self) -> bool {
        matches!(self, BackendError::MissingSubscription { .. })
    }

    /// Errors no retry can fix without a spec change
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            BackendError::Clean(_)
                | BackendError::SubjectTooLong { .. }
                | BackendError::InvalidConfig { .. }
        )
    }
}

/// An event-delivery backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short identifier used in logs and metrics
    fn name(&self) -> &'static str;

    /// Deterministic mapping of `spec.source` and `spec.types` to backend subjects.
    ///
    /// # Errors
    /// Returns an error when a type cannot be cleaned or the subject is not allowed.
    fn resolve_types(&self, sub: &Subscription) -> Result<Vec<ResolvedType>, BackendError>;

    /// Make the backend match the Subscription. Records backend state in `sub.status.backend`.
    ///
    /// Calling this twice with unchanged input performs no writes against the backend.
    ///
    /// # Errors
    /// [`BackendError::MissingSubscription`] when created resources are not yet visible,
    /// other variants for transport, auth or input problems.
    async fn sync_subscription(&self, sub: &mut Subscription) -> Result<SyncReport, BackendError>;

    /// Remove everything the backend holds for the Subscription. Absence is success.
    ///
    /// # Errors
    /// Returns an error when the backend cannot be reached.
    async fn delete_subscription(&self, sub: &Subscription) -> Result<(), BackendError>;
}

/// `maxInFlightMessages` of a Subscription, falling back to the controller default
///
/// # Errors
/// Returns [`BackendError::InvalidConfig`] when the value is not an integer.
pub fn max_in_flight(sub: &Subscription, default: i64) -> Result<i64, BackendError> {
    match sub.spec.max_in_flight_messages() {
        None => Ok(default),
        Some(Ok(value)) => Ok(value),
        Some(Err(_)) => Err(BackendError::InvalidConfig {
            key: crate::constants::MAX_IN_FLIGHT_MESSAGES_KEY.to_string(),
            value: sub
                .spec
                .config
                .get(crate::constants::MAX_IN_FLIGHT_MESSAGES_KEY)
                .cloned()
                .unwrap_or_default(),
        }),
    }
}
