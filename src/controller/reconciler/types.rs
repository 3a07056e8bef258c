//! # Types
//!
//! Core types for the reconciler.

use crate::backend::{Backend, BackendError};
use crate::config::ControllerConfig;
use crate::controller::apirule::{ApiRuleManager, RouteError};
use crate::controller::backoff::BackoffState;
use crate::controller::events::EventPublisher;
use crate::controller::sink::{ServiceRegistry, SinkError};
use crate::controller::store::{StoreError, SubscriptionStore};
use crate::observability::metrics;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// How a failed reconcile is retried
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Only a spec change can fix it
    #[error("{0}")]
    Permanent(String),
    /// Retried with per-resource backoff
    #[error("{0}")]
    Transient(String),
    /// Lost an optimistic-concurrency race, retried immediately
    #[error("{0}")]
    Conflict(String),
}

impl ReconcilerError {
    /// Label used for metrics and logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcilerError::Permanent(_) => "permanent",
            ReconcilerError::Transient(_) => "transient",
            ReconcilerError::Conflict(_) => "conflict",
        }
    }
}

impl From<StoreError> for ReconcilerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => ReconcilerError::Conflict(err.to_string()),
            other => ReconcilerError::Transient(other.to_string()),
        }
    }
}

impl From<RouteError> for ReconcilerError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::Conflict(_) | RouteError::ConflictRetriesExhausted { .. } => {
                ReconcilerError::Conflict(err.to_string())
            }
            RouteError::Api(_) => ReconcilerError::Transient(err.to_string()),
        }
    }
}

impl From<BackendError> for ReconcilerError {
    fn from(err: BackendError) -> Self {
        if err.is_permanent() {
            ReconcilerError::Permanent(err.to_string())
        } else {
            ReconcilerError::Transient(err.to_string())
        }
    }
}

impl From<SinkError> for ReconcilerError {
    fn from(err: SinkError) -> Self {
        if err.is_transient() {
            ReconcilerError::Transient(err.to_string())
        } else {
            ReconcilerError::Permanent(err.to_string())
        }
    }
}

/// Shared reconcile context, one per process
pub struct Reconciler<B> {
    pub backend: B,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub routes: ApiRuleManager,
    pub services: Arc<dyn ServiceRegistry>,
    pub events: Arc<dyn EventPublisher>,
    pub config: ControllerConfig,
    // Backoff state per resource (namespace/name), driven by the error policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    ready: Mutex<HashSet<String>>,
}

impl<B: Backend> std::fmt::Debug for Reconciler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("backend", &self.backend.name())
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> Reconciler<B> {
    pub fn new(
        backend: B,
        subscriptions: Arc<dyn SubscriptionStore>,
        routes: ApiRuleManager,
        services: Arc<dyn ServiceRegistry>,
        events: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            backend,
            subscriptions,
            routes,
            services,
            events,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            ready: Mutex::new(HashSet::new()),
        }
    }

    /// Forget the error history of `key` after a successful reconcile
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(key) {
                state.reset();
            }
        }
    }

    /// Drop all per-resource state of `key`
    pub fn forget(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
        self.record_ready(key, false);
    }

    /// Track readiness of `key` and publish the number of ready Subscriptions
    pub fn record_ready(&self, key: &str, ready: bool) {
        if let Ok(mut keys) = self.ready.lock() {
            if ready {
                keys.insert(key.to_string());
            } else {
                keys.remove(key);
            }
            metrics::set_subscriptions_ready(i64::try_from(keys.len()).unwrap_or(i64::MAX));
        }
    }

    /// Number of Subscriptions last seen ready
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.ready.lock().map(|keys| keys.len()).unwrap_or_default()
    }
}
