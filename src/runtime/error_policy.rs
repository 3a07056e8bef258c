//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::backend::Backend;
use crate::controller::backoff::BackoffState;
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::Subscription;
use crate::observability::metrics;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Map a failed reconcile to the next action
///
/// - permanent errors wait for the Subscription to change
/// - conflicts are retried right away against the latest version
/// - everything else backs off per resource, doubling up to the configured maximum
pub fn handle_reconciliation_error<B: Backend>(
    obj: Arc<Subscription>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler<B>>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        error.kind = error.kind(),
        error = %error
    );
    let _error_guard = error_span.enter();

    metrics::increment_reconciliation_errors();

    match error {
        ReconcilerError::Permanent(_) => {
            warn!("Reconciliation failed permanently, waiting for a spec change");
            Action::await_change()
        }
        ReconcilerError::Conflict(_) => {
            info!("Conflicting update, retrying against the latest version");
            metrics::increment_requeues("conflict");
            Action::requeue(Duration::ZERO)
        }
        ReconcilerError::Transient(_) => {
            let resource_key = format!("{namespace}/{name}");
            let (delay, error_count) = match ctx.backoff_states.lock() {
                Ok(mut states) => {
                    let state = states.entry(resource_key).or_insert_with(|| {
                        BackoffState::new(
                            ctx.config.backoff_start_duration(),
                            ctx.config.backoff_max_duration(),
                        )
                    });
                    state.increment_error();
                    (state.backoff.next_backoff(), state.error_count)
                }
                Err(e) => {
                    warn!("Failed to lock backoff_states: {}, using maximum backoff", e);
                    (ctx.config.backoff_max_duration(), 0)
                }
            };

            error!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error_count, "Reconciliation error, retrying with backoff"
            );
            metrics::increment_requeues("error-backoff");
            Action::requeue(delay)
        }
    }
}

/// Watch error categories that need distinct handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    NotFound,
    Unauthorized,
    Expired,
    Throttled,
    Other,
}

/// Classify a watch stream error from its rendered form
///
/// 404 is checked first: a plain-text 404 body surfaces as a deserialisation error whose
/// chain also mentions the failed watch.
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    if is_not_found {
        return WatchErrorKind::NotFound;
    }
    if error_string.contains("401") || error_string.contains("Unauthorized") {
        return WatchErrorKind::Unauthorized;
    }
    if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        return WatchErrorKind::Expired;
    }
    if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        return WatchErrorKind::Throttled;
    }
    WatchErrorKind::Other
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match classify_watch_error(error_string) {
        WatchErrorKind::Unauthorized => {
            error!(
                "Watch authentication failed (401 Unauthorized), RBAC may have been revoked or the token expired"
            );
            error!("Check that the controller ServiceAccount can still list and watch subscriptions.eventing.octopilot.io and apirules.gateway.octopilot.io");
            warn!(
                "Waiting {}s before retrying watch...",
                restart_delay.as_secs()
            );
            tokio::time::sleep(restart_delay).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!(error_type = "410", "watch.error.resource_version_expired");
            None
        }
        WatchErrorKind::Throttled => {
            let current_backoff = backoff.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off for {}ms before restart...",
                current_backoff
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            let new_backoff = std::cmp::min(current_backoff.saturating_mul(2), max_backoff_ms);
            backoff.store(new_backoff, Ordering::Relaxed);
            None
        }
        WatchErrorKind::NotFound => {
            warn!(
                "Resource not found (404), normal when an object was deleted mid-reconcile. Error: {}",
                error_string
            );
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(restart_delay).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_watch_error() {
        assert_eq!(
            classify_watch_error("ObjectNotFound: subscriptions not found"),
            WatchErrorKind::NotFound
        );
        assert_eq!(
            classify_watch_error("WatchFailed(Api(ErrorResponse { code: 401, reason: Unauthorized }))"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            classify_watch_error("too old resource version: 123 (456)"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            classify_watch_error("storage is (re)initializing"),
            WatchErrorKind::Throttled
        );
        assert_eq!(classify_watch_error("connection reset"), WatchErrorKind::Other);
    }

    #[test]
    fn test_not_found_wins_over_unauthorized() {
        assert_eq!(
            classify_watch_error("WatchFailed: invalid type: integer `404`, Unauthorized"),
            WatchErrorKind::NotFound
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_watch_doubles_backoff() {
        let backoff = Arc::new(AtomicU64::new(1000));
        let delay = Duration::from_secs(1);
        let result = handle_watch_stream_error("TooManyRequests", &backoff, 3000, delay).await;
        assert!(result.is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 2000);

        handle_watch_stream_error("TooManyRequests", &backoff, 3000, delay).await;
        assert_eq!(backoff.load(Ordering::Relaxed), 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_watch_error_waits_restart_delay() {
        let backoff = Arc::new(AtomicU64::new(1000));
        let started = tokio::time::Instant::now();

        let result =
            handle_watch_stream_error("connection reset", &backoff, 3000, Duration::from_secs(7)).await;

        assert!(result.is_none());
        assert!(started.elapsed() >= Duration::from_secs(7));
        assert_eq!(backoff.load(Ordering::Relaxed), 1000);
    }
}
