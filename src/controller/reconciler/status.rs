//! # Status
//!
//! Condition updates and the gated status write.
//!
//! Conditions are changed in memory while the pipeline runs; every change emits one event.
//! The status subresource is written once at the end of a pass, and only when something
//! other than a transition time differs from what was read.

use crate::backend::Backend;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::store::StoreError;
use crate::crd::{conditions_equal, ConditionStatus, ConditionType, Subscription, SubscriptionStatus};
use kube::runtime::events::EventType;
use kube::Resource;
use tracing::{debug, info};

/// True when writing `current` over `original` would change nothing but transition times
#[must_use]
pub fn status_unchanged(original: &SubscriptionStatus, current: &SubscriptionStatus) -> bool {
    conditions_equal(&original.conditions, &current.conditions)
        && !original.should_update_ready_status()
        && original.ready == current.ready
        && original.types == current.types
        && original.backend == current.backend
}

/// Set one condition and publish an event when it changed
pub(crate) async fn set_condition<B: Backend>(
    ctx: &Reconciler<B>,
    sub: &mut Subscription,
    type_: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
    action: &str,
) {
    let message = message.into();
    let changed = sub
        .status_mut()
        .set_condition(type_.clone(), status, reason, message.clone());
    if !changed {
        return;
    }

    debug!(
        subscription = sub.key().as_str(),
        condition = type_.as_str(),
        status = ?status,
        reason,
        "Condition changed"
    );
    let event_type = if status == ConditionStatus::True {
        EventType::Normal
    } else {
        EventType::Warning
    };
    let event_reason = if reason.is_empty() { type_.as_str() } else { reason };
    let note = (!message.is_empty()).then_some(message);
    ctx.events
        .publish(&sub.object_ref(&()), event_type, event_reason, action, note)
        .await;
}

/// Write the status of `sub` unless it matches `original`.
///
/// On success the new resourceVersion is carried over to `sub` so later writes in the same
/// pass are not rejected. Returns whether a write happened.
pub(crate) async fn persist_status<B: Backend>(
    ctx: &Reconciler<B>,
    original: Option<&SubscriptionStatus>,
    sub: &mut Subscription,
) -> Result<bool, ReconcilerError> {
    let status = sub.status_mut();
    status.ready = status.is_ready();
    let ready = status.ready;

    if original.is_some_and(|o| status_unchanged(o, status)) {
        debug!(subscription = sub.key().as_str(), "Status unchanged, skipping update");
        ctx.record_ready(&sub.key(), ready);
        return Ok(false);
    }

    match ctx.subscriptions.update_status(sub, original).await {
        Ok(updated) => {
            sub.metadata.resource_version = updated.metadata.resource_version;
            ctx.record_ready(&sub.key(), ready);
            info!(subscription = sub.key().as_str(), ready, "Status updated");
            Ok(true)
        }
        Err(StoreError::NotFound(key)) => {
            debug!(subscription = key.as_str(), "Subscription gone before status update");
            ctx.forget(&sub.key());
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
