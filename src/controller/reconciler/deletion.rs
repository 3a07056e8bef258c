//! # Deletion
//!
//! Finalizer-guarded cleanup of a Subscription that carries a deletion timestamp.
//!
//! The finalizer is removed last. If any earlier step fails it stays on the object and the
//! pass is retried, so no backend subscription or route is left behind.

use crate::backend::Backend;
use crate::constants::SUBSCRIPTION_FINALIZER;
use crate::controller::apirule::route_name;
use crate::controller::events::actions;
use crate::controller::reconciler::status::{persist_status, set_condition};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::sink::parse_sink;
use crate::controller::store::StoreError;
use crate::crd::condition::reasons;
use crate::crd::{ConditionStatus, ConditionType, Subscription};
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};

pub(crate) async fn finalize<B: Backend>(
    ctx: &Reconciler<B>,
    mut sub: Subscription,
) -> Result<Action, ReconcilerError> {
    let key = sub.key();
    if !sub.has_finalizer(SUBSCRIPTION_FINALIZER) {
        debug!("Subscription being deleted without our finalizer, nothing to clean up");
        ctx.forget(&key);
        return Ok(Action::await_change());
    }
    info!("Cleaning up deleted Subscription");

    // Backend
    if let Err(e) = ctx.backend.delete_subscription(&sub).await {
        warn!(error = %e, backend = ctx.backend.name(), "Failed to delete backend subscription");
        return Err(e.into());
    }

    // Status
    let original = sub.status.clone();
    set_condition(
        ctx,
        &mut sub,
        ConditionType::Subscribed,
        ConditionStatus::False,
        reasons::SUBSCRIPTION_DELETED,
        "subscription deleted from the backend",
        actions::DELETE,
    )
    .await;
    persist_status(ctx, original.as_ref(), &mut sub).await?;

    // Routing
    let rule = sub
        .status
        .as_ref()
        .and_then(|s| s.backend.api_rule_name.clone())
        .or_else(|| parse_sink(&sub.spec.sink).ok().map(|t| route_name(&t)));
    if let Some(rule) = rule {
        ctx.routes.release(&sub, &rule).await?;
    }

    // Finalizer
    if let Some(finalizers) = sub.metadata.finalizers.as_mut() {
        finalizers.retain(|f| f != SUBSCRIPTION_FINALIZER);
    }
    match ctx.subscriptions.update_finalizers(&sub).await {
        Ok(_) | Err(StoreError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }
    ctx.forget(&key);
    info!("Removed finalizer");
    Ok(Action::await_change())
}
