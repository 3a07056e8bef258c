//! # Reconcile
//!
//! Drives one Subscription through validation, sink check, backend sync and routing, then
//! writes the resulting conditions.
//!
//! The queued object is only used for its key: every pass re-reads the latest version.
//! Each stage owns one condition type and short-circuits the pass when it fails.

use crate::backend::{Backend, BackendError, DeliveryHealth, SyncReport};
use crate::constants::{MAX_CONFLICT_RETRIES, SUBSCRIPTION_FINALIZER};
use crate::controller::apirule::route_name;
use crate::controller::events::actions;
use crate::controller::reconciler::deletion::finalize;
use crate::controller::reconciler::status::{persist_status, set_condition};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::sink::{validate_sink, SinkError, SinkTarget};
use crate::controller::store::StoreError;
use crate::crd::condition::reasons;
use crate::crd::{ConditionStatus, ConditionType, EventType, Subscription, SubscriptionStatus};
use crate::observability::metrics;
use crate::webhook::validation::{validate_config, validate_source, validate_types};
use crate::webhook::ValidationError;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Reconcile entry point handed to the controller runtime
///
/// # Errors
/// Returns a [`ReconcilerError`] classifying how the failure should be retried.
pub async fn reconcile<B: Backend>(
    sub: Arc<Subscription>,
    ctx: Arc<Reconciler<B>>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let name = sub.metadata.name.clone().unwrap_or_default();
    let namespace = sub
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());
    let span = info_span!(
        "subscription.reconcile",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        backend = ctx.backend.name(),
    );

    metrics::increment_reconciliations();
    let result = reconcile_key(&ctx, &namespace, &name).instrument(span).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    if result.is_ok() {
        ctx.reset_backoff(&format!("{namespace}/{name}"));
    }
    result
}

async fn reconcile_key<B: Backend>(
    ctx: &Reconciler<B>,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcilerError> {
    let Some(sub) = ctx.subscriptions.get(namespace, name).await? else {
        debug!("Subscription no longer exists");
        ctx.forget(&format!("{namespace}/{name}"));
        return Ok(Action::await_change());
    };

    if sub.is_being_deleted() {
        return finalize(ctx, sub).await;
    }

    let sub = ensure_finalizer(ctx, sub).await?;
    sync_live(ctx, sub).await
}

/// Add the finalizer, re-reading and retrying on conflicts
async fn ensure_finalizer<B: Backend>(
    ctx: &Reconciler<B>,
    mut sub: Subscription,
) -> Result<Subscription, ReconcilerError> {
    for attempt in 1..=MAX_CONFLICT_RETRIES {
        if sub.has_finalizer(SUBSCRIPTION_FINALIZER) {
            return Ok(sub);
        }
        sub.metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(SUBSCRIPTION_FINALIZER.to_string());

        match ctx.subscriptions.update_finalizers(&sub).await {
            Ok(updated) => {
                info!("Added finalizer");
                return Ok(updated);
            }
            Err(StoreError::Conflict(_)) => {
                debug!(attempt, "Conflict adding finalizer, re-reading");
                let (namespace, name) = (
                    sub.metadata.namespace.clone().unwrap_or_default(),
                    sub.metadata.name.clone().unwrap_or_default(),
                );
                sub = ctx
                    .subscriptions
                    .get(&namespace, &name)
                    .await?
                    .ok_or_else(|| ReconcilerError::Transient(format!("subscription {namespace}/{name} disappeared")))?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ReconcilerError::Conflict(format!(
        "finalizer of {} still conflicting after {MAX_CONFLICT_RETRIES} attempts",
        sub.key()
    )))
}

/// Checks the webhook would have made, for objects that bypassed admission
fn validate_event_spec(sub: &Subscription) -> Result<(), ValidationError> {
    let name = sub.metadata.name.clone().unwrap_or_default();
    let errors: Vec<_> = [
        validate_source(sub, &name),
        validate_types(sub, &name),
        validate_config(sub, &name),
    ]
    .into_iter()
    .flatten()
    .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(name, errors))
    }
}

async fn sync_live<B: Backend>(
    ctx: &Reconciler<B>,
    mut sub: Subscription,
) -> Result<Action, ReconcilerError> {
    let original = sub.status.clone();
    sub.status_mut().initialize_conditions();

    // Spec validation
    if let Err(e) = validate_event_spec(&sub) {
        warn!(error = %e, "Subscription spec is invalid");
        fail_subscribed(ctx, &mut sub, reasons::SUBSCRIPTION_VALIDATION_FAILED, &e.to_string()).await;
        persist_status(ctx, original.as_ref(), &mut sub).await?;
        return Err(ReconcilerError::Permanent(e.to_string()));
    }

    match ctx.backend.resolve_types(&sub) {
        Ok(resolved) => {
            sub.status_mut().types = resolved
                .into_iter()
                .map(|t| EventType {
                    original_type: t.original_type,
                    clean_type: t.clean_type,
                })
                .collect();
        }
        Err(e) => {
            warn!(error = %e, "Failed to resolve event types");
            fail_subscribed(ctx, &mut sub, reasons::SUBSCRIPTION_VALIDATION_FAILED, &e.to_string()).await;
            persist_status(ctx, original.as_ref(), &mut sub).await?;
            return Err(e.into());
        }
    }

    // Sink
    let target = match validate_sink(ctx.services.as_ref(), &sub).await {
        Ok(target) => target,
        Err(e) => return sink_failed(ctx, original.as_ref(), sub, e).await,
    };
    prepare_route(ctx, &mut sub, &target).await?;

    // Backend
    let report = match ctx.backend.sync_subscription(&mut sub).await {
        Ok(report) => report,
        Err(e) => return backend_failed(ctx, original.as_ref(), sub, e).await,
    };
    apply_report(ctx, &mut sub, &report).await;

    // Routing
    match ctx.routes.sync(&sub, &target).await {
        Ok(route) => {
            sub.status_mut().backend.api_rule_name = Some(route.name.clone());
            if route.ready {
                set_condition(
                    ctx,
                    &mut sub,
                    ConditionType::ApiRuleStatus,
                    ConditionStatus::True,
                    reasons::API_RULE_CREATED,
                    "",
                    actions::RECONCILE,
                )
                .await;
            } else {
                set_condition(
                    ctx,
                    &mut sub,
                    ConditionType::ApiRuleStatus,
                    ConditionStatus::False,
                    reasons::API_RULE_NOT_READY,
                    format!("APIRule {} is not ready", route.name),
                    actions::RECONCILE,
                )
                .await;
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to sync APIRule");
            set_condition(
                ctx,
                &mut sub,
                ConditionType::ApiRuleStatus,
                ConditionStatus::False,
                reasons::API_RULE_CREATION_FAILED,
                e.to_string(),
                actions::RECONCILE,
            )
            .await;
            persist_status(ctx, original.as_ref(), &mut sub).await?;
            return Err(e.into());
        }
    }

    persist_status(ctx, original.as_ref(), &mut sub).await?;

    if report.active {
        debug!(
            ready = sub.status.as_ref().is_some_and(SubscriptionStatus::is_ready),
            "Reconciled"
        );
        Ok(Action::requeue(ctx.config.resync_interval_duration()))
    } else {
        metrics::increment_requeues("inactive");
        info!("Backend subscription not active yet, requeueing");
        Ok(Action::requeue(ctx.config.inactive_requeue_duration()))
    }
}

async fn fail_subscribed<B: Backend>(
    ctx: &Reconciler<B>,
    sub: &mut Subscription,
    reason: &str,
    message: &str,
) {
    set_condition(
        ctx,
        sub,
        ConditionType::Subscribed,
        ConditionStatus::False,
        reason,
        message,
        actions::RECONCILE,
    )
    .await;
}

/// A sink that does not resolve is reported, its previous rule released, and the
/// Subscription left alone until it changes
async fn sink_failed<B: Backend>(
    ctx: &Reconciler<B>,
    original: Option<&SubscriptionStatus>,
    mut sub: Subscription,
    err: SinkError,
) -> Result<Action, ReconcilerError> {
    warn!(error = %err, "Sink is not valid");
    set_condition(
        ctx,
        &mut sub,
        ConditionType::ApiRuleStatus,
        ConditionStatus::False,
        reasons::SINK_NOT_VALID,
        err.to_string(),
        actions::RECONCILE,
    )
    .await;

    if err.is_transient() {
        persist_status(ctx, original, &mut sub).await?;
        return Err(err.into());
    }

    // the sink no longer points at the service behind the previous rule
    let previous_rule = sub.status_mut().backend.api_rule_name.clone();
    if let Some(previous) = previous_rule {
        info!(apirule = previous.as_str(), "Sink is not valid, releasing previous APIRule");
        if let Err(e) = ctx.routes.release(&sub, &previous).await {
            persist_status(ctx, original, &mut sub).await?;
            return Err(e.into());
        }
        let backend = &mut sub.status_mut().backend;
        backend.api_rule_name = None;
        backend.external_sink = None;
    }
    persist_status(ctx, original, &mut sub).await?;

    metrics::increment_requeues("sink_not_valid");
    Ok(Action::requeue(ctx.config.resync_interval_duration()))
}

/// Publish the external sink before the backend needs it and let go of a rule the
/// Subscription no longer routes through
async fn prepare_route<B: Backend>(
    ctx: &Reconciler<B>,
    sub: &mut Subscription,
    target: &SinkTarget,
) -> Result<(), ReconcilerError> {
    let desired_rule = route_name(target);
    let previous_rule = sub.status_mut().backend.api_rule_name.clone();
    if let Some(previous) = previous_rule.filter(|p| *p != desired_rule) {
        info!(
            previous = previous.as_str(),
            desired = desired_rule.as_str(),
            "Sink moved, releasing previous APIRule"
        );
        ctx.routes.release(sub, &previous).await?;
        sub.status_mut().backend.api_rule_name = None;
    }
    sub.status_mut().backend.external_sink = Some(ctx.routes.external_sink(target));
    Ok(())
}

async fn backend_failed<B: Backend>(
    ctx: &Reconciler<B>,
    original: Option<&SubscriptionStatus>,
    mut sub: Subscription,
    err: BackendError,
) -> Result<Action, ReconcilerError> {
    if err.is_missing_subscription() {
        info!(error = %err, "Backend subscription not visible yet, requeueing");
        set_condition(
            ctx,
            &mut sub,
            ConditionType::SubscriptionActive,
            ConditionStatus::Unknown,
            reasons::PENDING,
            err.to_string(),
            actions::RECONCILE,
        )
        .await;
        persist_status(ctx, original, &mut sub).await?;
        metrics::increment_requeues("missing_subscription");
        return Ok(Action::requeue(ctx.config.missing_subscription_requeue_duration()));
    }

    warn!(error = %err, backend = ctx.backend.name(), "Backend sync failed");
    if let BackendError::ActivationTimeout(_) = err {
        set_condition(
            ctx,
            &mut sub,
            ConditionType::SubscriptionActive,
            ConditionStatus::False,
            reasons::SUBSCRIPTION_NOT_ACTIVE,
            err.to_string(),
            actions::RECONCILE,
        )
        .await;
    } else {
        fail_subscribed(ctx, &mut sub, reasons::SUBSCRIPTION_CREATION_FAILED, &err.to_string()).await;
        set_condition(
            ctx,
            &mut sub,
            ConditionType::SubscriptionActive,
            ConditionStatus::False,
            reasons::SUBSCRIPTION_NOT_ACTIVE,
            err.to_string(),
            actions::RECONCILE,
        )
        .await;
    }
    persist_status(ctx, original, &mut sub).await?;
    Err(err.into())
}

async fn apply_report<B: Backend>(ctx: &Reconciler<B>, sub: &mut Subscription, report: &SyncReport) {
    set_condition(
        ctx,
        sub,
        ConditionType::Subscribed,
        ConditionStatus::True,
        reasons::SUBSCRIPTION_CREATED,
        "",
        actions::RECONCILE,
    )
    .await;

    if report.active {
        set_condition(
            ctx,
            sub,
            ConditionType::SubscriptionActive,
            ConditionStatus::True,
            reasons::SUBSCRIPTION_ACTIVE,
            "",
            actions::RECONCILE,
        )
        .await;
    } else {
        set_condition(
            ctx,
            sub,
            ConditionType::SubscriptionActive,
            ConditionStatus::False,
            reasons::SUBSCRIPTION_NOT_ACTIVE,
            "waiting for the backend subscription to become active",
            actions::RECONCILE,
        )
        .await;
    }

    match &report.delivery {
        DeliveryHealth::Healthy => {
            set_condition(
                ctx,
                sub,
                ConditionType::WebhookCallStatus,
                ConditionStatus::True,
                reasons::WEBHOOK_CALL_SUCCESS,
                "",
                actions::RECONCILE,
            )
            .await;
        }
        DeliveryHealth::Failing(message) => {
            set_condition(
                ctx,
                sub,
                ConditionType::WebhookCallStatus,
                ConditionStatus::False,
                reasons::WEBHOOK_CALL_FAILED,
                message.as_str(),
                actions::RECONCILE,
            )
            .await;
        }
    }
}
