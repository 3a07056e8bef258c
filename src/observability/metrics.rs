//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `eventing_controller_reconciliations_total` - Total number of reconciliations
//! - `eventing_controller_reconciliation_errors_total` - Total number of reconciliation errors
//! - `eventing_controller_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `eventing_controller_requeues_total` - Fixed-delay requeues by reason
//! - `eventing_controller_backend_operations_total` - Backend writes by backend and operation
//! - `eventing_controller_apirule_operations_total` - APIRule writes by operation
//! - `eventing_controller_subscriptions_ready` - Current number of ready Subscriptions

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "eventing_controller_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "eventing_controller_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "eventing_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "eventing_controller_requeues_total",
            "Total number of fixed-delay requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static BACKEND_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "eventing_controller_backend_operations_total",
            "Total number of backend write operations by backend and operation",
        ),
        &["backend", "operation"],
    )
    .expect("Failed to create BACKEND_OPERATIONS_TOTAL metric - this should never happen")
});

static APIRULE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "eventing_controller_apirule_operations_total",
            "Total number of APIRule write operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create APIRULE_OPERATIONS_TOTAL metric - this should never happen")
});

static SUBSCRIPTIONS_READY: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "eventing_controller_subscriptions_ready",
        "Current number of ready Subscriptions",
    )
    .expect("Failed to create SUBSCRIPTIONS_READY metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BACKEND_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(APIRULE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SUBSCRIPTIONS_READY.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

/// Count a fixed-delay requeue, e.g. `missing_subscription` or `inactive`
pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_backend_operations(backend: &str, operation: &str) {
    BACKEND_OPERATIONS_TOTAL
        .with_label_values(&[backend, operation])
        .inc();
}

pub fn increment_apirule_operations(operation: &str) {
    APIRULE_OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn set_subscriptions_ready(count: i64) {
    SUBSCRIPTIONS_READY.set(count);
}
