//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `sync_policy_reconciliations_total` - Total number of policy reconciliations
//! - `sync_policy_reconciliation_errors_total` - Reconciliation errors by kind
//! - `sync_policy_reconciliation_duration_seconds` - Duration of a reconciliation run
//! - `sync_policy_items_synchronized_total` - Items created or updated in a namespace
//! - `sync_policy_items_deleted_total` - Items deleted from a namespace
//! - `sync_policy_items_failed_total` - Item operations that failed
//! - `sync_policy_force_recreates_total` - Items deleted and created again after an invalid update
//! - `sync_policy_namespaces_targeted` - Namespaces selected by the last full run
//! - `sync_policy_requeues_total` - Requeues by reason

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sync_policy_reconciliations_total",
        "Total number of policy reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "sync_policy_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "sync_policy_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static ITEMS_SYNCHRONIZED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sync_policy_items_synchronized_total",
        "Total number of items created or updated in target namespaces",
    )
    .expect("Failed to create ITEMS_SYNCHRONIZED_TOTAL metric - this should never happen")
});

static ITEMS_DELETED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sync_policy_items_deleted_total",
        "Total number of items deleted from target namespaces",
    )
    .expect("Failed to create ITEMS_DELETED_TOTAL metric - this should never happen")
});

static ITEMS_FAILED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sync_policy_items_failed_total",
        "Total number of item operations that failed",
    )
    .expect("Failed to create ITEMS_FAILED_TOTAL metric - this should never happen")
});

static FORCE_RECREATES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sync_policy_force_recreates_total",
        "Total number of items deleted and recreated after an invalid update",
    )
    .expect("Failed to create FORCE_RECREATES_TOTAL metric - this should never happen")
});

static NAMESPACES_TARGETED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "sync_policy_namespaces_targeted",
        "Number of namespaces selected by the most recent full reconciliation",
    )
    .expect("Failed to create NAMESPACES_TARGETED metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("sync_policy_requeues_total", "Total number of requeues"),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
/// Register every metric with the shared registry
///
/// Fails when called twice because the registry rejects duplicate collectors.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(ITEMS_SYNCHRONIZED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ITEMS_DELETED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ITEMS_FAILED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FORCE_RECREATES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NAMESPACES_TARGETED.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

/// Render the registry in the Prometheus text format
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_items_synchronized() {
    ITEMS_SYNCHRONIZED_TOTAL.inc();
}

pub fn increment_items_deleted() {
    ITEMS_DELETED_TOTAL.inc();
}

pub fn increment_items_failed() {
    ITEMS_FAILED_TOTAL.inc();
}

pub fn increment_force_recreates() {
    FORCE_RECREATES_TOTAL.inc();
}

pub fn set_namespaces_targeted(count: usize) {
    NAMESPACES_TARGETED.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}
