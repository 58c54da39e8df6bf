//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `terraform_syncs_total` - Total number of syncs by final state
//! - `terraform_sync_duration_seconds` - Duration of complete syncs
//! - `terraform_run_attempts_total` - Total number of apply/destroy attempts
//! - `terraform_backend_setups_total` - Total number of backend setups by provider
//! - `terraform_pod_operations_total` - Execution unit operations by role and operation
//! - `terraform_reconcile_ticks_total` - Total number of periodic reconcile passes
//! - `terraform_reconcile_list_errors_total` - Reconcile passes skipped because listing failed
//! - `terraform_syncs_in_flight` - Syncs currently running from the scheduler

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static SYNCS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "terraform_syncs_total",
            "Total number of syncs by final state",
        ),
        &["state"],
    )
    .expect("Failed to create SYNCS_TOTAL metric - this should never happen")
});

static SYNC_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "terraform_sync_duration_seconds",
            "Duration of complete syncs in seconds",
        )
        .buckets(vec![1.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
    )
    .expect("Failed to create SYNC_DURATION metric - this should never happen")
});

static RUN_ATTEMPTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "terraform_run_attempts_total",
        "Total number of apply/destroy attempts",
    )
    .expect("Failed to create RUN_ATTEMPTS_TOTAL metric - this should never happen")
});

static BACKEND_SETUPS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "terraform_backend_setups_total",
            "Total number of backend setups by provider",
        ),
        &["provider"],
    )
    .expect("Failed to create BACKEND_SETUPS_TOTAL metric - this should never happen")
});

static POD_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "terraform_pod_operations_total",
            "Total number of execution unit operations by role and operation",
        ),
        &["role", "op"],
    )
    .expect("Failed to create POD_OPERATIONS_TOTAL metric - this should never happen")
});

static RECONCILE_TICKS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "terraform_reconcile_ticks_total",
        "Total number of periodic reconcile passes",
    )
    .expect("Failed to create RECONCILE_TICKS_TOTAL metric - this should never happen")
});

static RECONCILE_LIST_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "terraform_reconcile_list_errors_total",
        "Total number of reconcile passes skipped because listing resources failed",
    )
    .expect("Failed to create RECONCILE_LIST_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILE_SKIPPED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "terraform_reconcile_skipped_total",
        "Total number of resources skipped by a reconcile pass because their previous sync was pending",
    )
    .expect("Failed to create RECONCILE_SKIPPED_TOTAL metric - this should never happen")
});

static SYNCS_IN_FLIGHT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "terraform_syncs_in_flight",
        "Current number of syncs started by the scheduler",
    )
    .expect("Failed to create SYNCS_IN_FLIGHT metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(SYNCS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_DURATION.clone()))?;
    REGISTRY.register(Box::new(RUN_ATTEMPTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BACKEND_SETUPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POD_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_TICKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_LIST_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_SKIPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNCS_IN_FLIGHT.clone()))?;

    Ok(())
}

/// Record a finished sync
pub fn record_sync(state: &str, duration: f64) {
    SYNCS_TOTAL.with_label_values(&[state]).inc();
    SYNC_DURATION.observe(duration);
}

pub fn increment_run_attempts() {
    RUN_ATTEMPTS_TOTAL.inc();
}

pub fn increment_backend_setups(provider: &str) {
    BACKEND_SETUPS_TOTAL.with_label_values(&[provider]).inc();
}

pub fn increment_pod_operations(role: &str, op: &str) {
    POD_OPERATIONS_TOTAL.with_label_values(&[role, op]).inc();
}

pub fn increment_reconcile_ticks() {
    RECONCILE_TICKS_TOTAL.inc();
}

pub fn increment_reconcile_list_errors() {
    RECONCILE_LIST_ERRORS_TOTAL.inc();
}

pub fn increment_reconcile_skipped() {
    RECONCILE_SKIPPED_TOTAL.inc();
}

pub fn inc_syncs_in_flight() {
    SYNCS_IN_FLIGHT.inc();
}

pub fn dec_syncs_in_flight() {
    SYNCS_IN_FLIGHT.dec();
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sync() {
        let before = SYNCS_TOTAL.with_label_values(&["unit-test"]).get();
        record_sync("unit-test", 1.5);
        let after = SYNCS_TOTAL.with_label_values(&["unit-test"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_run_attempts() {
        let before = RUN_ATTEMPTS_TOTAL.get();
        increment_run_attempts();
        let after = RUN_ATTEMPTS_TOTAL.get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_pod_operations() {
        let before = POD_OPERATIONS_TOTAL.with_label_values(&["unit-test", "create"]).get();
        increment_pod_operations("unit-test", "create");
        let after = POD_OPERATIONS_TOTAL.with_label_values(&["unit-test", "create"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_reconcile_skipped() {
        let before = RECONCILE_SKIPPED_TOTAL.get();
        increment_reconcile_skipped();
        assert_eq!(RECONCILE_SKIPPED_TOTAL.get(), before + 1u64);
    }

    #[test]
    fn test_increment_reconcile_list_errors() {
        let before = RECONCILE_LIST_ERRORS_TOTAL.get();
        increment_reconcile_list_errors();
        let after = RECONCILE_LIST_ERRORS_TOTAL.get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_syncs_in_flight_gauge() {
        inc_syncs_in_flight();
        dec_syncs_in_flight();
        // Just verify it doesn't panic
    }
}
