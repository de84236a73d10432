//! Prometheus metrics for the Percona Server operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports:
//! - `ps_reconcile_duration_seconds` (histogram): duration of each reconcile pass.
//! - `ps_reconcile_total` (counter): passes labeled by outcome (`success`, `error`, `cancelled`).
//! - `ps_reconcile_errors_total` (counter): failed passes labeled by stage and retryability.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use super::error::{ReconcileError, Retryability};

/// Labels for reconcile duration
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    pub namespace: String,
}

/// Labels for reconcile outcomes
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

/// Labels for reconcile errors
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    /// Stage the error came from, e.g. "fetch", "secrets"
    pub stage: String,
    /// "true" when the trigger should retry without a spec change
    pub retryable: String,
}

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

/// Counter tracking reconcile passes by outcome
pub static RECONCILE_TOTAL: Lazy<Family<OutcomeLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking reconcile errors
pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "ps_reconcile_duration_seconds",
        "Duration of reconcile passes in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "ps_reconcile_total",
        "Total number of reconcile passes by outcome",
        RECONCILE_TOTAL.clone(),
    );
    registry.register(
        "ps_reconcile_errors_total",
        "Total number of failed reconcile passes by stage",
        RECONCILE_ERRORS_TOTAL.clone(),
    );

    registry
});

/// Observe a reconcile duration in seconds.
pub fn observe_reconcile_duration_seconds(namespace: &str, seconds: f64) {
    let labels = ReconcileLabels {
        namespace: namespace.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

/// Record the outcome of one pass, and its stage when it failed.
pub fn record_reconcile_outcome(result: &Result<(), ReconcileError>) {
    let outcome = match result {
        Ok(()) => "success",
        Err(e) if e.is_cancelled() => "cancelled",
        Err(_) => "error",
    };
    RECONCILE_TOTAL
        .get_or_create(&OutcomeLabels {
            outcome: outcome.to_string(),
        })
        .inc();

    if let Err(e) = result {
        if e.is_cancelled() {
            return;
        }
        let labels = ErrorLabels {
            stage: e.stage().to_string(),
            retryable: (e.retryability() == Retryability::Retry).to_string(),
        };
        RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
    }
}
