// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the zonegate daemon.
//!
//! All metrics carry the `zonegate_` namespace and are registered in a
//! process-wide registry, text-encoded on `GET /metrics`.
//!
//! # Metrics Categories
//!
//! - **Pipeline Metrics** - Zone saves/deletes per backend and outcome
//! - **Queue Metrics** - Depth of the three durable queues
//! - **Retry Metrics** - Retry attempts and dead letters
//! - **Coordination Metrics** - Reconcile cycles and peer sync outcomes

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all zonegate metrics
const METRICS_NAMESPACE: &str = "zonegate";

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via the
/// `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Pipeline Metrics
// ============================================================================

/// Total zone write dispatches by backend and outcome
///
/// Labels:
/// - `backend`: Backend driver name
/// - `status`: Outcome (`success`, `error`)
pub static ZONE_SAVES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_zone_saves_total"),
        "Total zone write dispatches by backend and outcome",
    );
    let counter = CounterVec::new(opts, &["backend", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total zone delete dispatches by backend and outcome
///
/// Labels:
/// - `backend`: Backend driver name
/// - `status`: Outcome (`success`, `error`)
pub static ZONE_DELETES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_zone_deletes_total"),
        "Total zone delete dispatches by backend and outcome",
    );
    let counter = CounterVec::new(opts, &["backend", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of full dispatch rounds in seconds
///
/// Labels:
/// - `operation`: `save` or `delete`
pub static DISPATCH_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_dispatch_duration_seconds"),
        "Duration of full dispatch rounds in seconds by operation",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Queue Metrics
// ============================================================================

/// Current depth of each durable queue
///
/// Labels:
/// - `queue`: `save`, `delete`, or `retry`
pub static QUEUE_DEPTH: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_queue_depth"),
        "Current depth of each durable queue",
    );
    let gauge = GaugeVec::new(opts, &["queue"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Retry Metrics
// ============================================================================

/// Total retry attempts by operation kind
///
/// Labels:
/// - `kind`: `write` or `delete`
pub static RETRY_ATTEMPTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_retry_attempts_total"),
        "Total retry attempts by operation kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total operations moved to the dead-letter table
///
/// Labels:
/// - `kind`: `write` or `delete`
pub static DEAD_LETTERS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dead_letters_total"),
        "Total operations moved to the dead-letter table",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Coordination Metrics
// ============================================================================

/// Total reconcile cycles by outcome
///
/// Labels:
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILE_CYCLES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconcile_cycles_total"),
        "Total reconcile cycles by outcome",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total peer sync calls by outcome
///
/// Labels:
/// - `status`: Outcome (`success`, `error`)
pub static PEER_SYNCS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_peer_syncs_total"),
        "Total peer sync calls by outcome",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Record one backend's participation in a zone save.
pub fn record_zone_save(backend: &str, success: bool) {
    ZONE_SAVES_TOTAL
        .with_label_values(&[backend, status_label(success)])
        .inc();
}

/// Record one backend's participation in a zone delete.
pub fn record_zone_delete(backend: &str, success: bool) {
    ZONE_DELETES_TOTAL
        .with_label_values(&[backend, status_label(success)])
        .inc();
}

/// Record the duration of a full dispatch round.
pub fn record_dispatch_duration(operation: &str, duration: Duration) {
    DISPATCH_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
}

/// Publish the current depth of a queue.
#[allow(clippy::cast_precision_loss)]
pub fn set_queue_depth(queue: &str, depth: usize) {
    QUEUE_DEPTH.with_label_values(&[queue]).set(depth as f64);
}

/// Record a retry attempt.
pub fn record_retry_attempt(kind: &str) {
    RETRY_ATTEMPTS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record an item moved to the dead-letter table.
pub fn record_dead_letter(kind: &str) {
    DEAD_LETTERS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a finished reconcile cycle.
pub fn record_reconcile_cycle(success: bool) {
    RECONCILE_CYCLES_TOTAL
        .with_label_values(&[status_label(success)])
        .inc();
}

/// Record one peer sync call.
pub fn record_peer_sync(success: bool) {
    PEER_SYNCS_TOTAL
        .with_label_values(&[status_label(success)])
        .inc();
}

/// Gather all metrics in Prometheus text format.
///
/// # Errors
///
/// Returns an error if metric encoding fails.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod metrics_tests;
