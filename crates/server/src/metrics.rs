//! Prometheus metrics for the calsnap server.
//!
//! Metrics are aggregate counters and gauges only: no owner names, ids or hashes are
//! used as labels.
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping and
//! should be network-restricted to the scraper at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Owner metrics
pub static OWNERS_RESERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "calsnap_owners_reserved_total",
        "Total number of owners created by a reserve call",
    )
    .expect("metric creation failed")
});

pub static AUTH_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "calsnap_auth_failures_total",
        "Total number of rejected owner credentials",
    )
    .expect("metric creation failed")
});

// Snapshot metrics
pub static SNAPSHOTS_STORED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "calsnap_snapshots_stored_total",
            "Total number of snapshots stored by kind",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static SNAPSHOT_BYTES_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "calsnap_snapshot_bytes_stored_total",
        "Total payload bytes stored",
    )
    .expect("metric creation failed")
});

pub static SNAPSHOTS_SERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "calsnap_snapshots_served_total",
        "Total number of snapshot payloads returned to clients",
    )
    .expect("metric creation failed")
});

pub static PAYLOADS_REJECTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "calsnap_payloads_rejected_total",
            "Total number of rejected snapshot payloads by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

// Retention metrics
pub static RETENTION_SWEEPS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "calsnap_retention_sweeps_total",
        "Total number of completed retention sweeps",
    )
    .expect("metric creation failed")
});

pub static SNAPSHOTS_PRUNED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "calsnap_snapshots_pruned_total",
        "Total number of snapshots removed by retention",
    )
    .expect("metric creation failed")
});

pub static OWNERS_PRUNED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "calsnap_owners_pruned_total",
        "Total number of idle owners removed by retention",
    )
    .expect("metric creation failed")
});

pub static OWNERS_TRACKED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "calsnap_owners",
        "Number of owners left after the most recent retention sweep",
    )
    .expect("metric creation failed")
});

pub static SNAPSHOTS_RETAINED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "calsnap_snapshots",
        "Number of snapshots retained after the most recent retention sweep",
    )
    .expect("metric creation failed")
});

pub static RETENTION_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "calsnap_retention_errors_total",
        "Total number of per-owner failures during retention sweeps",
    )
    .expect("metric creation failed")
});

pub static RETENTION_SWEEP_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "calsnap_retention_sweep_duration_seconds",
            "Time taken by a retention sweep",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(OWNERS_RESERVED.clone()),
            Box::new(AUTH_FAILURES.clone()),
            Box::new(SNAPSHOTS_STORED.clone()),
            Box::new(SNAPSHOT_BYTES_STORED.clone()),
            Box::new(SNAPSHOTS_SERVED.clone()),
            Box::new(PAYLOADS_REJECTED.clone()),
            Box::new(RETENTION_SWEEPS.clone()),
            Box::new(SNAPSHOTS_PRUNED.clone()),
            Box::new(OWNERS_PRUNED.clone()),
            Box::new(OWNERS_TRACKED.clone()),
            Box::new(SNAPSHOTS_RETAINED.clone()),
            Box::new(RETENTION_ERRORS.clone()),
            Box::new(RETENTION_SWEEP_DURATION.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a rejected payload.
pub fn record_payload_rejected(reason: &str) {
    PAYLOADS_REJECTED.with_label_values(&[reason]).inc();
}
