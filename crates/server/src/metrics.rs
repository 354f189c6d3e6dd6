//! Prometheus metrics for the Gantry server.
//!
//! Exposes metrics for session lifecycle, chunk ingest, reassembly, and the
//! background sweep.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! While metrics don't contain tenant-specific data (no upload IDs, paths, or
//! bucket names), they do expose aggregate system usage (session counts,
//! bytes received).
//!
//! **Deployment Requirement**: The `/metrics` endpoint MUST be
//! network-restricted to authorized Prometheus scraper IPs only. This should
//! be enforced at the infrastructure level (firewall, load balancer, or
//! reverse proxy rules). Do NOT expose `/metrics` on public networks.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Upload session metrics
pub static UPLOAD_SESSIONS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gantry_upload_sessions_created_total",
        "Total number of upload sessions created",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_FINALIZED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gantry_upload_sessions_finalized_total",
        "Total number of upload sessions successfully finalized",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_ABORTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gantry_upload_sessions_aborted_total",
        "Total number of upload sessions aborted by clients",
    )
    .expect("metric creation failed")
});

// Chunk metrics
pub static CHUNKS_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gantry_chunks_received_total",
        "Total number of chunk payloads accepted",
    )
    .expect("metric creation failed")
});

pub static BYTES_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gantry_bytes_received_total",
        "Total chunk payload bytes accepted",
    )
    .expect("metric creation failed")
});

// Timing metrics
pub static FINALIZE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "gantry_finalize_duration_seconds",
            "Time taken to finalize an upload session",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

pub static CHUNK_RECEIVE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "gantry_chunk_receive_duration_seconds",
            "Time taken to persist a single chunk",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

// Error metrics
pub static REASSEMBLY_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gantry_reassembly_failures_total",
        "Total number of failed reassembly attempts",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gantry_upload_errors_total",
            "Total upload errors by error type",
        ),
        &["error_type"],
    )
    .expect("metric creation failed")
});

// Current state gauges
pub static ACTIVE_UPLOAD_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "gantry_active_upload_sessions",
        "Current number of live upload sessions",
    )
    .expect("metric creation failed")
});

// Sweep metrics
pub static SWEEP_RUNS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gantry_sweep_runs_total",
        "Total number of orphan sweep cycles completed",
    )
    .expect("metric creation failed")
});

pub static SESSIONS_REAPED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gantry_sessions_reaped_total",
        "Total number of stale sessions removed by the sweep",
    )
    .expect("metric creation failed")
});

pub static SESSIONS_REOPENED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gantry_sessions_reopened_total",
        "Total number of stuck finalizing sessions returned to open",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// This function is idempotent - subsequent calls after the first are no-ops.
/// This allows safe use in integration tests or when embedding multiple routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_FINALIZED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_ABORTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHUNKS_RECEIVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_RECEIVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FINALIZE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHUNK_RECEIVE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REASSEMBLY_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ACTIVE_UPLOAD_SESSIONS.clone()))
            .expect("metric registration failed");

        // Sweep metrics
        REGISTRY
            .register(Box::new(SWEEP_RUNS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SESSIONS_REAPED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SESSIONS_REOPENED.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
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

/// Helper to record upload errors by type.
pub fn record_upload_error(error_type: &str) {
    UPLOAD_ERRORS.with_label_values(&[error_type]).inc();
}
