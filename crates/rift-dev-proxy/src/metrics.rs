//! Prometheus metrics for rift-dev-proxy.
//!
//! Tracks served requests and the retry activity of each route.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec,
    TextEncoder,
};
use std::time::Duration;
use tracing::warn;

lazy_static! {
    /// Total number of requests answered by the dev server
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "rift_requests_total",
        "Total number of requests processed by the proxy",
        &["method", "status"]
    )
    .unwrap();

    /// Failed attempts reported by the engine
    pub static ref UPSTREAM_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "rift_upstream_failures_total",
        "Total number of forwarding attempts that failed before the upstream answered",
        &["route", "kind"]  // kind: http|websocket
    )
    .unwrap();

    /// Replays scheduled after a failed attempt
    pub static ref RETRIES_SCHEDULED_TOTAL: CounterVec = register_counter_vec!(
        "rift_retries_scheduled_total",
        "Total number of retries scheduled",
        &["route"]
    )
    .unwrap();

    /// Operations handed to the default failure handler
    pub static ref RETRIES_EXHAUSTED_TOTAL: CounterVec = register_counter_vec!(
        "rift_retries_exhausted_total",
        "Total number of operations that ran out of attempts",
        &["route"]
    )
    .unwrap();

    /// Replays dropped because the client response could no longer be written
    pub static ref REPLAYS_ABANDONED_TOTAL: CounterVec = register_counter_vec!(
        "rift_replays_abandoned_total",
        "Total number of scheduled replays that were abandoned",
        &["route", "reason"]  // reason: headers_sent|client_gone
    )
    .unwrap();

    /// Wait before each scheduled retry
    pub static ref RETRY_DELAY_MS: HistogramVec = register_histogram_vec!(
        "rift_retry_delay_ms",
        "Histogram of retry delays in milliseconds",
        &["route"],
        vec![0.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record request processing
pub fn record_request(method: &str, status: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

pub fn record_upstream_failure(route: &str, kind: &str) {
    UPSTREAM_FAILURES_TOTAL
        .with_label_values(&[route, kind])
        .inc();
}

/// Helper to record a scheduled retry and its delay
pub fn record_retry_scheduled(route: &str, delay: Duration) {
    RETRIES_SCHEDULED_TOTAL.with_label_values(&[route]).inc();
    RETRY_DELAY_MS
        .with_label_values(&[route])
        .observe(delay.as_secs_f64() * 1000.0);
}

pub fn record_retries_exhausted(route: &str) {
    RETRIES_EXHAUSTED_TOTAL.with_label_values(&[route]).inc();
}

pub fn record_replay_abandoned(route: &str, reason: &str) {
    REPLAYS_ABANDONED_TOTAL
        .with_label_values(&[route, reason])
        .inc();
}
