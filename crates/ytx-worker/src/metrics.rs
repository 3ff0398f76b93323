//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use ytx_cache::Namespace;

use crate::error::{WorkerError, WorkerResult};
use crate::retry::FailureClass;

/// Metric names as constants for consistency.
pub mod names {
    // Queue metrics
    pub const ITEMS_COMPLETED_TOTAL: &str = "ytx_items_completed_total";
    pub const ITEMS_FAILED_TOTAL: &str = "ytx_items_failed_total";
    pub const QUEUE_PENDING: &str = "ytx_queue_pending";

    // Retry metrics
    pub const RETRY_ATTEMPTS_TOTAL: &str = "ytx_retry_attempts_total";

    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "ytx_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "ytx_cache_misses_total";
    pub const CACHE_WRITE_FAILURES_TOTAL: &str = "ytx_cache_write_failures_total";

    // Processing metrics
    pub const DERIVE_DURATION_SECONDS: &str = "ytx_derive_duration_seconds";
    pub const ITEM_DURATION_SECONDS: &str = "ytx_item_duration_seconds";
}

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: &str) -> WorkerResult<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| WorkerError::config(format!("Invalid METRICS_ADDR '{}': {}", addr, e)))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config(format!("Failed to install metrics exporter: {}", e)))
}

pub fn record_item_completed(duration_secs: f64) {
    counter!(names::ITEMS_COMPLETED_TOTAL).increment(1);
    histogram!(names::ITEM_DURATION_SECONDS).record(duration_secs);
}

pub fn record_item_failed() {
    counter!(names::ITEMS_FAILED_TOTAL).increment(1);
}

pub fn set_queue_pending(count: usize) {
    gauge!(names::QUEUE_PENDING).set(count as f64);
}

/// Record a failed attempt inside a retry loop.
pub fn record_retry_attempt(operation: &str, class: FailureClass) {
    let labels = [
        ("operation", operation.to_string()),
        ("class", class.label().to_string()),
    ];
    counter!(names::RETRY_ATTEMPTS_TOTAL, &labels).increment(1);
}

pub fn record_cache_hit(namespace: Namespace) {
    let labels = [("namespace", namespace.as_str().to_string())];
    counter!(names::CACHE_HITS_TOTAL, &labels).increment(1);
}

pub fn record_cache_miss(namespace: Namespace) {
    let labels = [("namespace", namespace.as_str().to_string())];
    counter!(names::CACHE_MISSES_TOTAL, &labels).increment(1);
}

pub fn record_cache_write_failure(namespace: Namespace) {
    let labels = [("namespace", namespace.as_str().to_string())];
    counter!(names::CACHE_WRITE_FAILURES_TOTAL, &labels).increment(1);
}

pub fn record_derive_duration(model: &str, duration_secs: f64) {
    let labels = [("model", model.to_string())];
    histogram!(names::DERIVE_DURATION_SECONDS, &labels).record(duration_secs);
}
