//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, cache result
//! - `proxy_request_duration_seconds` (histogram): latency by cache result
//! - `proxy_cache_lookups_total` (counter): lookups by result
//! - `proxy_upstream_errors_total` (counter): failed origin round trips
//! - `proxy_cache_entries` (gauge): entries currently stored

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, cache: &'static str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "cache" => cache
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "cache" => cache)
        .record(start.elapsed().as_secs_f64());
}

/// Record the outcome of a cache lookup.
pub fn record_cache_lookup(result: &'static str) {
    counter!("proxy_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_upstream_error() {
    counter!("proxy_upstream_errors_total").increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("proxy_cache_entries").set(entries as f64);
}
