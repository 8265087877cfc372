//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by frontend, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_config_reloads_total` (counter): router builds by result
//! - `proxy_circuit_breaker_trips_total` (counter): trips by backend
//!
//! Recording goes through the `metrics` facade and is a no-op until an
//! exporter is installed with [`init_metrics`].

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

pub fn record_request(frontend: &str, status: u16, start: Instant) {
    let labels = [
        ("frontend", frontend.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("proxy_requests_total", &labels).increment(1);
    metrics::histogram!("proxy_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_config_reload(success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("proxy_config_reloads_total", "result" => result).increment(1);
}

pub fn record_breaker_trip(backend: &str) {
    metrics::counter!("proxy_circuit_breaker_trips_total", "backend" => backend.to_string())
        .increment(1);
}
