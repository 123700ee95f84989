//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, downstream calls)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-peer health
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_downstream_calls_total` (counter): peer calls by peer, outcome
//! - `gateway_dependency_health` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op (tests, CLI)
//! - Labels kept low-cardinality: no paths, no ids

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one finished inbound request.
pub fn record_request(method: &str, status: u16, duration: Duration) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "method" => method.to_string())
        .record(duration.as_secs_f64());
}

/// Record one downstream call outcome (`success`, `not_found`, `unavailable`).
pub fn record_downstream_call(peer: &str, outcome: &'static str) {
    metrics::counter!(
        "gateway_downstream_calls_total",
        "peer" => peer.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_dependency_health(peer: &str, healthy: bool) {
    metrics::gauge!("gateway_dependency_health", "peer" => peer.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
