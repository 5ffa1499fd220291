//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dragonfly_signals_total` (counter): signals received, by role
//! - `dragonfly_spawns_total` (counter): replacement spawns, by result
//! - `dragonfly_drains_total` (counter): drains, by result
//! - `dragonfly_http_requests_total` (counter): requests, by method and status
//! - `dragonfly_in_flight_requests` (gauge): requests being served

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_signal(role: &'static str) {
    metrics::counter!("dragonfly_signals_total", "role" => role).increment(1);
}

pub fn record_spawn(result: &'static str) {
    metrics::counter!("dragonfly_spawns_total", "result" => result).increment(1);
}

pub fn record_drain(result: &'static str) {
    metrics::counter!("dragonfly_drains_total", "result" => result).increment(1);
}

pub fn record_request(method: &str, status: u16) {
    metrics::counter!(
        "dragonfly_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
