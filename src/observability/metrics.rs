//! Metrics collection and exposition.
//!
//! # Metrics
//! - `topology_requests_total` (counter): requests by handler, status
//! - `topology_request_duration_seconds` (histogram): latency by handler
//! - `topology_faults_total` (counter): injected faults by kind
//! - `topology_hops_total` (counter): requests forwarded to a next hop
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! deployments without the scrape endpoint pay nothing for it.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener. Must be called
/// from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter started");
    Ok(())
}

pub fn record_request(handler: &str, status: u16, start: Instant) {
    metrics::counter!(
        "topology_requests_total",
        "handler" => handler.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("topology_request_duration_seconds", "handler" => handler.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// `kind` is one of `error`, `duplicate_headers`, `absorbed`.
pub fn record_fault(kind: &'static str) {
    metrics::counter!("topology_faults_total", "kind" => kind).increment(1);
}

pub fn record_hop() {
    metrics::counter!("topology_hops_total").increment(1);
}
