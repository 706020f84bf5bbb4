//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): requests by method and status
//! - `bridge_request_duration_seconds` (histogram): handling latency
//! - `bridge_worker_recycles_total` (counter): workers recycled for memory
//! - `bridge_workers_active` (gauge): running worker loops
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - The Prometheus exporter serves its own HTTP listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Record one handled request.
pub fn record_request(method: &str, status: u16, started: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("bridge_requests_total", &labels).increment(1);
    metrics::histogram!("bridge_request_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());
}

/// Record a worker recycle.
pub fn record_recycle(worker: usize) {
    metrics::counter!("bridge_worker_recycles_total", "worker" => worker.to_string()).increment(1);
}

pub fn worker_started() {
    metrics::gauge!("bridge_workers_active").increment(1.0);
}

pub fn worker_stopped() {
    metrics::gauge!("bridge_workers_active").decrement(1.0);
}

/// Install the Prometheus exporter on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}
