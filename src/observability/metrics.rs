//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define API metrics (request count, latency)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `api_requests_total` (counter): requests by verb, status, endpoint template
//! - `api_request_duration_seconds` (histogram): latency by verb, endpoint template
//!
//! # Design Decisions
//! - Labels use the endpoint template, not the raw path, to bound cardinality
//! - Recording is a no-op until a recorder is installed

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const REQUESTS_TOTAL: &str = "api_requests_total";
pub const REQUEST_DURATION: &str = "api_request_duration_seconds";

/// Install the Prometheus recorder with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_counter!(REQUESTS_TOTAL, "Total API requests");
            describe_histogram!(REQUEST_DURATION, "API request latency in seconds");
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}

/// Record one finished request.
pub fn record_request(verb: &str, status: u16, endpoint: &str, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();

    counter!(
        REQUESTS_TOTAL,
        "verb" => verb.to_string(),
        "status" => status.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .increment(1);

    histogram!(
        REQUEST_DURATION,
        "verb" => verb.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(elapsed);
}
