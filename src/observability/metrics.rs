//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): relayed requests by method, status, family
//! - `relay_request_duration_seconds` (histogram): time to response head
//! - `relay_streams_started_total` (counter): responses relayed as streams
//! - `relay_auth_rejected_total` (counter): access key rejections by reason
//! - `relay_errors_total` (counter): local error envelopes by kind
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint on `addr`. Needs a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, family: &str, start: Instant) {
    counter!(
        "relay_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "family" => family.to_string()
    )
    .increment(1);
    histogram!("relay_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_stream_started(family: &str) {
    counter!("relay_streams_started_total", "family" => family.to_string()).increment(1);
}

pub fn record_auth_rejected(reason: &'static str) {
    counter!("relay_auth_rejected_total", "reason" => reason).increment(1);
}

pub fn record_error(kind: &'static str) {
    counter!("relay_errors_total", "kind" => kind).increment(1);
}
