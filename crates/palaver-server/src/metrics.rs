//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use palaver_core::BroadcastReport;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "palaver_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "palaver_connections_active";
    pub const MESSAGES_TOTAL: &str = "palaver_messages_total";
    pub const MESSAGES_BYTES: &str = "palaver_messages_bytes";
    pub const BROADCASTS_TOTAL: &str = "palaver_broadcasts_total";
    pub const BROADCAST_SKIPS_TOTAL: &str = "palaver_broadcast_skips_total";
    pub const REGISTRATIONS_TOTAL: &str = "palaver_registrations_total";
    pub const ERRORS_TOTAL: &str = "palaver_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of frames processed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of frames processed");
    metrics::describe_counter!(names::BROADCASTS_TOTAL, "Total number of broadcast passes");
    metrics::describe_counter!(
        names::BROADCAST_SKIPS_TOTAL,
        "Deliveries skipped because a connection's queue was full"
    );
    metrics::describe_counter!(
        names::REGISTRATIONS_TOTAL,
        "Username registration attempts by outcome"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed frame.
pub fn record_message(bytes: usize, direction: &str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction.to_string()).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction.to_string()).increment(bytes as u64);
}

/// Record the outcome of a broadcast pass.
pub fn record_broadcast(report: &BroadcastReport) {
    counter!(names::BROADCASTS_TOTAL).increment(1);
    if report.skipped > 0 {
        counter!(names::BROADCAST_SKIPS_TOTAL).increment(report.skipped as u64);
    }
}

/// Record a registration attempt.
pub fn record_registration(outcome: &str) {
    counter!(names::REGISTRATIONS_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
