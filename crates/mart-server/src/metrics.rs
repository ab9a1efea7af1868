//! Metrics collection and export for mart.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use mart_core::RegistryStats;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const PUBLISHES_TOTAL: &str = "mart_publishes_total";
    pub const PUBLISH_BYTES: &str = "mart_publish_bytes_total";
    pub const SUBSCRIBES_TOTAL: &str = "mart_subscribes_total";
    pub const LIST_TOTAL: &str = "mart_list_total";
    pub const REJECTED_TOTAL: &str = "mart_rejected_total";
    pub const SINK_FAILURES_TOTAL: &str = "mart_sink_failures_total";
    pub const SINK_DROPPED_TOTAL: &str = "mart_sink_dropped_total";
    pub const CHANNELS_ACTIVE: &str = "mart_channels_active";
    pub const PARKED_SUBSCRIBERS: &str = "mart_parked_subscribers";
    pub const SUBSCRIBES_IN_FLIGHT: &str = "mart_subscribes_in_flight";
    pub const SINK_QUEUE_DEPTH: &str = "mart_sink_queue_depth";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::PUBLISHES_TOTAL, "Total number of publish requests");
    metrics::describe_counter!(names::PUBLISH_BYTES, "Total bytes of published payloads");
    metrics::describe_counter!(names::SUBSCRIBES_TOTAL, "Total number of subscribe requests");
    metrics::describe_counter!(names::LIST_TOTAL, "Total number of list requests");
    metrics::describe_counter!(names::REJECTED_TOTAL, "Requests rejected as malformed");
    metrics::describe_counter!(
        names::SINK_FAILURES_TOTAL,
        "Durability events abandoned after retries"
    );
    metrics::describe_counter!(
        names::SINK_DROPPED_TOTAL,
        "Durability events dropped by a full queue"
    );
    metrics::describe_gauge!(names::CHANNELS_ACTIVE, "Current number of channels");
    metrics::describe_gauge!(names::PARKED_SUBSCRIBERS, "Subscribers currently parked");
    metrics::describe_gauge!(
        names::SUBSCRIBES_IN_FLIGHT,
        "Subscribe requests currently being served"
    );
    metrics::describe_gauge!(names::SINK_QUEUE_DEPTH, "Durability events waiting to be written");

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

/// Record a publish.
pub fn record_publish(bytes: usize) {
    counter!(names::PUBLISHES_TOTAL).increment(1);
    counter!(names::PUBLISH_BYTES).increment(bytes as u64);
}

/// Record a list request.
pub fn record_list() {
    counter!(names::LIST_TOTAL).increment(1);
}

/// Record a rejected request.
pub fn record_rejected(endpoint: &'static str) {
    counter!(names::REJECTED_TOTAL, "endpoint" => endpoint).increment(1);
}

/// Add newly abandoned durability events.
pub fn record_sink_failures(count: u64) {
    counter!(names::SINK_FAILURES_TOTAL).increment(count);
}

/// Publish registry-level gauges.
pub fn record_registry(stats: &RegistryStats) {
    gauge!(names::CHANNELS_ACTIVE).set(stats.channel_count as f64);
    gauge!(names::PARKED_SUBSCRIBERS).set(stats.parked_subscribers as f64);
    gauge!(names::SINK_QUEUE_DEPTH).set(stats.queued_sink_events as f64);
    counter!(names::SINK_DROPPED_TOTAL).absolute(stats.dropped_sink_events);
}

/// Metrics guard counting an in-flight subscribe request.
pub struct SubscribeMetricsGuard;

impl SubscribeMetricsGuard {
    /// Create a new metrics guard, recording a subscribe request.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::SUBSCRIBES_TOTAL).increment(1);
        gauge!(names::SUBSCRIBES_IN_FLIGHT).increment(1.0);
        Self
    }
}

impl Default for SubscribeMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SubscribeMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::SUBSCRIBES_IN_FLIGHT).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_recorder() {
        // No recorder installed: every call is a no-op.
        let _guard = SubscribeMetricsGuard::new();
        record_publish(10);
        record_registry(&RegistryStats::default());
    }
}
