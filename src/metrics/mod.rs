//! Prometheus metrics for the notification service.
//!
//! - Consumer metrics (events received, ack outcomes, broker connectivity)
//! - Dispatch metrics (final statuses, per-channel sends, latency)
//! - Store and HTTP metrics

mod helpers;

pub use helpers::{encode_metrics, ConsumerMetrics, DispatchMetrics, HttpMetrics, StoreMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "trade_notify";

lazy_static! {
    // ============================================================================
    // Consumer Metrics
    // ============================================================================

    /// Entries read from the event stream
    pub static ref EVENTS_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_received_total", METRIC_PREFIX),
        "Total events received from the broker"
    ).unwrap();

    /// Per-entry decision: ack, discard, requeue, skipped
    pub static ref EVENTS_HANDLED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_handled_total", METRIC_PREFIX),
        "Total events handled by outcome",
        &["outcome"]
    ).unwrap();

    /// Broker connection status (1 = connected, 0 = disconnected)
    pub static ref BROKER_CONNECTION_STATUS: IntGauge = register_int_gauge!(
        format!("{}_broker_connection_status", METRIC_PREFIX),
        "Broker connection status (1=connected, 0=disconnected)"
    ).unwrap();

    /// Setup routine re-entries after a broker failure
    pub static ref BROKER_RECONNECTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broker_reconnections_total", METRIC_PREFIX),
        "Total broker reconnection attempts"
    ).unwrap();

    /// Entries claimed from idle consumers
    pub static ref BROKER_CLAIMED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broker_claimed_total", METRIC_PREFIX),
        "Total pending entries claimed from idle consumers"
    ).unwrap();

    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Final notification status by reason
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_total", METRIC_PREFIX),
        "Total notifications dispatched by final status and reason",
        &["status", "reason"]
    ).unwrap();

    /// Provider calls by channel and result
    pub static ref CHANNEL_SENDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_channel_sends_total", METRIC_PREFIX),
        "Total channel sends by channel and result",
        &["channel", "result"]
    ).unwrap();

    /// Time spent in one channel's send
    pub static ref CHANNEL_SEND_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_channel_send_latency_seconds", METRIC_PREFIX),
        "Channel send latency in seconds",
        &["channel"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// End-to-end time of one event
    pub static ref DISPATCH_LATENCY: Histogram = register_histogram!(
        format!("{}_dispatch_latency_seconds", METRIC_PREFIX),
        "Event dispatch latency in seconds",
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Default profiles synthesised for first-seen users
    pub static ref DEFAULT_PROFILES_CREATED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_default_profiles_created_total", METRIC_PREFIX),
        "Total default preference profiles created"
    ).unwrap();

    // ============================================================================
    // Store Metrics
    // ============================================================================

    pub static ref STORE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_store_errors_total", METRIC_PREFIX),
        "Total store operation errors",
        &["operation"]
    ).unwrap();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_http_requests_total", METRIC_PREFIX),
        "Total HTTP requests by route and status",
        &["method", "route", "status"]
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_encode() {
        EVENTS_RECEIVED_TOTAL.inc();
        NOTIFICATIONS_TOTAL.with_label_values(&["SENT", "delivered"]).inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("trade_notify_events_received_total"));
        assert!(output.contains("trade_notify_notifications_total"));
    }
}
