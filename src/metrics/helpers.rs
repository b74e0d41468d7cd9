//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::notification::{Channel, NotificationStatus};

use super::{
    BROKER_CLAIMED_TOTAL, BROKER_CONNECTION_STATUS, BROKER_RECONNECTIONS_TOTAL,
    CHANNEL_SENDS_TOTAL, CHANNEL_SEND_LATENCY, DEFAULT_PROFILES_CREATED_TOTAL, DISPATCH_LATENCY,
    EVENTS_HANDLED_TOTAL, EVENTS_RECEIVED_TOTAL, HTTP_REQUESTS_TOTAL, NOTIFICATIONS_TOTAL,
    STORE_ERRORS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording consumer metrics
pub struct ConsumerMetrics;

impl ConsumerMetrics {
    pub fn record_received() {
        EVENTS_RECEIVED_TOTAL.inc();
    }

    /// Record the decision taken for one entry
    pub fn record_outcome(outcome: &str) {
        EVENTS_HANDLED_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn set_connected(connected: bool) {
        BROKER_CONNECTION_STATUS.set(if connected { 1 } else { 0 });
    }

    pub fn record_reconnect() {
        BROKER_RECONNECTIONS_TOTAL.inc();
    }

    pub fn record_claimed(count: u64) {
        BROKER_CLAIMED_TOTAL.inc_by(count);
    }
}

/// Helper struct for recording dispatch metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a finished dispatch and why it ended the way it did
    pub fn record_outcome(status: NotificationStatus, reason: &str, elapsed: Duration) {
        NOTIFICATIONS_TOTAL
            .with_label_values(&[status.as_str(), reason])
            .inc();
        DISPATCH_LATENCY.observe(elapsed.as_secs_f64());
    }

    pub fn record_channel(channel: Channel, success: bool, elapsed: Duration) {
        let result = if success { "success" } else { "failure" };
        CHANNEL_SENDS_TOTAL
            .with_label_values(&[channel.as_str(), result])
            .inc();
        CHANNEL_SEND_LATENCY
            .with_label_values(&[channel.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_default_profile() {
        DEFAULT_PROFILES_CREATED_TOTAL.inc();
    }
}

/// Helper struct for recording store metrics
pub struct StoreMetrics;

impl StoreMetrics {
    pub fn record_error(operation: &str) {
        STORE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
    }
}

/// Helper struct for recording HTTP metrics
pub struct HttpMetrics;

impl HttpMetrics {
    pub fn record_request(method: &str, route: &str, status: u16) {
        let status = status.to_string();
        HTTP_REQUESTS_TOTAL
            .with_label_values(&[method, route, status.as_str()])
            .inc();
    }
}
