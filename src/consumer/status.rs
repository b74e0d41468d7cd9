//! Broker connection state, shared between the consumer task and the health
//! endpoint.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

use serde::Serialize;

use crate::metrics::ConsumerMetrics;

#[derive(Debug, Default)]
pub struct ConsumerStatus {
    connected: AtomicBool,
    last_connected_ms: AtomicI64,
    /// Failures since the last successful setup
    reconnection_attempts: AtomicU32,
    total_reconnections: AtomicU32,
}

impl ConsumerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The consumer group is bound and reads are flowing
    pub fn set_connected(&self) {
        let was_down = !self.connected.swap(true, Ordering::AcqRel);
        self.last_connected_ms
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Release);

        if was_down && self.reconnection_attempts.load(Ordering::Acquire) > 0 {
            self.total_reconnections.fetch_add(1, Ordering::AcqRel);
        }
        self.reconnection_attempts.store(0, Ordering::Release);
        ConsumerMetrics::set_connected(true);
    }

    /// The connection was lost; setup will be retried
    pub fn set_reconnecting(&self) {
        self.connected.store(false, Ordering::Release);
        self.reconnection_attempts.fetch_add(1, Ordering::AcqRel);
        ConsumerMetrics::set_connected(false);
        ConsumerMetrics::record_reconnect();
    }

    /// Stopped on shutdown
    pub fn set_stopped(&self) {
        self.connected.store(false, Ordering::Release);
        ConsumerMetrics::set_connected(false);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ConsumerStatusSnapshot {
        ConsumerStatusSnapshot {
            connected: self.is_connected(),
            last_connected_ms: self.last_connected_ms.load(Ordering::Acquire),
            reconnection_attempts: self.reconnection_attempts.load(Ordering::Acquire),
            total_reconnections: self.total_reconnections.load(Ordering::Acquire),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumerStatusSnapshot {
    pub connected: bool,
    pub last_connected_ms: i64,
    pub reconnection_attempts: u32,
    pub total_reconnections: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initially_disconnected() {
        let status = ConsumerStatus::new();
        assert!(!status.is_connected());
        assert_eq!(status.snapshot().last_connected_ms, 0);
    }

    #[test]
    fn test_reconnection_is_counted_once_per_recovery() {
        let status = ConsumerStatus::new();
        status.set_connected();
        assert_eq!(status.snapshot().total_reconnections, 0);

        status.set_reconnecting();
        status.set_reconnecting();
        assert_eq!(status.snapshot().reconnection_attempts, 2);

        status.set_connected();
        let snapshot = status.snapshot();
        assert!(snapshot.connected);
        assert_eq!(snapshot.total_reconnections, 1);
        assert_eq!(snapshot.reconnection_attempts, 0);
    }
}
