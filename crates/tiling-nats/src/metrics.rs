//! Counters for the NATS event bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct NatsMetrics {
    pub events_published: AtomicU64,
    pub events_received: AtomicU64,
    pub publish_failures: AtomicU64,
    /// Messages on a subscribed subject that did not decode as an event.
    pub decode_failures: AtomicU64,
    pub disconnects: AtomicU64,
    pub reconnects: AtomicU64,
    pub bytes_published: AtomicU64,
    pub bytes_received: AtomicU64,
    connected: AtomicBool,
}

impl NatsMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_publish(&self, bytes: u64) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        self.bytes_published.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_receive(&self, bytes: u64) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Connections after a disconnect count as reconnects.
    pub fn record_connected(&self) {
        let was_connected = self.connected.swap(true, Ordering::Relaxed);
        if !was_connected && self.disconnects.load(Ordering::Relaxed) > 0 {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_disconnected(&self) {
        if self.connected.swap(false, Ordering::Relaxed) {
            self.disconnects.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            connected: self.connected.load(Ordering::Relaxed),
            bytes_published: self.bytes_published.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`NatsMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_published: u64,
    pub events_received: u64,
    pub publish_failures: u64,
    pub decode_failures: u64,
    pub disconnects: u64,
    pub reconnects: u64,
    pub connected: bool,
    pub bytes_published: u64,
    pub bytes_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = NatsMetrics::new();
        metrics.record_publish(120);
        metrics.record_publish(30);
        metrics.record_receive(64);
        metrics.record_publish_failure();
        metrics.record_decode_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_published, 2);
        assert_eq!(snapshot.bytes_published, 150);
        assert_eq!(snapshot.events_received, 1);
        assert_eq!(snapshot.bytes_received, 64);
        assert_eq!(snapshot.publish_failures, 1);
        assert_eq!(snapshot.decode_failures, 1);
    }

    #[test]
    fn test_reconnects_skip_initial_connection() {
        let metrics = NatsMetrics::new();
        metrics.record_connected();
        assert_eq!(metrics.snapshot().reconnects, 0);

        metrics.record_disconnected();
        assert!(!metrics.snapshot().connected);
        metrics.record_connected();
        metrics.record_connected();

        let snapshot = metrics.snapshot();
        assert!(snapshot.connected);
        assert_eq!(snapshot.disconnects, 1);
        assert_eq!(snapshot.reconnects, 1);
    }
}
