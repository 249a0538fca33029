//! Health of a NATS event bus connection.

use crate::metrics::NatsMetrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Connected, but events have been lost on the way in or out.
    Degraded { reason: String },
    Unhealthy { reason: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Healthy or degraded.
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded { .. })
    }
}

#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub connected: bool,
    pub reconnects: u64,
    pub events_published: u64,
    pub events_received: u64,
    pub publish_failures: u64,
    pub decode_failures: u64,
}

impl HealthCheck {
    pub fn from_metrics(metrics: &NatsMetrics, connected: bool) -> Self {
        let snapshot = metrics.snapshot();

        let status = if !connected {
            HealthStatus::Unhealthy {
                reason: "not connected to NATS".to_string(),
            }
        } else if snapshot.publish_failures > 0 || snapshot.decode_failures > 0 {
            HealthStatus::Degraded {
                reason: format!(
                    "{} publish failures, {} undecodable events",
                    snapshot.publish_failures, snapshot.decode_failures
                ),
            }
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            connected,
            reconnects: snapshot.reconnects,
            events_published: snapshot.events_published,
            events_received: snapshot.events_received,
            publish_failures: snapshot.publish_failures,
            decode_failures: snapshot.decode_failures,
        }
    }
}
