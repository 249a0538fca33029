//! Core NATS publish/subscribe event bus.
//!
//! Cluster events are fire-and-forget: no JetStream, no acks, no replay. An
//! instance that is disconnected while an event is published never sees it,
//! which the cluster protocol tolerates.

use async_nats::connection::State;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tiling_core::events::CacheJobEvent;
use tiling_core::ports::{EventBus, EventStream};
use tiling_core::{Error, Result};
use tracing::{debug, error, info, warn};

use crate::config::NatsConfig;
use crate::health::HealthCheck;
use crate::metrics::NatsMetrics;

/// Event bus over a NATS connection, scoped to a subject prefix.
#[derive(Clone)]
pub struct NatsEventBus {
    client: async_nats::Client,
    config: NatsConfig,
    metrics: Arc<NatsMetrics>,
    shutdown: Arc<AtomicBool>,
}

impl NatsEventBus {
    /// Connect to a single server with default settings.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(NatsConfig::new(url)).await
    }

    pub async fn connect_with_config(config: NatsConfig) -> Result<Self> {
        let urls = config.urls.join(",");
        info!(urls = %urls, prefix = %config.subject_prefix, "Connecting to NATS");

        let metrics = NatsMetrics::new();
        let callback_metrics = metrics.clone();

        let mut options = async_nats::ConnectOptions::new()
            .connection_timeout(config.connection_timeout())
            .request_timeout(Some(config.request_timeout()))
            .max_reconnects(config.max_reconnect_attempts)
            .retry_on_initial_connect()
            .event_callback(move |event| {
                let metrics = callback_metrics.clone();
                async move {
                    match event {
                        async_nats::Event::Connected => {
                            metrics.record_connected();
                            info!("NATS connection established");
                        }
                        async_nats::Event::Disconnected => {
                            metrics.record_disconnected();
                            warn!("NATS connection lost");
                        }
                        other => debug!(event = ?other, "NATS client event"),
                    }
                }
            });
        if let Some(name) = &config.name {
            options = options.name(name);
        }

        let client = options
            .connect(urls.as_str())
            .await
            .map_err(|e| Error::EventBus(format!("Failed to connect to NATS: {}", e)))?;
        metrics.record_connected();

        Ok(Self {
            client,
            config,
            metrics,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<NatsMetrics> {
        &self.metrics
    }

    pub fn health_check(&self) -> HealthCheck {
        HealthCheck::from_metrics(&self.metrics, self.is_connected())
    }

    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == State::Connected
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Flush pending publishes and close every subscription.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Draining NATS connection");

        if let Err(e) = self.client.drain().await {
            error!(error = %e, "Error draining NATS connection");
        }

        self.metrics.record_disconnected();
        info!("NATS connection drained");
        Ok(())
    }
}

/// Decode a received payload, counting it either way.
fn decode(metrics: &NatsMetrics, payload: &[u8]) -> Result<CacheJobEvent> {
    metrics.record_receive(payload.len() as u64);
    serde_json::from_slice::<CacheJobEvent>(payload).map_err(|e| {
        metrics.record_decode_failure();
        Error::from(e)
    })
}

#[async_trait]
impl EventBus for NatsEventBus {
    async fn publish(&self, event: CacheJobEvent) -> Result<()> {
        if self.is_shutdown() {
            return Err(Error::EventBus(
                "Cannot publish: shutdown in progress".to_string(),
            ));
        }

        let subject = self.config.prefixed(&event.subject());
        let payload = serde_json::to_vec(&event)?;
        let payload_len = payload.len() as u64;
        debug!(subject = %subject, kind = event.kind(), "Publishing event");

        match self.client.publish(subject.clone(), payload.into()).await {
            Ok(()) => {
                self.metrics.record_publish(payload_len);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_publish_failure();
                Err(Error::EventBus(format!(
                    "Failed to publish to {}: {}",
                    subject, e
                )))
            }
        }
    }

    async fn subscribe(&self, pattern: &str) -> Result<EventStream> {
        if pattern.is_empty() {
            return Err(Error::EventBus("empty subscription pattern".to_string()));
        }
        let subject = self.config.prefixed(pattern);
        debug!(subject = %subject, "Subscribing");

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| Error::EventBus(format!("Failed to subscribe to {}: {}", subject, e)))?;

        let metrics = self.metrics.clone();
        let stream = subscriber.map(move |message| decode(&metrics, &message.payload));

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiling_core::InstanceId;
    use tiling_core::events::PruneJobsCommand;

    #[test]
    fn test_decode_counts_good_and_bad_payloads() {
        let metrics = NatsMetrics::new();
        let event: CacheJobEvent = PruneJobsCommand {
            instance_id: InstanceId::new("gwc-1"),
        }
        .into();
        let payload = serde_json::to_vec(&event).unwrap();

        assert_eq!(decode(&metrics, &payload).unwrap(), event);
        assert!(matches!(
            decode(&metrics, b"{\"type\":\"reboot\"}"),
            Err(Error::Serialization(_))
        ));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_received, 2);
        assert_eq!(snapshot.decode_failures, 1);
        assert_eq!(snapshot.bytes_received, payload.len() as u64 + 17);
    }
}
