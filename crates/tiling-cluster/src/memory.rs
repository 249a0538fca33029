//! In-process event bus using `tokio::sync::broadcast`.
//!
//! Events are serialized on publish and decoded separately by every matching
//! subscriber, so instances sharing a bus never share event values. A
//! subscriber that falls more than `capacity` events behind loses the oldest
//! ones, which makes this bus as unreliable as the cluster protocol expects.

use async_trait::async_trait;
use futures::stream;
use std::sync::Arc;
use tiling_core::events::{CacheJobEvent, subject_matches};
use tiling_core::ports::{EventBus, EventStream};
use tiling_core::{Error, Result};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{trace, warn};

#[derive(Debug, Clone)]
struct Message {
    subject: Arc<str>,
    payload: Arc<[u8]>,
}

/// Event bus for instances living in the same process.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<Message>,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(1_024)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: CacheJobEvent) -> Result<()> {
        let message = Message {
            subject: event.subject().into(),
            payload: serde_json::to_vec(&event)?.into(),
        };
        trace!(subject = %message.subject, kind = event.kind(), "Publishing event");
        // no subscribers is not an error for a broadcast medium
        let _ = self.sender.send(message);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<EventStream> {
        if pattern.is_empty() {
            return Err(Error::EventBus("empty subscription pattern".to_string()));
        }
        let receiver = self.sender.subscribe();
        let pattern = pattern.to_string();

        let stream = stream::unfold((receiver, pattern), |(mut receiver, pattern)| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) if subject_matches(&pattern, &message.subject) => {
                        let event = serde_json::from_slice::<CacheJobEvent>(&message.payload)
                            .map_err(Error::from);
                        return Some((event, (receiver, pattern)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(pattern = %pattern, skipped, "Subscriber lagged, events dropped");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
