//! Event delivery loop feeding a coordinator.

use crate::coordinator::ClusterCoordinator;
use futures::StreamExt;
use futures::stream::select_all;
use std::sync::Arc;
use tiling_core::Result;
use tiling_core::events::subscription_patterns;
use tiling_core::ports::EventBus;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Subscribes to the cluster subjects of a coordinator's instance and hands
/// every received event to [`ClusterCoordinator::handle_event`].
///
/// A bad message or a failing handler is logged and does not stop delivery of
/// later events.
pub struct ClusterListener {
    coordinator: Arc<ClusterCoordinator>,
    event_bus: Arc<dyn EventBus>,
}

impl ClusterListener {
    pub fn new(coordinator: Arc<ClusterCoordinator>, event_bus: Arc<dyn EventBus>) -> Self {
        Self {
            coordinator,
            event_bus,
        }
    }

    /// Subscribe and spawn the delivery loop.
    ///
    /// Subscriptions are in place when this returns, so joining the cluster
    /// afterwards does not miss replies. The loop ends when `shutdown` is
    /// cancelled or every subscription is closed.
    pub async fn start(self, shutdown: CancellationToken) -> Result<JoinHandle<()>> {
        let instance_id = self.coordinator.instance_id().clone();
        let mut streams = Vec::new();
        for pattern in subscription_patterns(&instance_id) {
            debug!(instance_id = %instance_id, pattern = %pattern, "Subscribing");
            streams.push(self.event_bus.subscribe(&pattern).await?);
        }
        let mut events = select_all(streams);
        let coordinator = self.coordinator;

        info!(instance_id = %instance_id, "Cluster listener started");
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!(instance_id = %instance_id, "Cluster listener shutting down");
                        break;
                    }
                    next = events.next() => match next {
                        Some(Ok(event)) => {
                            let kind = event.kind();
                            if let Err(e) = coordinator.handle_event(event).await {
                                warn!(instance_id = %instance_id, kind, error = %e, "Failed to handle event");
                            }
                        }
                        Some(Err(e)) => {
                            warn!(instance_id = %instance_id, error = %e, "Dropping undecodable event");
                        }
                        None => {
                            info!(instance_id = %instance_id, "Event subscriptions closed");
                            break;
                        }
                    }
                }
            }
        }))
    }
}
