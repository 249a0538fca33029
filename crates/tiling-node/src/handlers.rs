//! Command handlers.

use std::error::Error;
use std::sync::Arc;
use tiling_cluster::{ClusterCoordinator, ClusterListener, InMemoryEventBus};
use tiling_core::events;
use tiling_core::ports::EventBus;
use tiling_engine::{CacheJobEngine, DryRunSeeder};
use tiling_nats::NatsEventBus;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{NodeConfig, Transport};

type HandlerResult = Result<(), Box<dyn Error>>;

pub fn schema() -> HandlerResult {
    println!("{}", serde_json::to_string_pretty(&events::schema())?);
    Ok(())
}

pub fn show_config(mut config: NodeConfig) -> HandlerResult {
    config.resolve_instance_id();
    config.validate()?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

/// Run one cluster member until Ctrl-C, then leave the cluster.
pub async fn serve(mut config: NodeConfig) -> HandlerResult {
    let instance_id = config.resolve_instance_id();
    config.validate()?;
    let startup = config.startup_requests()?;

    let (event_bus, nats): (Arc<dyn EventBus>, Option<Arc<NatsEventBus>>) =
        match config.transport {
            Transport::Nats => {
                let nats_config = config.nats.clone().with_name(instance_id.as_str());
                let nats = Arc::new(NatsEventBus::connect_with_config(nats_config).await?);
                let bus: Arc<dyn EventBus> = nats.clone();
                (bus, Some(nats))
            }
            Transport::Memory => {
                warn!(instance_id = %instance_id, "In-memory transport, no other instance can join");
                let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::default());
                (bus, None)
            }
        };

    let seeder = DryRunSeeder::new().with_delay(config.seeder_delay());
    let engine = Arc::new(CacheJobEngine::new(
        instance_id.clone(),
        config.engine.clone(),
        Arc::new(seeder),
    )?);
    let coordinator = Arc::new(ClusterCoordinator::new(
        instance_id.clone(),
        config.cluster.clone(),
        engine,
        event_bus.clone(),
    ));

    let shutdown = CancellationToken::new();
    let listener = ClusterListener::new(coordinator.clone(), event_bus)
        .start(shutdown.clone())
        .await?;

    coordinator.join_cluster().await?;
    info!(instance_id = %instance_id, "Joined cluster");

    for request in startup {
        let job = coordinator.launch_job(request).await?;
        info!(instance_id = %instance_id, job_id = %job.id, cache = %job.request.cache, "Launched startup job");
    }

    tokio::signal::ctrl_c().await?;
    info!(instance_id = %instance_id, "Interrupted, leaving cluster");

    if let Err(e) = coordinator.leave_cluster().await {
        warn!(instance_id = %instance_id, error = %e, "Failed to announce leave");
    }
    shutdown.cancel();
    if let Err(e) = listener.await {
        warn!(instance_id = %instance_id, error = %e, "Cluster listener ended abnormally");
    }
    if let Some(nats) = nats {
        nats.shutdown().await?;
    }

    info!(instance_id = %instance_id, "Node stopped");
    Ok(())
}
