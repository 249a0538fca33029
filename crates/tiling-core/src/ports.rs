//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the cluster coordinator and its
//! collaborators: the event transport, the local job engine, the tile layer
//! catalog, and the tile worker.

use crate::events::CacheJobEvent;
use crate::ids::JobId;
use crate::model::{Action, CacheIdentifier, CacheJobInfo, CacheJobRequest, CacheJobStatus};
use crate::registry::CacheJobRegistry;
use crate::request::TileLayerInfo;
use crate::tiles::TileRange2D;
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// Stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<CacheJobEvent>> + Send>>;

/// Event bus for publishing and subscribing to cluster events.
///
/// Delivery is best effort: events may be lost, duplicated, or reordered, and
/// a publisher may receive its own events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event on its [subject](CacheJobEvent::subject).
    async fn publish(&self, event: CacheJobEvent) -> Result<()>;

    /// Subscribe to events matching a pattern.
    /// Pattern supports wildcards: `jobs.*.all`, `jobs.command.>`
    async fn subscribe(&self, pattern: &str) -> Result<EventStream>;
}

/// The job engine of a single instance, the local authority on job lifecycle.
pub trait LocalJobEngine: Send + Sync {
    /// Validate the request, mint a new job, and schedule it.
    fn launch_job(&self, request: CacheJobRequest) -> Result<CacheJobInfo>;

    /// Schedule a job whose identity was minted elsewhere. Launching an id that
    /// is already registered returns the existing job and starts nothing.
    fn launch_job_info(&self, job: CacheJobInfo) -> Result<CacheJobInfo>;

    /// Request cooperative cancellation. Returns the status at the time of the
    /// call, or `None` if the job is unknown.
    fn abort_job(&self, id: &JobId) -> Option<CacheJobStatus>;

    /// Request cancellation of every non-finished job, returning their statuses.
    fn abort_all_jobs(&self) -> Vec<CacheJobStatus>;

    /// Remove and return every finished job.
    fn prune_jobs(&self) -> Vec<CacheJobStatus>;

    fn get_jobs(&self) -> Vec<CacheJobInfo>;

    fn get_job_status(&self, id: &JobId) -> Option<CacheJobStatus>;

    /// The underlying registry, for bulk reads.
    fn registry(&self) -> &CacheJobRegistry;
}

/// Resolves tile layers by name.
pub trait TileLayerCatalog: Send + Sync {
    fn layer(&self, name: &str) -> Option<TileLayerInfo>;
}

impl TileLayerCatalog for HashMap<String, TileLayerInfo> {
    fn layer(&self, name: &str) -> Option<TileLayerInfo> {
        self.get(name).cloned()
    }
}

impl TileLayerCatalog for Vec<TileLayerInfo> {
    fn layer(&self, name: &str) -> Option<TileLayerInfo> {
        self.iter().find(|layer| layer.name == name).cloned()
    }
}

/// A unit of tile work: one meta-tile of one cache at one zoom level.
#[derive(Debug, Clone, Copy)]
pub struct MetaTileRequest<'a> {
    pub cache: &'a CacheIdentifier,
    pub zoom: u8,
    pub tiles: TileRange2D,
}

/// Performs the actual tile work for the local engine.
#[async_trait]
pub trait TileSeeder: Send + Sync {
    /// Render tiles of the meta-tile that are missing.
    async fn seed(&self, request: MetaTileRequest<'_>) -> Result<()>;

    /// Render every tile of the meta-tile.
    async fn reseed(&self, request: MetaTileRequest<'_>) -> Result<()>;

    /// Delete every tile of the meta-tile.
    async fn truncate(&self, request: MetaTileRequest<'_>) -> Result<()>;

    async fn process(&self, action: Action, request: MetaTileRequest<'_>) -> Result<()> {
        match action {
            Action::Seed => self.seed(request).await,
            Action::Reseed => self.reseed(request).await,
            Action::Truncate => self.truncate(request).await,
        }
    }
}
