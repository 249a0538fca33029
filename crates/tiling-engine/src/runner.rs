//! Job execution logic.

use crate::config::EngineConfig;
use std::sync::Arc;
use std::time::Instant;
use tiling_core::ports::{MetaTileRequest, TileSeeder};
use tiling_core::{CacheJobInfo, CacheJobRegistry, Status};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives a single job through its meta-tiles, recording progress and the
/// final status in the registry.
pub struct JobRunner {
    registry: Arc<CacheJobRegistry>,
    seeder: Arc<dyn TileSeeder>,
    meta_tile_width: u32,
    meta_tile_height: u32,
}

impl JobRunner {
    pub fn new(
        config: &EngineConfig,
        registry: Arc<CacheJobRegistry>,
        seeder: Arc<dyn TileSeeder>,
    ) -> Self {
        Self {
            registry,
            seeder,
            meta_tile_width: config.meta_tile_width,
            meta_tile_height: config.meta_tile_height,
        }
    }

    /// Run a job to completion, failure, or cancellation.
    ///
    /// Cancellation is observed between meta-tiles: a meta-tile already handed
    /// to the seeder is finished first.
    pub async fn run(&self, job: &CacheJobInfo, cancel: &CancellationToken) -> Status {
        let id = &job.id;
        let request = &job.request;

        if cancel.is_cancelled() || !self.registry.mark_running(id) {
            info!(job_id = %id, "Job aborted before it started");
            return self.finish(job, Status::Aborted);
        }

        let start = Instant::now();
        info!(
            job_id = %id,
            action = %request.action,
            cache = %request.cache,
            tiles = request.tiles.count(),
            "Starting job execution"
        );

        for level in request.tiles.levels() {
            debug!(job_id = %id, zoom = level.zoom, range = %level.range, "Processing zoom level");
            for tiles in level
                .range
                .meta_tiles(self.meta_tile_width, self.meta_tile_height)
            {
                if cancel.is_cancelled() {
                    info!(
                        job_id = %id,
                        zoom = level.zoom,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Job aborted"
                    );
                    return self.finish(job, Status::Aborted);
                }

                let unit = MetaTileRequest {
                    cache: &request.cache,
                    zoom: level.zoom,
                    tiles,
                };
                if let Err(e) = self.seeder.process(request.action, unit).await {
                    warn!(job_id = %id, zoom = level.zoom, tiles = %tiles, error = %e, "Job failed");
                    return self
                        .registry
                        .set_failed(id, e.to_string())
                        .map(|status| status.status)
                        .unwrap_or(Status::Failed);
                }
                self.registry.add_progress(id, tiles.count());
                tokio::task::yield_now().await;
            }
        }

        info!(
            job_id = %id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Job completed successfully"
        );
        self.finish(job, Status::Complete)
    }

    fn finish(&self, job: &CacheJobInfo, status: Status) -> Status {
        self.registry
            .set_status(&job.id, status)
            .map(|current| current.status)
            .unwrap_or(status)
    }
}
