//! Tile seeder that renders nothing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tiling_core::Result;
use tiling_core::ports::{MetaTileRequest, TileSeeder};
use tracing::trace;

/// Accepts every meta-tile, optionally sleeping to simulate render time, and
/// counts the tiles it was asked to process.
#[derive(Debug, Default)]
pub struct DryRunSeeder {
    delay: Duration,
    tiles_seeded: AtomicU64,
    tiles_truncated: AtomicU64,
}

impl DryRunSeeder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time spent on each meta-tile.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn tiles_seeded(&self) -> u64 {
        self.tiles_seeded.load(Ordering::Relaxed)
    }

    pub fn tiles_truncated(&self) -> u64 {
        self.tiles_truncated.load(Ordering::Relaxed)
    }

    async fn simulate(&self, operation: &str, request: MetaTileRequest<'_>, counter: &AtomicU64) {
        trace!(
            cache = %request.cache,
            zoom = request.zoom,
            tiles = %request.tiles,
            operation,
            "dry run"
        );
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        counter.fetch_add(request.tiles.count(), Ordering::Relaxed);
    }
}

#[async_trait]
impl TileSeeder for DryRunSeeder {
    async fn seed(&self, request: MetaTileRequest<'_>) -> Result<()> {
        self.simulate("seed", request, &self.tiles_seeded).await;
        Ok(())
    }

    async fn reseed(&self, request: MetaTileRequest<'_>) -> Result<()> {
        self.simulate("reseed", request, &self.tiles_seeded).await;
        Ok(())
    }

    async fn truncate(&self, request: MetaTileRequest<'_>) -> Result<()> {
        self.simulate("truncate", request, &self.tiles_truncated).await;
        Ok(())
    }
}
