//! Shared fixtures for cluster tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tiling_cluster::{ClusterConfig, ClusterCoordinator, ClusterListener, InMemoryEventBus};
use tiling_core::model::{Action, CacheIdentifier, CacheJobInfo, CacheJobRequest, Status};
use tiling_core::ports::{MetaTileRequest, TileSeeder};
use tiling_core::tiles::{TilePyramid, TileRange2D};
use tiling_core::{CacheJobRegistry, InstanceId, JobId, Result};
use tiling_engine::{CacheJobEngine, DryRunSeeder, EngineConfig};
use tokio_util::sync::CancellationToken;

pub const AWAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(20);

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,tiling_cluster=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Wait for a condition with timeout.
pub async fn wait_for<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    condition().await
}

/// Let in-flight events reach every instance.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// A seeder that ignores cancellation and takes `delay` per meta-tile.
pub struct StubbornSeeder {
    pub delay: Duration,
}

#[async_trait]
impl TileSeeder for StubbornSeeder {
    async fn seed(&self, _request: MetaTileRequest<'_>) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn reseed(&self, request: MetaTileRequest<'_>) -> Result<()> {
        self.seed(request).await
    }

    async fn truncate(&self, request: MetaTileRequest<'_>) -> Result<()> {
        self.seed(request).await
    }
}

/// A seed request large enough to keep a slow seeder busy.
pub fn seed_all(layer: &str, gridset: &str) -> CacheJobRequest {
    CacheJobRequest::new(
        Action::Seed,
        CacheIdentifier::new(layer, gridset, "image/png"),
        TilePyramid::single_level(6, TileRange2D::new(0, 0, 63, 63).unwrap()),
    )
}

/// One cluster member: engine, coordinator and listener over a shared bus.
pub struct TestInstance {
    pub id: InstanceId,
    pub engine: Arc<CacheJobEngine>,
    pub coordinator: Arc<ClusterCoordinator>,
    shutdown: CancellationToken,
}

impl TestInstance {
    /// An instance whose jobs take 200ms per meta-tile.
    pub async fn start(name: &str, bus: &Arc<InMemoryEventBus>) -> Self {
        let seeder = DryRunSeeder::new().with_delay(Duration::from_millis(200));
        Self::with_seeder(name, bus, Arc::new(seeder), ClusterConfig::default()).await
    }

    pub async fn with_seeder(
        name: &str,
        bus: &Arc<InMemoryEventBus>,
        seeder: Arc<dyn TileSeeder>,
        config: ClusterConfig,
    ) -> Self {
        let id = InstanceId::new(name);
        let engine = Arc::new(
            CacheJobEngine::new(id.clone(), EngineConfig::default(), seeder).unwrap(),
        );
        let coordinator = Arc::new(ClusterCoordinator::new(
            id.clone(),
            config,
            engine.clone(),
            bus.clone(),
        ));
        let shutdown = CancellationToken::new();
        ClusterListener::new(coordinator.clone(), bus.clone())
            .start(shutdown.clone())
            .await
            .unwrap();
        Self {
            id,
            engine,
            coordinator,
            shutdown,
        }
    }

    pub fn registry(&self) -> &CacheJobRegistry {
        tiling_core::ports::LocalJobEngine::registry(self.engine.as_ref())
    }

    pub fn status(&self, id: &JobId) -> Option<Status> {
        self.coordinator.get_job_status(id).map(|status| status.status)
    }

    pub async fn launch(&self, request: CacheJobRequest) -> CacheJobInfo {
        self.coordinator.launch_job(request).await.unwrap()
    }

    /// Set a job's status as if its worker had reached it.
    pub fn force(&self, id: &JobId, status: Status) {
        self.registry().set_status(id, status).unwrap();
    }

    pub fn has_job(&self, id: &JobId) -> bool {
        self.coordinator.get_job_status(id).is_some()
    }

    pub async fn await_job(&self, job: &CacheJobInfo) -> bool {
        let id = &job.id;
        wait_for(AWAIT, POLL, || async move { self.has_job(id) }).await
    }

    pub async fn await_no_job(&self, job: &CacheJobInfo) -> bool {
        let id = &job.id;
        wait_for(AWAIT, POLL, || async move { !self.has_job(id) }).await
    }

    pub async fn await_status(&self, job: &CacheJobInfo, status: Status) -> bool {
        let id = &job.id;
        wait_for(AWAIT, POLL, || async move { self.status(id) == Some(status) }).await
    }
}

impl Drop for TestInstance {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
