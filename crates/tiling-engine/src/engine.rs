//! Main engine implementation.

use crate::config::EngineConfig;
use crate::runner::JobRunner;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tiling_core::ports::{LocalJobEngine, TileSeeder};
use tiling_core::{
    CacheJobInfo, CacheJobRegistry, CacheJobRequest, CacheJobStatus, Error, InstanceId, JobId,
    Result, Status,
};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runs the cache jobs of one instance.
///
/// Jobs run as tokio tasks; at most `max_concurrent_jobs` of them do tile work
/// at once and the rest wait in the scheduled state. Aborting is cooperative.
pub struct CacheJobEngine {
    instance_id: InstanceId,
    registry: Arc<CacheJobRegistry>,
    runner: Arc<JobRunner>,
    job_semaphore: Arc<Semaphore>,
    cancellations: Arc<DashMap<JobId, CancellationToken>>,
    sequence: AtomicU64,
}

impl CacheJobEngine {
    /// Create a new engine.
    pub fn new(
        instance_id: InstanceId,
        config: EngineConfig,
        seeder: Arc<dyn TileSeeder>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(CacheJobRegistry::new());
        let runner = Arc::new(JobRunner::new(&config, Arc::clone(&registry), seeder));
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs as usize));

        info!(
            instance_id = %instance_id,
            max_concurrent_jobs = config.max_concurrent_jobs,
            "Cache job engine created"
        );

        Ok(Self {
            instance_id,
            registry,
            runner,
            job_semaphore,
            cancellations: Arc::new(DashMap::new()),
            sequence: AtomicU64::new(0),
        })
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// Number of jobs that have been started and not yet finished.
    pub fn active_jobs(&self) -> usize {
        self.cancellations.len()
    }

    fn spawn(&self, handle: &Handle, job: CacheJobInfo) {
        let cancel = CancellationToken::new();
        self.cancellations.insert(job.id.clone(), cancel.clone());

        let registry = Arc::clone(&self.registry);
        let runner = Arc::clone(&self.runner);
        let semaphore = Arc::clone(&self.job_semaphore);
        let cancellations = Arc::clone(&self.cancellations);

        handle.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };

            match permit {
                Some(_permit) => {
                    runner.run(&job, &cancel).await;
                }
                None => {
                    info!(job_id = %job.id, "Job aborted while waiting for a slot");
                    registry.set_status(&job.id, Status::Aborted);
                }
            }
            cancellations.remove(&job.id);
        });
    }
}

impl LocalJobEngine for CacheJobEngine {
    fn launch_job(&self, request: CacheJobRequest) -> Result<CacheJobInfo> {
        request.validate()?;
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let job = CacheJobInfo::new(JobId::generate(&self.instance_id, seq), request);
        self.launch_job_info(job)
    }

    fn launch_job_info(&self, job: CacheJobInfo) -> Result<CacheJobInfo> {
        job.request.validate()?;
        let handle = Handle::try_current().map_err(|e| {
            Error::IllegalState(format!("cache jobs need a tokio runtime: {}", e))
        })?;

        let (status, added) = self.registry.add(job);
        if !added {
            debug!(job_id = %status.job.id, status = %status.status, "Job already known, not launching");
            return Ok(status.job);
        }

        info!(
            job_id = %status.job.id,
            action = %status.job.request.action,
            cache = %status.job.request.cache,
            "Job scheduled"
        );
        self.spawn(&handle, status.job.clone());
        Ok(status.job)
    }

    fn abort_job(&self, id: &JobId) -> Option<CacheJobStatus> {
        let current = self.registry.get_status(id)?;
        if current.is_finished() {
            return Some(current);
        }
        if let Some(cancel) = self.cancellations.get(id) {
            cancel.cancel();
        }
        info!(job_id = %id, "Abort requested");
        self.registry.set_status(id, Status::Aborting)
    }

    fn abort_all_jobs(&self) -> Vec<CacheJobStatus> {
        self.registry
            .get_all_alive()
            .iter()
            .filter_map(|status| self.abort_job(status.job_id()))
            .collect()
    }

    fn prune_jobs(&self) -> Vec<CacheJobStatus> {
        let pruned = self.registry.prune();
        if !pruned.is_empty() {
            debug!(count = pruned.len(), "Pruned finished jobs");
        }
        pruned
    }

    fn get_jobs(&self) -> Vec<CacheJobInfo> {
        self.registry.jobs()
    }

    fn get_job_status(&self, id: &JobId) -> Option<CacheJobStatus> {
        self.registry.get_status(id)
    }

    fn registry(&self) -> &CacheJobRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeder::DryRunSeeder;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tiling_core::model::{Action, CacheIdentifier};
    use tiling_core::tiles::{TilePyramid, TileRange2D};
    use tokio_test::assert_ok;

    fn request(max: u64) -> CacheJobRequest {
        CacheJobRequest::new(
            Action::Seed,
            CacheIdentifier::new("layerX", "EPSG:900913", "image/png"),
            TilePyramid::single_level(4, TileRange2D::new(0, 0, max, max).unwrap()),
        )
    }

    fn engine(max_concurrent: u32, delay_ms: u64) -> CacheJobEngine {
        let seeder = DryRunSeeder::new().with_delay(Duration::from_millis(delay_ms));
        CacheJobEngine::new(
            InstanceId::new("gwc-1"),
            EngineConfig::default().with_max_concurrent_jobs(max_concurrent),
            Arc::new(seeder),
        )
        .unwrap()
    }

    async fn wait_until_finished(engine: &CacheJobEngine, id: &JobId) -> CacheJobStatus {
        loop {
            let status = engine.get_job_status(id).unwrap();
            if status.is_finished() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_runs_to_completion() {
        let engine = engine(4, 100);
        let job = assert_ok!(engine.launch_job(request(7)));

        assert!(job.id.as_str().starts_with("gwc-1-000001-"));
        assert_eq!(job.id.origin(), Some("gwc-1"));

        let status = wait_until_finished(&engine, &job.id).await;
        assert_eq!(status.status, Status::Complete);
        assert_eq!(status.tiles_processed, 64);
        assert_eq!(engine.active_jobs(), 0);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let engine = engine(1, 0);
        let mut bad = request(3);
        bad.cache.format = String::new();
        assert!(matches!(engine.launch_job(bad), Err(Error::InvalidRequest(_))));
        assert!(engine.get_jobs().is_empty());
    }

    #[test]
    fn test_launch_requires_runtime() {
        let engine = engine(1, 0);
        let result = engine.launch_job(request(3));
        assert!(matches!(result, Err(Error::IllegalState(_))));
        assert!(engine.get_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_job_info_is_idempotent() {
        let engine = engine(4, 100);
        let job = CacheJobInfo::new(JobId::new("gwc-2-000001-abcdef01"), request(3));

        let first = engine.launch_job_info(job.clone()).unwrap();
        let second = engine.launch_job_info(job.clone()).unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.get_jobs().len(), 1);
        assert_eq!(engine.active_jobs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_running_job() {
        let engine = engine(4, 1_000);
        let job = engine.launch_job(request(15)).unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(engine.get_job_status(&job.id).unwrap().status, Status::Running);

        let aborting = engine.abort_job(&job.id).unwrap();
        assert_eq!(aborting.status, Status::Aborting);
        // idempotent
        assert_eq!(engine.abort_job(&job.id).unwrap().status, Status::Aborting);

        let status = wait_until_finished(&engine, &job.id).await;
        assert_eq!(status.status, Status::Aborted);
        assert!(status.tiles_processed < status.tiles_total);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_while_waiting_for_slot() {
        let engine = engine(1, 1_000);
        let running = engine.launch_job(request(15)).unwrap();
        let waiting = engine.launch_job(request(15)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(engine.get_job_status(&waiting.id).unwrap().status, Status::Scheduled);

        engine.abort_job(&waiting.id);
        let status = wait_until_finished(&engine, &waiting.id).await;
        assert_eq!(status.status, Status::Aborted);
        assert_eq!(status.started_at, None);
        assert_eq!(engine.get_job_status(&running.id).unwrap().status, Status::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_all_and_prune() {
        let engine = engine(2, 1_000);
        let jobs: Vec<_> = (0..3)
            .map(|_| engine.launch_job(request(15)).unwrap())
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let aborted = engine.abort_all_jobs();
        assert_eq!(aborted.len(), 3);
        assert!(aborted.iter().all(|status| status.status == Status::Aborting));
        assert!(engine.abort_job(&JobId::new("unknown")).is_none());

        for job in &jobs {
            wait_until_finished(&engine, &job.id).await;
        }
        let pruned = engine.prune_jobs();
        assert_eq!(pruned.len(), 3);
        assert!(engine.get_jobs().is_empty());
        assert!(engine.prune_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_finished_job_returns_terminal_status() {
        let engine = engine(1, 0);
        let job = engine.launch_job(request(1)).unwrap();
        wait_until_finished(&engine, &job.id).await;

        let status = engine.abort_job(&job.id).unwrap();
        assert_eq!(status.status, Status::Complete);
    }
}
