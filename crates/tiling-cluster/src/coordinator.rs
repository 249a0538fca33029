//! Cluster-wide job coordination.
//!
//! Every mutation is applied to the local engine first and then broadcast as a
//! command for the other instances to apply to theirs. No acknowledgements
//! are awaited. Job-status reports from other instances are mirrored into the
//! [`RemoteJobRegistry`] and merged into the local engine: a live job this
//! instance does not know about is launched locally with the same identity.

use crate::config::ClusterConfig;
use crate::remote::RemoteJobRegistry;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tiling_core::events::{
    AbortJobCommand, CacheJobEvent, DescribeJobsCommand, DescribeJobsResponse, LaunchJobCommand,
    PruneJobsCommand,
};
use tiling_core::ports::{EventBus, LocalJobEngine};
use tiling_core::{
    CacheJobInfo, CacheJobRequest, CacheJobStatus, Error, InstanceId, JobId, Result,
};
use tracing::{debug, info, trace, warn};

/// Joins an instance's local engine to the cluster.
///
/// The coordinator is either running (joined) or not. While not running,
/// mutating operations fail with [`Error::IllegalState`] and remote events
/// are ignored; reads always go to the local engine.
pub struct ClusterCoordinator {
    instance_id: InstanceId,
    config: ClusterConfig,
    engine: Arc<dyn LocalJobEngine>,
    event_bus: Arc<dyn EventBus>,
    remote: RemoteJobRegistry,
    joined: AtomicBool,
}

impl ClusterCoordinator {
    pub fn new(
        instance_id: InstanceId,
        config: ClusterConfig,
        engine: Arc<dyn LocalJobEngine>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            instance_id,
            config,
            engine,
            event_bus,
            remote: RemoteJobRegistry::new(),
            joined: AtomicBool::new(false),
        }
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn is_running(&self) -> bool {
        self.joined.load(Ordering::SeqCst)
    }

    pub fn remote_registry(&self) -> &RemoteJobRegistry {
        &self.remote
    }

    /// Join the cluster and ask every other instance to describe its live jobs.
    ///
    /// Returns `false` if already joined. The running flag is set before the
    /// broadcast, so a publish failure leaves the coordinator running.
    pub async fn join_cluster(&self) -> Result<bool> {
        if self
            .joined
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(instance_id = %self.instance_id, "Already joined the cluster");
            return Ok(false);
        }
        info!(instance_id = %self.instance_id, "Joined the cluster");

        self.publish(DescribeJobsCommand {
            instance_id: self.instance_id.clone(),
            target_instance_id: None,
            include_terminated: false,
        })
        .await?;
        Ok(true)
    }

    /// Leave the cluster, aborting every local job first.
    ///
    /// Waits up to the configured leave timeout for aborted jobs to terminate,
    /// then prunes finished jobs and broadcasts them so other instances stop
    /// expecting this one to run them. A job that does not terminate in time
    /// is logged and left behind. Returns `false` if not joined.
    pub async fn leave_cluster(&self) -> Result<bool> {
        if self
            .joined
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(instance_id = %self.instance_id, "Not part of the cluster");
            return Ok(false);
        }
        info!(instance_id = %self.instance_id, "Leaving the cluster");

        let aborting = self.engine.abort_all_jobs();
        if !aborting.is_empty() {
            info!(
                instance_id = %self.instance_id,
                jobs = aborting.len(),
                timeout_ms = self.config.leave_timeout_ms,
                "Waiting for aborted jobs to terminate"
            );
        }
        let terminations = join_all(
            aborting
                .into_iter()
                .map(|status| self.await_termination(status)),
        )
        .await;
        for result in terminations {
            if let Err(e) = result {
                warn!(instance_id = %self.instance_id, error = %e, "Leaving the cluster with a live job");
            }
        }

        let pruned = self.engine.prune_jobs();
        info!(
            instance_id = %self.instance_id,
            pruned = pruned.len(),
            "Left the cluster"
        );
        self.publish(DescribeJobsResponse {
            instance_id: self.instance_id.clone(),
            target_instance_id: None,
            jobs: pruned,
        })
        .await?;
        Ok(true)
    }

    /// Launch a job locally and ask every other instance to launch it too.
    pub async fn launch_job(&self, request: CacheJobRequest) -> Result<CacheJobInfo> {
        self.ensure_running("launch a job")?;
        let job = self.engine.launch_job(request)?;
        info!(instance_id = %self.instance_id, job_id = %job.id, "Launched job");

        self.publish(LaunchJobCommand {
            instance_id: self.instance_id.clone(),
            job: job.clone(),
        })
        .await?;
        Ok(job)
    }

    /// Abort a job locally and on every other instance.
    ///
    /// The abort is broadcast even if the job is unknown here, since another
    /// instance may run it. Returns the local status, if any.
    pub async fn abort_job(&self, id: &JobId) -> Result<Option<CacheJobStatus>> {
        self.ensure_running("abort a job")?;
        let status = self.engine.abort_job(id);
        match &status {
            Some(status) => {
                info!(instance_id = %self.instance_id, job_id = %id, status = %status.status, "Aborting job")
            }
            None => {
                debug!(instance_id = %self.instance_id, job_id = %id, "Job unknown locally, broadcasting abort")
            }
        }

        self.publish(AbortJobCommand {
            instance_id: self.instance_id.clone(),
            job_id: id.clone(),
        })
        .await?;
        Ok(status)
    }

    /// Prune local finished jobs and ask every other instance to prune theirs.
    pub async fn prune_jobs(&self) -> Result<Vec<CacheJobStatus>> {
        self.ensure_running("prune jobs")?;
        let pruned = self.engine.prune_jobs();
        debug!(instance_id = %self.instance_id, pruned = pruned.len(), "Pruned jobs");

        self.publish(PruneJobsCommand {
            instance_id: self.instance_id.clone(),
        })
        .await?;
        Ok(pruned)
    }

    pub fn get_jobs(&self) -> Vec<CacheJobInfo> {
        self.engine.get_jobs()
    }

    pub fn get_job_status(&self, id: &JobId) -> Option<CacheJobStatus> {
        self.engine.get_job_status(id)
    }

    /// Apply an event received from the cluster.
    ///
    /// Events are ignored while not running, when published by this instance,
    /// and when addressed to another instance.
    pub async fn handle_event(&self, event: CacheJobEvent) -> Result<()> {
        if !self.shall_consume(&event) || !event.is_addressed_to(&self.instance_id) {
            trace!(
                instance_id = %self.instance_id,
                kind = event.kind(),
                from = %event.instance_id(),
                "Ignoring event"
            );
            return Ok(());
        }
        debug!(
            instance_id = %self.instance_id,
            kind = event.kind(),
            from = %event.instance_id(),
            "Handling event"
        );

        match event {
            CacheJobEvent::LaunchJob(command) => self.on_launch_job(command).await,
            CacheJobEvent::AbortJob(command) => self.on_abort_job(command).await,
            CacheJobEvent::PruneJobs(command) => self.on_prune_jobs(command).await,
            CacheJobEvent::DescribeJobs(command) => self.on_describe_jobs(command).await,
            CacheJobEvent::DescribeJobsResponse(response) => {
                self.on_describe_jobs_response(response);
                Ok(())
            }
        }
    }

    fn shall_consume(&self, event: &CacheJobEvent) -> bool {
        self.is_running() && event.instance_id() != &self.instance_id
    }

    async fn on_launch_job(&self, command: LaunchJobCommand) -> Result<()> {
        let job = self.engine.launch_job_info(command.job)?;
        info!(
            instance_id = %self.instance_id,
            job_id = %job.id,
            origin = %command.instance_id,
            "Launched remote job"
        );
        if let Some(status) = self.engine.get_job_status(&job.id) {
            self.describe(vec![status], None).await?;
        }
        Ok(())
    }

    async fn on_abort_job(&self, command: AbortJobCommand) -> Result<()> {
        match self.engine.abort_job(&command.job_id) {
            Some(status) => {
                info!(
                    instance_id = %self.instance_id,
                    job_id = %command.job_id,
                    origin = %command.instance_id,
                    status = %status.status,
                    "Aborting job on remote request"
                );
                self.describe(vec![status], None).await
            }
            None => Ok(()),
        }
    }

    async fn on_prune_jobs(&self, command: PruneJobsCommand) -> Result<()> {
        let pruned = self.engine.prune_jobs();
        if pruned.is_empty() {
            return Ok(());
        }
        debug!(
            instance_id = %self.instance_id,
            origin = %command.instance_id,
            pruned = pruned.len(),
            "Pruned jobs on remote request"
        );
        self.describe(pruned, None).await
    }

    async fn on_describe_jobs(&self, command: DescribeJobsCommand) -> Result<()> {
        let registry = self.engine.registry();
        let jobs = if command.include_terminated {
            registry.get_all()
        } else {
            registry.get_all_alive()
        };
        self.describe(jobs, Some(command.instance_id)).await
    }

    fn on_describe_jobs_response(&self, response: DescribeJobsResponse) {
        self.remote
            .update(&response.instance_id, response.jobs.iter().cloned());
        for status in response.jobs {
            self.merge(&response.instance_id, status);
        }
    }

    /// Launch a live remote job unless it is already known locally.
    fn merge(&self, origin: &InstanceId, remote: CacheJobStatus) {
        let id = remote.job_id();
        if remote.is_finished() {
            trace!(job_id = %id, status = %remote.status, "Remote job finished, not launching");
            return;
        }
        if let Some(local) = self.engine.get_job_status(id) {
            trace!(job_id = %id, status = %local.status, "Remote job already known");
            return;
        }
        if !self.is_running() {
            debug!(instance_id = %self.instance_id, job_id = %id, "Left the cluster, not launching reported job");
            return;
        }
        match self.engine.launch_job_info(remote.job) {
            Ok(job) => info!(
                instance_id = %self.instance_id,
                job_id = %job.id,
                origin = %origin,
                "Launched job reported by another instance"
            ),
            Err(e) => warn!(
                instance_id = %self.instance_id,
                origin = %origin,
                error = %e,
                "Failed to launch reported job"
            ),
        }
    }

    /// Poll a job's status until it is finished or the leave timeout elapses.
    async fn await_termination(&self, status: CacheJobStatus) -> Result<CacheJobStatus> {
        let interval = self.config.poll_interval();
        let id = status.job_id().clone();
        let mut last = status;

        for _ in 0..self.config.termination_poll_attempts.max(1) {
            if last.is_finished() {
                return Ok(last);
            }
            tokio::time::sleep(interval).await;
            match self.engine.get_job_status(&id) {
                Some(current) => last = current,
                // pruned concurrently, so it was finished
                None => return Ok(last),
            }
        }
        if last.is_finished() {
            return Ok(last);
        }
        Err(Error::Timeout {
            job_id: id.to_string(),
            timeout_ms: self.config.leave_timeout_ms,
            last_status: last.status,
        })
    }

    async fn describe(
        &self,
        jobs: Vec<CacheJobStatus>,
        target: Option<InstanceId>,
    ) -> Result<()> {
        self.publish(DescribeJobsResponse {
            instance_id: self.instance_id.clone(),
            target_instance_id: target,
            jobs,
        })
        .await
    }

    async fn publish(&self, event: impl Into<CacheJobEvent>) -> Result<()> {
        self.event_bus.publish(event.into()).await
    }

    fn ensure_running(&self, operation: &str) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::IllegalState(format!(
                "cannot {} while not part of the cluster",
                operation
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tiling_core::ports::EventStream;

    /// Records published events and delivers nothing.
    #[derive(Default)]
    struct RecordingBus {
        published: Mutex<Vec<CacheJobEvent>>,
    }

    impl RecordingBus {
        fn take(&self) -> Vec<CacheJobEvent> {
            std::mem::take(&mut *self.published.lock().unwrap())
        }
    }

    #[async_trait]
    impl EventBus for RecordingBus {
        async fn publish(&self, event: CacheJobEvent) -> Result<()> {
            self.published.lock().unwrap().push(event);
            Ok(())
        }

        async fn subscribe(&self, _pattern: &str) -> Result<EventStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    /// Fails every publish.
    struct BrokenBus;

    #[async_trait]
    impl EventBus for BrokenBus {
        async fn publish(&self, _event: CacheJobEvent) -> Result<()> {
            Err(Error::EventBus("connection refused".to_string()))
        }

        async fn subscribe(&self, _pattern: &str) -> Result<EventStream> {
            Err(Error::EventBus("connection refused".to_string()))
        }
    }

    fn coordinator(bus: Arc<dyn EventBus>) -> ClusterCoordinator {
        let engine = tiling_engine::CacheJobEngine::new(
            InstanceId::new("a"),
            tiling_engine::EngineConfig::default(),
            Arc::new(tiling_engine::DryRunSeeder::new()),
        )
        .unwrap();
        ClusterCoordinator::new(
            InstanceId::new("a"),
            ClusterConfig::default(),
            Arc::new(engine),
            bus,
        )
    }

    #[tokio::test]
    async fn test_join_and_leave_are_idempotent() {
        let bus = Arc::new(RecordingBus::default());
        let coordinator = coordinator(bus.clone());

        assert!(!coordinator.leave_cluster().await.unwrap());
        assert!(coordinator.join_cluster().await.unwrap());
        assert!(!coordinator.join_cluster().await.unwrap());
        assert!(coordinator.is_running());

        let published = bus.take();
        assert_eq!(published.len(), 1);
        assert!(matches!(
            &published[0],
            CacheJobEvent::DescribeJobs(DescribeJobsCommand {
                target_instance_id: None,
                include_terminated: false,
                ..
            })
        ));

        assert!(coordinator.leave_cluster().await.unwrap());
        assert!(!coordinator.leave_cluster().await.unwrap());
        assert!(!coordinator.is_running());
        assert!(matches!(
            bus.take().as_slice(),
            [CacheJobEvent::DescribeJobsResponse(_)]
        ));
    }

    #[tokio::test]
    async fn test_mutations_require_running() {
        let bus = Arc::new(RecordingBus::default());
        let coordinator = coordinator(bus.clone());

        assert!(matches!(
            coordinator.prune_jobs().await,
            Err(Error::IllegalState(_))
        ));
        assert!(matches!(
            coordinator.abort_job(&JobId::new("x")).await,
            Err(Error::IllegalState(_))
        ));
        assert!(coordinator.get_job_status(&JobId::new("x")).is_none());
        assert!(coordinator.get_jobs().is_empty());
        assert!(bus.take().is_empty());
    }

    #[tokio::test]
    async fn test_abort_of_unknown_job_is_still_broadcast() {
        let bus = Arc::new(RecordingBus::default());
        let coordinator = coordinator(bus.clone());
        coordinator.join_cluster().await.unwrap();
        bus.take();

        let status = coordinator.abort_job(&JobId::new("b-000001-00000000")).await.unwrap();
        assert!(status.is_none());
        assert!(matches!(
            bus.take().as_slice(),
            [CacheJobEvent::AbortJob(AbortJobCommand { job_id, .. })] if job_id.as_str() == "b-000001-00000000"
        ));
    }

    #[tokio::test]
    async fn test_failed_join_broadcast_keeps_running_state() {
        let coordinator = coordinator(Arc::new(BrokenBus));
        assert!(matches!(
            coordinator.join_cluster().await,
            Err(Error::EventBus(_))
        ));
        assert!(coordinator.is_running());

        assert!(coordinator.leave_cluster().await.is_err());
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_own_and_misaddressed_events_are_ignored() {
        let bus = Arc::new(RecordingBus::default());
        let coordinator = coordinator(bus.clone());
        coordinator.join_cluster().await.unwrap();
        bus.take();

        let own = DescribeJobsCommand {
            instance_id: InstanceId::new("a"),
            target_instance_id: None,
            include_terminated: true,
        };
        coordinator.handle_event(own.into()).await.unwrap();

        let for_someone_else = DescribeJobsCommand {
            instance_id: InstanceId::new("b"),
            target_instance_id: Some(InstanceId::new("c")),
            include_terminated: true,
        };
        coordinator.handle_event(for_someone_else.into()).await.unwrap();
        assert!(bus.take().is_empty());

        let for_me = DescribeJobsCommand {
            instance_id: InstanceId::new("b"),
            target_instance_id: Some(InstanceId::new("a")),
            include_terminated: true,
        };
        coordinator.handle_event(for_me.into()).await.unwrap();
        assert!(matches!(
            bus.take().as_slice(),
            [CacheJobEvent::DescribeJobsResponse(DescribeJobsResponse { target_instance_id: Some(target), .. })]
                if target.as_str() == "b"
        ));
    }

    #[tokio::test]
    async fn test_reported_job_is_not_launched_after_leaving() {
        let bus = Arc::new(RecordingBus::default());
        let coordinator = coordinator(bus.clone());
        coordinator.join_cluster().await.unwrap();
        coordinator.leave_cluster().await.unwrap();

        let request = CacheJobRequest::new(
            tiling_core::Action::Seed,
            tiling_core::CacheIdentifier::new("layerX", "EPSG:900913", "image/png"),
            tiling_core::tiles::TilePyramid::single_level(
                2,
                tiling_core::tiles::TileRange2D::new(0, 0, 3, 3).unwrap(),
            ),
        );
        let reported = CacheJobStatus::scheduled(CacheJobInfo::new(
            JobId::new("b-000001-00000000"),
            request,
        ));
        coordinator.on_describe_jobs_response(DescribeJobsResponse {
            instance_id: InstanceId::new("b"),
            target_instance_id: None,
            jobs: vec![reported],
        });

        assert!(coordinator.get_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_events_are_ignored_when_not_running() {
        let bus = Arc::new(RecordingBus::default());
        let coordinator = coordinator(bus.clone());

        let describe = DescribeJobsCommand {
            instance_id: InstanceId::new("b"),
            target_instance_id: None,
            include_terminated: false,
        };
        coordinator.handle_event(describe.into()).await.unwrap();
        coordinator
            .handle_event(
                PruneJobsCommand {
                    instance_id: InstanceId::new("b"),
                }
                .into(),
            )
            .await
            .unwrap();
        assert!(bus.take().is_empty());
        assert!(coordinator.remote_registry().instances().is_empty());
    }
}
