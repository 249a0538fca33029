//! Per-instance store of job status, keyed by job id.

use crate::ids::JobId;
use crate::model::{CacheJobInfo, CacheJobStatus, Status};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

/// Job id to status map.
///
/// The local instance owns one registry and is the only writer of its status
/// transitions. The remote job registry keeps one more per observed remote
/// instance as a read-only mirror of that instance's last report.
#[derive(Debug, Default)]
pub struct CacheJobRegistry {
    jobs: DashMap<JobId, CacheJobStatus>,
}

impl CacheJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new job as scheduled.
    ///
    /// Returns `(status, true)` if the job was added, or the existing status and
    /// `false` if a job with the same id is already registered.
    pub fn add(&self, job: CacheJobInfo) -> (CacheJobStatus, bool) {
        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(slot) => {
                let status = CacheJobStatus::scheduled(job);
                slot.insert(status.clone());
                (status, true)
            }
        }
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.contains_key(id)
    }

    pub fn get_status(&self, id: &JobId) -> Option<CacheJobStatus> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Sets the status of a job. Finished jobs keep their terminal status.
    pub fn set_status(&self, id: &JobId, status: Status) -> Option<CacheJobStatus> {
        self.modify(id, |current| {
            if !current.transition(status) && current.status != status {
                debug!(
                    job_id = %id,
                    current = %current.status,
                    requested = %status,
                    "ignoring status change of finished job"
                );
            }
        })
    }

    /// Moves a scheduled job to running. Returns `false` if the job is unknown
    /// or left the scheduled state, e.g. because an abort was requested.
    pub fn mark_running(&self, id: &JobId) -> bool {
        let mut started = false;
        self.modify(id, |current| {
            if current.status == Status::Scheduled {
                started = current.transition(Status::Running);
            }
        });
        started
    }

    /// Records a failure. Ignored for finished jobs.
    pub fn set_failed(&self, id: &JobId, error: impl Into<String>) -> Option<CacheJobStatus> {
        let error = error.into();
        self.modify(id, move |current| {
            if current.transition(Status::Failed) {
                current.error = Some(error);
            }
        })
    }

    /// Adds `tiles` to the processed counter of a non-finished job.
    pub fn add_progress(&self, id: &JobId, tiles: u64) -> Option<CacheJobStatus> {
        self.modify(id, |current| {
            if !current.is_finished() {
                current.tiles_processed = current.tiles_processed.saturating_add(tiles);
            }
        })
    }

    /// Replaces a job's status with a snapshot reported by its owner.
    ///
    /// A finished entry is never overwritten: reports are delivered out of
    /// order and a stale non-finished one must not undo a termination.
    pub fn update(&self, status: CacheJobStatus) -> CacheJobStatus {
        match self.jobs.entry(status.job_id().clone()) {
            Entry::Occupied(mut existing) => {
                if !existing.get().is_finished() {
                    existing.insert(status);
                }
                existing.get().clone()
            }
            Entry::Vacant(slot) => slot.insert(status).value().clone(),
        }
    }

    /// Removes and returns every finished job.
    pub fn prune(&self) -> Vec<CacheJobStatus> {
        let finished: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().is_finished())
            .map(|entry| entry.key().clone())
            .collect();

        finished
            .iter()
            .filter_map(|id| self.jobs.remove_if(id, |_, status| status.is_finished()))
            .map(|(_, status)| status)
            .collect()
    }

    pub fn get_all(&self) -> Vec<CacheJobStatus> {
        self.jobs.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Every job that is not finished.
    pub fn get_all_alive(&self) -> Vec<CacheJobStatus> {
        self.jobs
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn jobs(&self) -> Vec<CacheJobInfo> {
        self.jobs.iter().map(|entry| entry.value().job.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn modify<F>(&self, id: &JobId, f: F) -> Option<CacheJobStatus>
    where
        F: FnOnce(&mut CacheJobStatus),
    {
        let mut entry = self.jobs.get_mut(id)?;
        f(entry.value_mut());
        Some(entry.value().clone())
    }
}
