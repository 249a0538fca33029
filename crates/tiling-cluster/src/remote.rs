//! Last-known job views of other instances.

use dashmap::DashMap;
use std::sync::Arc;
use tiling_core::{CacheJobRegistry, CacheJobStatus, InstanceId, JobId};

/// Instance id to the job registry last reported by that instance.
///
/// Registries are created on first observation and never evicted: an instance
/// that disappears without reporting its jobs as finished stays visible with
/// its last known statuses.
#[derive(Debug, Default)]
pub struct RemoteJobRegistry {
    instances: DashMap<InstanceId, Arc<CacheJobRegistry>>,
}

impl RemoteJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mirror registry of `instance`, created if absent.
    pub fn registry(&self, instance: &InstanceId) -> Arc<CacheJobRegistry> {
        self.instances
            .entry(instance.clone())
            .or_default()
            .value()
            .clone()
    }

    pub fn get(&self, instance: &InstanceId) -> Option<Arc<CacheJobRegistry>> {
        self.instances.get(instance).map(|entry| entry.value().clone())
    }

    /// Records a status report from `instance`.
    pub fn update(&self, instance: &InstanceId, jobs: impl IntoIterator<Item = CacheJobStatus>) {
        let registry = self.registry(instance);
        for status in jobs {
            registry.update(status);
        }
    }

    pub fn get_job_status(&self, instance: &InstanceId, id: &JobId) -> Option<CacheJobStatus> {
        self.get(instance)?.get_status(id)
    }

    /// Every instance observed so far.
    pub fn instances(&self) -> Vec<InstanceId> {
        self.instances.iter().map(|entry| entry.key().clone()).collect()
    }
}
