//! Node configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tiling_cluster::ClusterConfig;
use tiling_core::model::{Action, CacheJobRequest};
use tiling_core::ports::TileLayerCatalog;
use tiling_core::request::{CacheJobRequestBuilder, TileLayerInfo};
use tiling_core::{InstanceId, Result};
use tiling_engine::EngineConfig;
use tiling_nats::NatsConfig;

use crate::commands::ConfigOverrides;

/// How instances reach each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Nats,
    /// In-process only; the node runs alone.
    Memory,
}

/// Configuration of one cluster node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Cluster identity; generated from the host name when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Per meta-tile delay of the dry-run seeder.
    #[serde(default = "default_seeder_delay_ms")]
    pub seeder_delay_ms: u64,
    /// Layers jobs can be requested for.
    #[serde(default)]
    pub layers: Vec<TileLayerInfo>,
    /// Jobs launched right after joining the cluster.
    #[serde(default)]
    pub startup_jobs: Vec<StartupJob>,
}

fn default_seeder_delay_ms() -> u64 {
    100
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            transport: Transport::default(),
            nats: NatsConfig::default(),
            engine: EngineConfig::default(),
            cluster: ClusterConfig::default(),
            seeder_delay_ms: default_seeder_delay_ms(),
            layers: Vec::new(),
            startup_jobs: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> std::result::Result<Self, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// The file named by `overrides`, or defaults, with the overrides applied.
    pub fn load(overrides: &ConfigOverrides) -> std::result::Result<Self, std::io::Error> {
        let mut config = match &overrides.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(id) = &overrides.instance_id {
            self.instance_id = Some(InstanceId::new(id.as_str()));
        }
        if let Some(url) = &overrides.nats_url {
            self.nats.urls = vec![url.clone()];
        }
        if overrides.memory {
            self.transport = Transport::Memory;
        }
    }

    /// Fix the instance id, generating one if none is configured.
    pub fn resolve_instance_id(&mut self) -> InstanceId {
        self.instance_id
            .get_or_insert_with(|| {
                let host = hostname::get()
                    .map(|h| h.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| "gwc".to_string());
                InstanceId::generate(&host)
            })
            .clone()
    }

    pub fn seeder_delay(&self) -> Duration {
        Duration::from_millis(self.seeder_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.cluster.validate()?;
        for layer in &self.layers {
            for coverage in layer.gridsets.values() {
                coverage.validate()?;
            }
        }
        Ok(())
    }

    /// Requests for every startup job, resolved against the configured layers.
    pub fn startup_requests(&self) -> Result<Vec<CacheJobRequest>> {
        let mut requests = Vec::new();
        for job in &self.startup_jobs {
            requests.extend(job.requests(&self.layers)?);
        }
        Ok(requests)
    }
}

/// A cache job described the way an operator would ask for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupJob {
    #[serde(default)]
    pub action: Action,
    pub layer: String,
    /// All gridsets of the layer when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gridset: Option<String>,
    /// All formats of the layer when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<u8>,
}

impl StartupJob {
    pub fn requests(&self, catalog: &dyn TileLayerCatalog) -> Result<Vec<CacheJobRequest>> {
        let mut builder = CacheJobRequestBuilder::new(catalog)
            .action(self.action)
            .layer(&self.layer);
        if let Some(gridset) = &self.gridset {
            builder = builder.gridset_id(gridset);
        }
        for format in &self.formats {
            builder = builder.format(format);
        }
        if let Some(id) = &self.parameters_id {
            builder = builder.parameters_id(id);
        } else if !self.parameters.is_empty() {
            builder = builder.parameters(self.parameters.clone());
        }
        if let Some(zoom) = self.min_zoom {
            builder = builder.min_zoom(zoom);
        }
        if let Some(zoom) = self.max_zoom {
            builder = builder.max_zoom(zoom);
        }
        builder.build()
    }
}
