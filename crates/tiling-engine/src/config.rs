//! Engine configuration.

use serde::{Deserialize, Serialize};
use tiling_core::{Error, Result};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of jobs running at once. Further jobs stay scheduled.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_jobs: u32,
    /// Meta-tile width in tiles.
    #[serde(default = "default_meta_tile_size")]
    pub meta_tile_width: u32,
    /// Meta-tile height in tiles.
    #[serde(default = "default_meta_tile_size")]
    pub meta_tile_height: u32,
}

fn default_max_concurrent() -> u32 {
    4
}

fn default_meta_tile_size() -> u32 {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent(),
            meta_tile_width: default_meta_tile_size(),
            meta_tile_height: default_meta_tile_size(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_concurrent_jobs(mut self, max: u32) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_meta_tile_size(mut self, width: u32, height: u32) -> Self {
        self.meta_tile_width = width;
        self.meta_tile_height = height;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(Error::Config(
                "engine.max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.meta_tile_width == 0 || self.meta_tile_height == 0 {
            return Err(Error::Config(format!(
                "engine meta-tile size must be positive, got {}x{}",
                self.meta_tile_width, self.meta_tile_height
            )));
        }
        Ok(())
    }
}
