//! Cache job identity, parameters, and lifecycle state.

use crate::ids::JobId;
use crate::tiles::TilePyramid;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a tile cache: what is cached, not a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct CacheIdentifier {
    pub layer_name: String,
    pub gridset_id: String,
    pub format: String,
    pub parameters_id: Option<String>,
}

impl CacheIdentifier {
    pub fn new(
        layer_name: impl Into<String>,
        gridset_id: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            layer_name: layer_name.into(),
            gridset_id: gridset_id.into(),
            format: format.into(),
            parameters_id: None,
        }
    }

    pub fn with_parameters_id(mut self, parameters_id: Option<String>) -> Self {
        self.parameters_id = parameters_id;
        self
    }

    fn validate(&self) -> Result<()> {
        let blank = |name: &str, value: &str| {
            if value.trim().is_empty() {
                Err(Error::InvalidRequest(format!("{} must not be blank", name)))
            } else {
                Ok(())
            }
        };
        blank("layer name", &self.layer_name)?;
        blank("gridset id", &self.gridset_id)?;
        blank("format", &self.format)?;
        if let Some(params) = &self.parameters_id {
            blank("parameters id", params)?;
        }
        Ok(())
    }
}

impl fmt::Display for CacheIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.layer_name, self.gridset_id, self.format)?;
        if let Some(params) = &self.parameters_id {
            write!(f, "/{}", params)?;
        }
        Ok(())
    }
}

/// What a cache job does to the tiles in its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Render missing tiles.
    #[default]
    Seed,
    /// Render all tiles, replacing existing ones.
    Reseed,
    /// Delete tiles.
    Truncate,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Seed => write!(f, "seed"),
            Action::Reseed => write!(f, "reseed"),
            Action::Truncate => write!(f, "truncate"),
        }
    }
}

/// User-supplied intent for a cache job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CacheJobRequest {
    pub action: Action,
    pub cache: CacheIdentifier,
    pub tiles: TilePyramid,
    pub timestamp: DateTime<Utc>,
}

impl CacheJobRequest {
    pub fn new(action: Action, cache: CacheIdentifier, tiles: TilePyramid) -> Self {
        Self {
            action,
            cache,
            tiles,
            timestamp: Utc::now(),
        }
    }

    /// Rejects requests that could never run: blank cache coordinates or an
    /// empty/malformed tile pyramid.
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.tiles.validate()
    }
}

/// The durable identity of a launched job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CacheJobInfo {
    pub id: JobId,
    pub request: CacheJobRequest,
    pub created_at: DateTime<Utc>,
}

impl CacheJobInfo {
    pub fn new(id: JobId, request: CacheJobRequest) -> Self {
        Self {
            id,
            request,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Scheduled,
    Running,
    Aborting,
    Complete,
    Failed,
    Aborted,
}

impl Status {
    pub fn is_finished(&self) -> bool {
        matches!(self, Status::Complete | Status::Failed | Status::Aborted)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Scheduled => write!(f, "scheduled"),
            Status::Running => write!(f, "running"),
            Status::Aborting => write!(f, "aborting"),
            Status::Complete => write!(f, "complete"),
            Status::Failed => write!(f, "failed"),
            Status::Aborted => write!(f, "aborted"),
        }
    }
}

/// Lifecycle state of a job. Once finished, the status never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CacheJobStatus {
    pub job: CacheJobInfo,
    pub status: Status,
    pub tiles_total: u64,
    pub tiles_processed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl CacheJobStatus {
    pub fn scheduled(job: CacheJobInfo) -> Self {
        let tiles_total = job.request.tiles.count();
        Self {
            job,
            status: Status::Scheduled,
            tiles_total,
            tiles_processed: 0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job.id
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Moves to `status` unless already finished. Returns whether the status
    /// changed.
    pub fn transition(&mut self, status: Status) -> bool {
        if self.is_finished() || self.status == status {
            return false;
        }
        match status {
            Status::Running if self.started_at.is_none() => self.started_at = Some(Utc::now()),
            s if s.is_finished() => self.finished_at = Some(Utc::now()),
            _ => {}
        }
        self.status = status;
        true
    }

    /// Fraction of tiles processed, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.tiles_total == 0 {
            return if self.status == Status::Complete { 1.0 } else { 0.0 };
        }
        (self.tiles_processed as f64 / self.tiles_total as f64).min(1.0)
    }
}
