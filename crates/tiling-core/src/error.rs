//! Error types for cluster cache jobs.

use crate::model::Status;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Request errors
    #[error("Invalid cache job request: {0}")]
    InvalidRequest(String),

    // Lifecycle errors
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Job {job_id} did not terminate within {timeout_ms}ms, last status is {last_status}")]
    Timeout {
        job_id: String,
        timeout_ms: u64,
        last_status: Status,
    },

    // Infrastructure errors
    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
