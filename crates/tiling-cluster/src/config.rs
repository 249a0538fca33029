//! Coordinator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tiling_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// How long leaving the cluster waits for aborted jobs to terminate.
    #[serde(default = "default_leave_timeout_ms")]
    pub leave_timeout_ms: u64,
    /// Number of status polls spread over the leave timeout.
    #[serde(default = "default_poll_attempts")]
    pub termination_poll_attempts: u32,
}

fn default_leave_timeout_ms() -> u64 {
    5_000
}

fn default_poll_attempts() -> u32 {
    10
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            leave_timeout_ms: default_leave_timeout_ms(),
            termination_poll_attempts: default_poll_attempts(),
        }
    }
}

impl ClusterConfig {
    pub fn with_leave_timeout(mut self, timeout: Duration) -> Self {
        self.leave_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_termination_poll_attempts(mut self, attempts: u32) -> Self {
        self.termination_poll_attempts = attempts;
        self
    }

    pub fn leave_timeout(&self) -> Duration {
        Duration::from_millis(self.leave_timeout_ms)
    }

    /// Delay between two termination polls.
    pub fn poll_interval(&self) -> Duration {
        self.leave_timeout() / self.termination_poll_attempts.max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.termination_poll_attempts == 0 {
            return Err(Error::Config(
                "cluster.termination_poll_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_polls_every_500ms() {
        let config = ClusterConfig::default();
        assert_eq!(config.leave_timeout(), Duration::from_secs(5));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let config = ClusterConfig::default().with_termination_poll_attempts(0);
        assert!(config.validate().is_err());
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_leave_timeout_saturates() {
        let config = ClusterConfig::default().with_leave_timeout(Duration::MAX);
        assert_eq!(config.leave_timeout_ms, u64::MAX);
        assert_eq!(config.leave_timeout(), Duration::from_millis(u64::MAX));
    }
}
