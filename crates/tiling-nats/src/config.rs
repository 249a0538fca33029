//! Configuration for the NATS event bus.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the NATS event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URLs, tried in order.
    pub urls: Vec<String>,
    /// Prepended to every event subject, so several clusters can share a server.
    pub subject_prefix: String,
    /// Client connection name reported to the server.
    pub name: Option<String>,
    /// Maximum reconnection attempts; unlimited when unset.
    pub max_reconnect_attempts: Option<usize>,
    pub connection_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: vec!["nats://localhost:4222".to_string()],
            subject_prefix: "gwc.tiling".to_string(),
            name: None,
            max_reconnect_attempts: None,
            connection_timeout_ms: 10_000,
            request_timeout_ms: 5_000,
        }
    }
}

impl NatsConfig {
    /// Create a new config with a single URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }

    /// Set multiple server URLs for cluster support.
    pub fn with_urls(mut self, urls: Vec<String>) -> Self {
        self.urls = urls;
        self
    }

    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set max reconnection attempts.
    pub fn with_max_reconnects(mut self, max: usize) -> Self {
        self.max_reconnect_attempts = Some(max);
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Full NATS subject for a protocol subject or pattern.
    pub fn prefixed(&self, subject: &str) -> String {
        let prefix = self.subject_prefix.trim_end_matches('.');
        if prefix.is_empty() {
            subject.to_string()
        } else {
            format!("{prefix}.{subject}")
        }
    }
}
