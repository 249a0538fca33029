//! NATS transport for cluster job events.

mod bus;
pub mod config;
pub mod health;
pub mod metrics;

pub use bus::NatsEventBus;
pub use config::NatsConfig;
pub use health::{HealthCheck, HealthStatus};
pub use metrics::{MetricsSnapshot, NatsMetrics};
