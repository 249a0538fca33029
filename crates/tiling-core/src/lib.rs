//! GWC Tiling Core
//!
//! Domain types, port traits, and error handling for coordinating tile cache
//! jobs across a cluster of independent instances. This crate has minimal
//! dependencies and defines the shared vocabulary used by the engine, the
//! cluster coordinator, and the transports.

pub mod error;
pub mod events;
pub mod ids;
pub mod model;
pub mod ports;
pub mod registry;
pub mod request;
pub mod tiles;

pub use error::{Error, Result};
pub use ids::*;
pub use model::{Action, CacheIdentifier, CacheJobInfo, CacheJobRequest, CacheJobStatus, Status};
pub use registry::CacheJobRegistry;
