//! Cluster coordination of tile cache jobs.
//!
//! Instances share no state: each runs its own jobs and learns about the rest
//! of the cluster by exchanging commands and job-status reports over an
//! [`EventBus`](tiling_core::ports::EventBus).

pub mod config;
pub mod coordinator;
pub mod listener;
pub mod memory;
pub mod remote;

pub use config::ClusterConfig;
pub use coordinator::ClusterCoordinator;
pub use listener::ClusterListener;
pub use memory::InMemoryEventBus;
pub use remote::RemoteJobRegistry;
