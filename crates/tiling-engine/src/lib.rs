//! Local cache job engine for GWC tiling.
//!
//! Runs cache jobs of a single instance on the tokio runtime, tracking their
//! lifecycle in a [`CacheJobRegistry`](tiling_core::CacheJobRegistry).

pub mod config;
pub mod engine;
pub mod runner;
pub mod seeder;

pub use config::EngineConfig;
pub use engine::CacheJobEngine;
pub use runner::JobRunner;
pub use seeder::DryRunSeeder;
