//! Configuration system for the terra erosion workbench.
//!
//! Provides runtime-configurable terrain, erosion and pipeline settings that
//! persist to disk as RON files. Supports CLI overrides via clap, hot-reload
//! detection, and forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, CliBackend};
pub use config::{
    BackendChoice, Config, DebugConfig, ErosionConfig, GpuConfig, PipelineConfig, TerrainConfig,
    ThermalConfig, WaterConfig,
};
pub use error::ConfigError;
