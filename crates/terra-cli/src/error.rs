use std::path::PathBuf;

use terra_config::ConfigError;
use terra_erosion::{ConfigurationError, DeviceError, ErosionError};

/// Failures that end a `terra` run.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("could not determine OS configuration directory")]
    NoConfigDir,

    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Terrain(#[from] ConfigurationError),

    #[error("GPU backend requested but unavailable: {0}")]
    GpuUnavailable(DeviceError),

    #[error(transparent)]
    Erosion(#[from] ErosionError),

    #[error("pipeline finished without a displacement range")]
    NoDisplacement,

    #[error("failed to export {path}: {reason}")]
    Export { path: PathBuf, reason: String },
}
