//! Directory resolution for the `terra` binary.
//!
//! Config and logs live under the OS configuration directory unless
//! `--config` points somewhere else, in which case logs sit next to it.

use std::path::{Path, PathBuf};

use crate::error::CliError;

const APP_NAME: &str = "terra";

/// Where `config.ron` and `terra.log` are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    pub config_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppDirs {
    /// Resolve directories, honouring an explicit config directory.
    pub fn resolve(config_override: Option<&Path>) -> Result<Self, CliError> {
        match config_override {
            Some(dir) => Ok(Self::with_config_dir(dir)),
            None => {
                let base = dirs::config_dir().ok_or(CliError::NoConfigDir)?;
                let app_dir = base.join(APP_NAME);
                Ok(Self {
                    config_dir: app_dir.clone(),
                    log_dir: app_dir.join("logs"),
                })
            }
        }
    }

    fn with_config_dir(dir: &Path) -> Self {
        Self {
            config_dir: dir.to_path_buf(),
            log_dir: dir.join("logs"),
        }
    }

    /// Create the config directory. The log directory is created lazily by
    /// the logger.
    pub fn create(&self) -> Result<(), CliError> {
        std::fs::create_dir_all(&self.config_dir).map_err(|source| CliError::CreateDir {
            path: self.config_dir.clone(),
            source,
        })
    }
}
