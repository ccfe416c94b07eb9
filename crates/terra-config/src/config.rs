//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level workbench configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Height field resolution and initial topology.
    pub terrain: TerrainConfig,
    /// Droplet-based hydraulic erosion.
    pub erosion: ErosionConfig,
    /// Slope-relaxation thermal erosion.
    pub thermal: ThermalConfig,
    /// Water path visualisation.
    pub water: WaterConfig,
    /// Stage sequencing and background scheduling.
    pub pipeline: PipelineConfig,
    /// Compute backend selection.
    pub gpu: GpuConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Height field layout and fBm topology settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// Cells along each side of the (square) height field.
    pub resolution: u32,
    /// Horizontal extent of the rendered plane in world units.
    pub mesh_size: f32,
    /// Side of one droplet-grid cell in height-field cells. Power of two.
    pub droplet_cell_size: u32,
    /// Noise seed.
    pub seed: u64,
    /// Number of fBm octaves.
    pub octaves: u32,
    /// Frequency of the first octave, in cycles per cell.
    pub base_frequency: f64,
    /// Amplitude of the first octave.
    pub amplitude: f64,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
}

/// Hydraulic (droplet) erosion settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ErosionConfig {
    /// How much of its previous direction a droplet keeps (0-1).
    pub inertia: f32,
    pub gravity: f32,
    pub sediment_capacity_factor: f32,
    pub min_sediment_capacity: f32,
    pub deposit_speed: f32,
    pub erode_speed: f32,
    pub evaporate_speed: f32,
    pub start_speed: f32,
    pub start_water: f32,
    /// Brush radius in cells.
    pub brush_radius: u32,
    /// Droplets speed up going downhill instead of uphill.
    pub downhill_acceleration: bool,
    /// Maximum steps a droplet lives.
    pub max_lifetime: u32,
    /// Dispatches per erosion run.
    pub iterations: u32,
}

/// Thermal erosion settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThermalConfig {
    /// Fraction of the excess slope moved per iteration (0-1).
    pub amplitude: f32,
    /// Tangent of the talus angle.
    pub tan_threshold: f32,
    /// Distance from the edge (cells) where thermal erosion is fully suppressed.
    pub border_min: f32,
    /// Width (cells) of the linear fade-in band after `border_min`.
    pub border_range: f32,
    /// Ping-pong iterations per run.
    pub iterations: u32,
}

/// Water path visualisation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WaterConfig {
    /// Droplet dispatches accumulated per water run.
    pub iterations: u32,
}

/// Stage sequencing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delay between enabled-flag polls of the background runner, in milliseconds.
    pub poll_interval_ms: u64,
    /// Smoothing passes per blur run.
    pub blur_iterations: u32,
    /// Hydraulic + thermal passes the headless binary performs.
    pub passes: u32,
}

/// Which compute backend drives the simulators.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackendChoice {
    /// Prefer the GPU, fall back to the CPU reference backend.
    #[default]
    Auto,
    /// Require a GPU adapter.
    Gpu,
    /// Always use the CPU reference backend.
    Cpu,
}

/// Compute backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GpuConfig {
    pub backend: BackendChoice,
    /// Worker threads for the CPU backend (0 = one per core).
    pub cpu_workers: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            resolution: 256,
            mesh_size: 256.0,
            droplet_cell_size: 4,
            seed: 0,
            octaves: 6,
            base_frequency: 0.008,
            amplitude: 40.0,
            lacunarity: 2.0,
            persistence: 0.5,
        }
    }
}

impl Default for ErosionConfig {
    fn default() -> Self {
        Self {
            inertia: 0.05,
            gravity: 4.0,
            sediment_capacity_factor: 4.0,
            min_sediment_capacity: 0.01,
            deposit_speed: 0.3,
            erode_speed: 0.3,
            evaporate_speed: 0.01,
            start_speed: 1.0,
            start_water: 1.0,
            brush_radius: 3,
            downhill_acceleration: false,
            max_lifetime: 30,
            iterations: 16,
        }
    }
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            amplitude: 0.5,
            tan_threshold: 0.6,
            border_min: 2.0,
            border_range: 8.0,
            iterations: 32,
        }
    }
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self { iterations: 16 }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            blur_iterations: 1,
            passes: 4,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload / Validate ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject settings that parse but cannot drive a simulation.
    ///
    /// Layout compatibility between the resolution and the droplet grid is
    /// checked again (and authoritatively) when the simulators are built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.terrain.resolution < 2 {
            return Err(ConfigError::Invalid {
                field: "terrain.resolution",
                reason: format!("must be at least 2, got {}", self.terrain.resolution),
            });
        }
        if !self.terrain.droplet_cell_size.is_power_of_two() {
            return Err(ConfigError::Invalid {
                field: "terrain.droplet_cell_size",
                reason: format!(
                    "must be a power of two, got {}",
                    self.terrain.droplet_cell_size
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.erosion.inertia) {
            return Err(ConfigError::Invalid {
                field: "erosion.inertia",
                reason: format!("must lie in [0, 1], got {}", self.erosion.inertia),
            });
        }
        if !(0.0..=1.0).contains(&self.thermal.amplitude) {
            return Err(ConfigError::Invalid {
                field: "thermal.amplitude",
                reason: format!("must lie in [0, 1], got {}", self.thermal.amplitude),
            });
        }
        Ok(())
    }

    fn read(config_path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(ConfigError::Parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(2))
                .unwrap();
        assert!(ron_str.contains("resolution: 256"));
        assert!(ron_str.contains("poll_interval_ms: 100"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.gpu.backend = BackendChoice::Cpu;
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(terrain: (resolution: 64), erosion: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.terrain.resolution, 64);
        assert_eq!(config.terrain.droplet_cell_size, 4);
        assert_eq!(config.thermal, ThermalConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(sky_color: (1.0, 0.0, 0.0))");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.terrain.seed = 1234;
        config.erosion.iterations = 3;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.thermal.iterations = 7;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().thermal.iterations, 7);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_reload_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::default().reload(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_power_of_two_cell() {
        let mut config = Config::default();
        config.terrain.droplet_cell_size = 3;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "terrain.droplet_cell_size",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_inertia() {
        let mut config = Config::default();
        config.erosion.inertia = 1.5;
        assert!(config.validate().is_err());
    }
}
