//! Command-line argument parsing for the `terra` binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::{BackendChoice, Config};

/// Backend names accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliBackend {
    Auto,
    Gpu,
    Cpu,
}

impl From<CliBackend> for BackendChoice {
    fn from(value: CliBackend) -> Self {
        match value {
            CliBackend::Auto => BackendChoice::Auto,
            CliBackend::Gpu => BackendChoice::Gpu,
            CliBackend::Cpu => BackendChoice::Cpu,
        }
    }
}

/// Terrain erosion workbench command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "terra", about = "Procedural terrain generation and erosion")]
pub struct CliArgs {
    /// Height field resolution (cells per side).
    #[arg(long)]
    pub resolution: Option<u32>,

    /// Topology noise seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Hydraulic erosion dispatches per pass.
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Thermal erosion ping-pong iterations per pass.
    #[arg(long)]
    pub thermal_iterations: Option<u32>,

    /// Number of erosion passes to run.
    #[arg(long)]
    pub passes: Option<u32>,

    /// Compute backend.
    #[arg(long, value_enum)]
    pub backend: Option<CliBackend>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the final height field as a 16-bit grayscale PNG.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(resolution) = args.resolution {
            self.terrain.resolution = resolution;
        }
        if let Some(seed) = args.seed {
            self.terrain.seed = seed;
        }
        if let Some(iterations) = args.iterations {
            self.erosion.iterations = iterations;
        }
        if let Some(iterations) = args.thermal_iterations {
            self.thermal.iterations = iterations;
        }
        if let Some(passes) = args.passes {
            self.pipeline.passes = passes;
        }
        if let Some(backend) = args.backend {
            self.gpu.backend = backend.into();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
