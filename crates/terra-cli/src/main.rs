//! Headless terrain workbench.
//!
//! Generates a topology, runs a number of erosion passes through the
//! pipeline orchestrator and optionally exports the result as a 16-bit PNG.
//! Configuration is loaded from `config.ron` and can be overridden via CLI
//! flags, e.g. `terra --resolution 1024 --passes 8 --export height.png`.

mod error;
mod export;
mod platform;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use terra_config::{BackendChoice, CliArgs, Config};
use terra_erosion::{
    ComputeDevice, CpuDevice, DisplacementRange, DisplacementSource, WgpuDevice,
};
use terra_pipeline::{PipelineOrchestrator, settings};
use tracing::{info, warn};

use crate::error::CliError;
use crate::platform::AppDirs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "terra failed");
        eprintln!("terra: {e}");
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<(), CliError> {
    let dirs = AppDirs::resolve(args.config.as_deref())?;
    dirs.create()?;

    let mut config = Config::load_or_create(&dirs.config_dir)?;
    config.apply_cli_overrides(&args);
    config.validate()?;

    terra_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    info!(config = %dirs.config_dir.display(), "terra starting");

    let export = args.export.as_deref();
    match config.gpu.backend {
        BackendChoice::Cpu => run_cpu(&config, export).await,
        BackendChoice::Gpu => {
            let device = WgpuDevice::headless().await.map_err(CliError::GpuUnavailable)?;
            run_gpu(device, &config, export).await
        }
        BackendChoice::Auto => match WgpuDevice::headless().await {
            Ok(device) => run_gpu(device, &config, export).await,
            Err(e) => {
                warn!(error = %e, "No usable GPU, falling back to CPU backend");
                run_cpu(&config, export).await
            }
        },
    }
}

async fn run_cpu(config: &Config, export: Option<&Path>) -> Result<(), CliError> {
    let device = Arc::new(CpuDevice::with_workers(config.gpu.cpu_workers));
    info!(workers = device.workers(), "Using CPU backend");
    drive(device, config, export).await.map(|_| ())
}

async fn run_gpu(
    device: WgpuDevice,
    config: &Config,
    export: Option<&Path>,
) -> Result<(), CliError> {
    info!(adapter = %device.context().adapter_summary(), "Using GPU backend");
    let device = Arc::new(device);
    let source = drive(Arc::clone(&device), config, export).await?;

    // Leave the final map where a renderer would sample it.
    let layout = settings::terrain_layout(&config.terrain)?;
    let texture = device.create_displacement_texture(&layout)?;
    device.publish_displacement(&texture, &source.map)?;
    Ok(())
}

/// Run the whole pipeline on `device` and return the final displacement.
async fn drive<D>(
    device: Arc<D>,
    config: &Config,
    export: Option<&Path>,
) -> Result<DisplacementSource, CliError>
where
    D: ComputeDevice + 'static,
{
    let layout = settings::terrain_layout(&config.terrain)?;
    let orchestrator = PipelineOrchestrator::new(
        device,
        layout,
        settings::erosion_parameters(config),
        settings::topology_params(&config.terrain),
    )?;

    orchestrator.run_topology().await?;
    if let Some(transition) = orchestrator.next().await? {
        info!(from = ?transition.from, to = ?transition.to, "Stage transition");
    }

    let passes = config.pipeline.passes;
    for pass in 1..=passes {
        let erosion = orchestrator.run_erosion().await?;
        let thermal = orchestrator.run_thermal().await?;
        if !(erosion.is_completed() && thermal.is_completed()) {
            warn!(pass, "Pass skipped, another run in flight");
            continue;
        }
        if let Some(source) = orchestrator.displacement() {
            info!(
                pass,
                passes,
                min = source.min,
                max = source.max,
                radius = source.radius,
                "Erosion pass complete"
            );
        }
    }

    if config.pipeline.blur_iterations > 0 {
        orchestrator.run_blur().await?;
    }
    orchestrator.run_landscape().await?;
    if let Some(transition) = orchestrator.next().await? {
        info!(
            from = ?transition.from,
            to = ?transition.to,
            recompute = transition.recompute,
            "Stage transition"
        );
    }

    let source = orchestrator.displacement().ok_or(CliError::NoDisplacement)?;
    info!(
        min = source.min,
        max = source.max,
        radius = source.radius,
        center_offset = source.center_offset,
        water = orchestrator.water_field().total(),
        "Landscape ready"
    );

    if let Some(path) = export {
        let range = DisplacementRange {
            min: source.min,
            max: source.max,
        };
        export::export_height_map(path, &source.map, range)?;
    }
    Ok(source)
}
