//! Mapping from `config.ron` sections to simulator inputs.

use std::time::Duration;

use terra_config::{Config, PipelineConfig, TerrainConfig};
use terra_erosion::{ConfigurationError, ErosionParameters, TerrainLayout, TopologyParams};

pub fn erosion_parameters(config: &Config) -> ErosionParameters {
    let erosion = &config.erosion;
    let thermal = &config.thermal;
    ErosionParameters {
        inertia: erosion.inertia,
        gravity: erosion.gravity,
        sediment_capacity_factor: erosion.sediment_capacity_factor,
        min_sediment_capacity: erosion.min_sediment_capacity,
        deposit_speed: erosion.deposit_speed,
        erode_speed: erosion.erode_speed,
        evaporate_speed: erosion.evaporate_speed,
        start_speed: erosion.start_speed,
        start_water: erosion.start_water,
        brush_radius: erosion.brush_radius,
        downhill_acceleration: erosion.downhill_acceleration,
        max_lifetime: erosion.max_lifetime,
        erosion_iterations: erosion.iterations,
        thermal_amplitude: thermal.amplitude,
        thermal_tan_threshold: thermal.tan_threshold,
        thermal_border_min: thermal.border_min,
        thermal_border_range: thermal.border_range,
        thermal_iterations: thermal.iterations,
        water_iterations: config.water.iterations,
        blur_iterations: config.pipeline.blur_iterations,
    }
}

pub fn topology_params(terrain: &TerrainConfig) -> TopologyParams {
    TopologyParams {
        seed: terrain.seed,
        octaves: terrain.octaves,
        base_frequency: terrain.base_frequency,
        amplitude: terrain.amplitude,
        lacunarity: terrain.lacunarity,
        persistence: terrain.persistence,
    }
}

pub fn terrain_layout(terrain: &TerrainConfig) -> Result<TerrainLayout, ConfigurationError> {
    TerrainLayout::square(terrain.resolution, terrain.droplet_cell_size, terrain.mesh_size)
}

pub fn poll_interval(pipeline: &PipelineConfig) -> Duration {
    Duration::from_millis(pipeline.poll_interval_ms)
}
