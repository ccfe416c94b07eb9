//! Terrain erosion core: droplet placement, hydraulic and thermal erosion,
//! water tracing, smoothing, and the displacement range/radius reduction.
//!
//! Simulators describe their work as [`ComputePass`] lists and run them on a
//! [`ComputeDevice`]: [`WgpuDevice`] on a GPU, [`CpuDevice`] as the host
//! reference backend executing the same step functions.

pub mod blur;
pub mod brush;
pub mod cpu_device;
pub mod device;
pub mod droplets;
pub mod error;
pub mod fixed;
pub mod gpu_device;
pub mod guard;
pub mod height_field;
pub mod hydraulic;
pub mod kernels;
pub mod layout;
pub mod params;
pub mod radius;
pub mod range;
pub mod sampler;
pub mod thermal;
pub mod topology;
pub mod water;

pub use blur::BlurFilter;
pub use brush::{BrushTap, ErosionBrush};
pub use cpu_device::CpuDevice;
pub use device::{BufferId, ComputeDevice, ComputePass, LayerPair};
pub use droplets::{DropletOffsetSet, DropletOriginSet, DropletTables};
pub use error::{ConfigurationError, DeviceError, ErosionError};
pub use gpu_device::WgpuDevice;
pub use guard::{FlightGuard, RunOutcome, SingleFlight};
pub use height_field::{HeightField, HeightFieldBuffer};
pub use hydraulic::HydraulicErosionSimulator;
pub use layout::{TerrainLayout, TexelLayout};
pub use params::{ErosionParameter, ErosionParameters};
pub use radius::{DisplacementRadiusEstimator, DisplacementSource};
pub use range::{DisplacementRange, DisplacementRangeReducer};
pub use sampler::DropletOriginSampler;
pub use thermal::{Slot, ThermalErosionSimulator};
pub use topology::{TopologyGenerator, TopologyParams};
pub use water::WaterSimulator;
