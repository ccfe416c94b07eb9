//! Per-lane and per-cell step functions plus their uniform blocks.
//!
//! The CPU backend calls these directly; the WGSL kernels under `shaders/`
//! implement the same arithmetic for the wgpu backend. Uniform structs are
//! `#[repr(C)]` and padded to 16 bytes so they upload as-is.

pub mod blur;
pub mod droplet;
pub mod grid;
pub mod thermal;

pub use blur::BlurUniforms;
pub use droplet::{DropletMode, DropletUniforms};
pub use grid::{ApplyUniforms, GridUniforms};
pub use thermal::ThermalUniforms;
