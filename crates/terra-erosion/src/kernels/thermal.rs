//! Slope-relaxation step over a bedrock + sediment layer pair.
//!
//! Each cell gathers the flow it exchanges with its eight neighbours. The flow
//! across an edge only depends on the two totals, so both sides compute the
//! same amount with opposite sign and total mass is preserved.

use std::f32::consts::SQRT_2;

use bytemuck::{Pod, Zeroable};

use crate::layout::TerrainLayout;
use crate::params::ErosionParameters;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ThermalUniforms {
    pub width: u32,
    pub height: u32,
    pub _pad: [u32; 2],
    pub amplitude: f32,
    pub tan_threshold: f32,
    pub border_min: f32,
    pub border_range: f32,
}

impl ThermalUniforms {
    pub fn new(layout: &TerrainLayout, params: &ErosionParameters) -> Self {
        Self {
            width: layout.width(),
            height: layout.height(),
            _pad: [0; 2],
            amplitude: params.thermal_amplitude,
            tan_threshold: params.thermal_tan_threshold,
            border_min: params.thermal_border_min,
            border_range: params.thermal_border_range,
        }
    }
}

const NEIGHBOURS: [(i32, i32, f32); 8] = [
    (-1, -1, SQRT_2),
    (0, -1, 1.0),
    (1, -1, SQRT_2),
    (-1, 0, 1.0),
    (1, 0, 1.0),
    (-1, 1, SQRT_2),
    (0, 1, 1.0),
    (1, 1, SQRT_2),
];

/// Edge fade: 0 closer than `border_min` to the edge, ramping linearly to 1
/// over the next `border_range` texels.
pub fn border_fade(uniforms: &ThermalUniforms, x: u32, y: u32) -> f32 {
    let edge = x
        .min(y)
        .min(uniforms.width - 1 - x)
        .min(uniforms.height - 1 - y) as f32;
    if uniforms.border_range <= 0.0 {
        return if edge >= uniforms.border_min { 1.0 } else { 0.0 };
    }
    ((edge - uniforms.border_min) / uniforms.border_range).clamp(0.0, 1.0)
}

/// New `(bedrock, sediment)` of cell `(x, y)`.
pub fn thermal_cell(
    uniforms: &ThermalUniforms,
    bedrock: &[u32],
    sediment: &[u32],
    x: u32,
    y: u32,
) -> (f32, f32) {
    let width = uniforms.width as usize;
    let at = |i: usize| f32::from_bits(bedrock[i]) + f32::from_bits(sediment[i]);

    let index = y as usize * width + x as usize;
    let total = at(index);
    let fade = border_fade(uniforms, x, y);

    let mut outflow = 0.0;
    let mut inflow = 0.0;
    for (dx, dy, distance) in NEIGHBOURS {
        let nx = x as i32 + dx;
        let ny = y as i32 + dy;
        if nx < 0 || ny < 0 || nx >= uniforms.width as i32 || ny >= uniforms.height as i32 {
            continue;
        }
        let neighbour = ny as usize * width + nx as usize;
        let diff = total - at(neighbour);
        let excess = diff.abs() - uniforms.tan_threshold * distance;
        if excess <= 0.0 {
            continue;
        }
        let weight = fade.min(border_fade(uniforms, nx as u32, ny as u32));
        let flow = uniforms.amplitude * excess / 8.0 * weight;
        if diff > 0.0 {
            outflow += flow;
        } else {
            inflow += flow;
        }
    }

    let bed = f32::from_bits(bedrock[index]);
    let sed = f32::from_bits(sediment[index]);
    let from_sediment = outflow.min(sed.max(0.0));
    (
        bed - (outflow - from_sediment),
        sed - from_sediment + inflow,
    )
}

/// One full iteration from the source pair into the destination pair.
pub fn thermal_step(
    uniforms: &ThermalUniforms,
    bedrock: &[u32],
    sediment: &[u32],
    bedrock_out: &mut [u32],
    sediment_out: &mut [u32],
) {
    for y in 0..uniforms.height {
        for x in 0..uniforms.width {
            let i = y as usize * uniforms.width as usize + x as usize;
            let (bed, sed) = thermal_cell(uniforms, bedrock, sediment, x, y);
            bedrock_out[i] = bed.to_bits();
            sediment_out[i] = sed.to_bits();
        }
    }
}
