//! Element-wise grid kernels: delta application, layer combine, min/max reduce.

use bytemuck::{Pod, Zeroable};

use crate::fixed::{ORDERED_NEG_INF, ORDERED_POS_INF, dequantize, encode_ordered};
use crate::layout::TerrainLayout;

/// Dimensions of the field a kernel walks.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GridUniforms {
    pub width: u32,
    pub height: u32,
    pub count: u32,
    pub _pad: u32,
}

impl GridUniforms {
    pub fn new(layout: &TerrainLayout) -> Self {
        Self {
            width: layout.width(),
            height: layout.height(),
            count: layout.texels() as u32,
            _pad: 0,
        }
    }
}

/// Length and fixed-point scale for folding an accumulator into a field.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ApplyUniforms {
    pub count: u32,
    pub _pad: [u32; 2],
    pub scale: f32,
}

impl ApplyUniforms {
    pub fn new(count: usize, scale: f32) -> Self {
        Self {
            count: count as u32,
            _pad: [0; 2],
            scale,
        }
    }
}

/// `target += accum / scale`; `accum = 0`.
pub fn apply_delta(uniforms: &ApplyUniforms, accum: &mut [u32], target: &mut [u32]) {
    let count = uniforms.count as usize;
    for (acc, value) in accum.iter_mut().zip(target.iter_mut()).take(count) {
        let delta = dequantize(*acc as i32, uniforms.scale);
        *value = (f32::from_bits(*value) + delta).to_bits();
        *acc = 0;
    }
}

/// `target = bedrock + sediment`.
pub fn combine(uniforms: &GridUniforms, bedrock: &[u32], sediment: &[u32], target: &mut [u32]) {
    let count = uniforms.count as usize;
    for ((out, bed), sed) in target.iter_mut().zip(bedrock).zip(sediment).take(count) {
        *out = (f32::from_bits(*bed) + f32::from_bits(*sed)).to_bits();
    }
}

/// Reset a two-word range accumulator to `[+inf, -inf]`.
pub fn reset_range(range: &mut [u32]) {
    range[0] = ORDERED_POS_INF as u32;
    range[1] = ORDERED_NEG_INF as u32;
}

/// Fold every value of `source` into the running `[min, max]` accumulator.
pub fn reduce_range(uniforms: &GridUniforms, source: &[u32], range: &mut [u32]) {
    let (mut lo, mut hi) = (range[0] as i32, range[1] as i32);
    for &word in source.iter().take(uniforms.count as usize) {
        let encoded = encode_ordered(f32::from_bits(word));
        lo = lo.min(encoded);
        hi = hi.max(encoded);
    }
    range[0] = lo as u32;
    range[1] = hi as u32;
}
