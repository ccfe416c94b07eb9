//! 3x3 binomial smoothing with clamped edges.

use bytemuck::{Pod, Zeroable};

use crate::layout::TerrainLayout;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlurUniforms {
    pub width: u32,
    pub height: u32,
    pub _pad: [u32; 2],
}

impl BlurUniforms {
    pub fn new(layout: &TerrainLayout) -> Self {
        Self {
            width: layout.width(),
            height: layout.height(),
            _pad: [0; 2],
        }
    }
}

const WEIGHTS: [f32; 3] = [1.0, 2.0, 1.0];

/// Smoothed value of cell `(x, y)`.
pub fn blur_cell(uniforms: &BlurUniforms, source: &[u32], x: u32, y: u32) -> f32 {
    let (w, h) = (uniforms.width as i64, uniforms.height as i64);
    let mut sum = 0.0;
    for (j, wy) in WEIGHTS.iter().enumerate() {
        let sy = (y as i64 + j as i64 - 1).clamp(0, h - 1);
        for (i, wx) in WEIGHTS.iter().enumerate() {
            let sx = (x as i64 + i as i64 - 1).clamp(0, w - 1);
            sum += wx * wy * f32::from_bits(source[(sy * w + sx) as usize]);
        }
    }
    sum / 16.0
}

/// Blur every cell of `source` into `destination`.
pub fn blur(uniforms: &BlurUniforms, source: &[u32], destination: &mut [u32]) {
    for y in 0..uniforms.height {
        for x in 0..uniforms.width {
            let i = y as usize * uniforms.width as usize + x as usize;
            destination[i] = blur_cell(uniforms, source, x, y).to_bits();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniforms(size: u32) -> BlurUniforms {
        BlurUniforms::new(&TerrainLayout::square(size, 1, 1.0).unwrap())
    }

    #[test]
    fn test_constant_field_unchanged() {
        let u = uniforms(4);
        let source = vec![7.0f32.to_bits(); 16];
        let mut out = vec![0; 16];
        blur(&u, &source, &mut out);
        assert!(out.iter().all(|&v| f32::from_bits(v) == 7.0));
    }

    #[test]
    fn test_spike_spreads_to_neighbours() {
        let u = uniforms(5);
        let mut source = vec![0f32.to_bits(); 25];
        source[12] = 16.0f32.to_bits();
        let mut out = vec![0; 25];
        blur(&u, &source, &mut out);
        assert_eq!(f32::from_bits(out[12]), 4.0);
        assert_eq!(f32::from_bits(out[11]), 2.0);
        assert_eq!(f32::from_bits(out[6]), 1.0);
        assert_eq!(f32::from_bits(out[0]), 0.0);
    }
}
