//! Single droplet lifecycle shared by hydraulic erosion and water tracing.
//!
//! Lanes read a height snapshot that stays fixed for the whole dispatch and
//! emit fixed-point deltas; the caller accumulates them with atomic adds and
//! folds them into the field afterwards.

use std::f32::consts::TAU;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::brush::{BrushTap, splat_quantized};
use crate::fixed::{clamp_step, dequantize, quantize};
use crate::layout::TerrainLayout;
use crate::params::ErosionParameters;

/// Directions shorter than this fall back to a hashed random direction.
pub const DEGENERATE_DIRECTION: f32 = 1e-6;

/// Droplets with less water than this stop early.
pub const MIN_WATER: f32 = 1e-4;

/// Keeps spawn points strictly inside the bilinear-sampleable area.
pub const SPAWN_MARGIN: f32 = 1e-3;

/// What a droplet writes into its accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DropletMode {
    /// Terrain deltas through the brush.
    Erode = 0,
    /// Water carried through each visited cell; terrain is never touched.
    Trace = 1,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DropletUniforms {
    pub width: u32,
    pub height: u32,
    pub lanes: u32,
    /// First offset entry of this dispatch: `slot * lanes`.
    pub offset_base: u32,
    pub max_lifetime: u32,
    pub brush_len: u32,
    pub mode: u32,
    pub seed: u32,
    pub inertia: f32,
    pub gravity: f32,
    pub capacity_factor: f32,
    pub min_capacity: f32,
    pub deposit_speed: f32,
    pub erode_speed: f32,
    pub evaporate_speed: f32,
    pub start_speed: f32,
    pub start_water: f32,
    /// Fixed-point scale of the accumulator.
    pub scale: f32,
    /// `+1`: `speed^2 + dh * g`. `-1`: `speed^2 - dh * g` (downhill accelerates).
    pub speed_sign: f32,
    pub _pad: f32,
}

impl DropletUniforms {
    pub fn new(
        layout: &TerrainLayout,
        params: &ErosionParameters,
        mode: DropletMode,
        slot: usize,
        brush_len: usize,
        seed: u32,
        scale: f32,
    ) -> Self {
        let lanes = layout.lanes();
        Self {
            width: layout.width(),
            height: layout.height(),
            lanes: lanes as u32,
            offset_base: ((slot % layout.period()) * lanes) as u32,
            max_lifetime: params.max_lifetime,
            brush_len: brush_len as u32,
            mode: mode as u32,
            seed,
            inertia: params.inertia,
            gravity: params.gravity,
            capacity_factor: params.sediment_capacity_factor,
            min_capacity: params.min_sediment_capacity,
            deposit_speed: params.deposit_speed,
            erode_speed: params.erode_speed,
            evaporate_speed: params.evaporate_speed,
            start_speed: params.start_speed,
            start_water: params.start_water,
            scale,
            speed_sign: if params.downhill_acceleration { -1.0 } else { 1.0 },
            _pad: 0.0,
        }
    }
}

/// PCG-style integer hash.
#[inline]
pub fn pcg_hash(value: u32) -> u32 {
    let state = value.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Unit direction derived from a texel index, step and seed.
pub fn fallback_direction(node: u32, step: u32, seed: u32) -> Vec2 {
    let hash = pcg_hash(node ^ pcg_hash(step.wrapping_add(seed)));
    let angle = hash as f32 / u32::MAX as f32 * TAU;
    Vec2::new(angle.cos(), angle.sin())
}

/// Bilinear height and gradient at `pos`, which must lie in `[0, w-1) x [0, h-1)`.
pub fn sample(height: &[f32], width: u32, pos: Vec2) -> (f32, Vec2) {
    let cell = pos.floor();
    let f = pos - cell;
    let i = cell.y as usize * width as usize + cell.x as usize;
    let w = width as usize;

    let h00 = height[i];
    let h10 = height[i + 1];
    let h01 = height[i + w];
    let h11 = height[i + w + 1];

    let gradient = Vec2::new(
        (h10 - h00) * (1.0 - f.y) + (h11 - h01) * f.y,
        (h01 - h00) * (1.0 - f.x) + (h11 - h10) * f.x,
    );
    let value = h00 * (1.0 - f.x) * (1.0 - f.y)
        + h10 * f.x * (1.0 - f.y)
        + h01 * (1.0 - f.x) * f.y
        + h11 * f.x * f.y;
    (value, gradient)
}

/// Speed after a step with height change `delta`: `sqrt(max(0, speed^2 + sign * delta * g))`.
#[inline]
pub fn update_speed(uniforms: &DropletUniforms, speed: f32, delta: f32) -> f32 {
    (speed * speed + uniforms.speed_sign * delta * uniforms.gravity)
        .max(0.0)
        .sqrt()
}

/// Run lane `lane` of a droplet dispatch, reporting `(texel, fixed-point delta)`.
///
/// In erode mode the emitted deltas always sum to zero over the lane's
/// lifetime: whatever is eroded is carried as sediment and deposited again,
/// at the latest where the droplet stops.
pub fn simulate_lane(
    uniforms: &DropletUniforms,
    height: &[f32],
    origins: &[u32],
    offsets: &[u32],
    brush: &[BrushTap],
    lane: usize,
    mut emit: impl FnMut(usize, i32),
) {
    let u = uniforms;
    let width = u.width as usize;
    let field = (u.width as i32, u.height as i32);
    let limit = Vec2::new(u.width as f32 - 1.0, u.height as f32 - 1.0);
    let erode = u.mode == DropletMode::Erode as u32;

    let origin = origins[lane] as usize;
    let slot = u.offset_base as usize + lane;
    let offset = Vec2::new(
        f32::from_bits(offsets[slot * 2]),
        f32::from_bits(offsets[slot * 2 + 1]),
    );
    let mut pos = (Vec2::new((origin % width) as f32, (origin / width) as f32) + offset)
        .clamp(Vec2::ZERO, limit - SPAWN_MARGIN);

    let mut direction = Vec2::ZERO;
    let mut speed = u.start_speed;
    let mut water = u.start_water;
    // Carried sediment on the accumulator's fixed-point grid, in [0, MAX_CARRIED].
    let mut carried = 0i32;

    for step in 0..u.max_lifetime {
        let node = pos.floor().as_ivec2();
        let node_index = node.y as usize * width + node.x as usize;
        let (current, gradient) = sample(height, u.width, pos);

        direction = direction * u.inertia - gradient * (1.0 - u.inertia);
        let length = direction.length();
        direction = if length > DEGENERATE_DIRECTION {
            direction / length
        } else {
            fallback_direction(node_index as u32, step, u.seed)
        };

        let next = pos + direction;
        if next.x < 0.0 || next.y < 0.0 || next.x >= limit.x || next.y >= limit.y {
            break;
        }
        let delta = sample(height, u.width, next).0 - current;

        if erode {
            let sediment = dequantize(carried, u.scale);
            let capacity =
                (-delta * speed * water * u.capacity_factor).max(u.min_capacity);
            let amount = if delta > 0.0 || sediment > capacity {
                if delta > 0.0 {
                    delta.min(sediment)
                } else {
                    (sediment - capacity) * u.deposit_speed
                }
            } else {
                -((capacity - sediment) * u.erode_speed).min(-delta)
            };
            let step = clamp_step(quantize(amount, u.scale), carried);
            carried -= splat_quantized(brush, (node.x, node.y), field, step, &mut emit);
        } else {
            emit(node_index, quantize(water, u.scale));
        }

        speed = update_speed(u, speed, delta);
        water *= 1.0 - u.evaporate_speed;
        pos = next;

        if water < MIN_WATER {
            break;
        }
    }

    if erode {
        let node = pos.floor().as_ivec2();
        splat_quantized(brush, (node.x, node.y), field, carried, &mut emit);
    }
}
