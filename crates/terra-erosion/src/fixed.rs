//! Integer encodings used wherever lanes combine values through atomics.
//!
//! Storage-buffer atomics only exist for 32-bit integers, so droplet splats are
//! accumulated as fixed-point `i32` and range reductions compare floats through
//! an order-preserving integer encoding.

use crate::error::ConfigurationError;

/// Finest fixed-point scale for terrain deltas (2^20).
pub const EROSION_SCALE: f32 = 1_048_576.0;

/// Coarsest scale a hydraulic run may fall back to (2^4).
pub const MIN_EROSION_SCALE: f32 = 16.0;

/// Field spans an accumulator cell must be able to hold in one dispatch.
pub const SPAN_HEADROOM: f32 = 64.0;

/// Ceiling of a droplet's carried load on the fixed-point grid.
///
/// Per-step amounts are clamped so `carried` stays in `[0, MAX_CARRIED]` and
/// never comes near `i32` overflow.
pub const MAX_CARRIED: i32 = 1 << 30;

/// Fixed-point scale for the water path field (2^10).
pub const WATER_SCALE: f32 = 1_024.0;

/// Quantise `value` to the fixed-point grid. Out-of-range values saturate.
///
/// Ties round to even, matching WGSL `round`.
#[inline]
pub fn quantize(value: f32, scale: f32) -> i32 {
    (value * scale).round_ties_even() as i32
}

/// Largest power-of-two scale, at most [`EROSION_SCALE`], at which an
/// accumulator cell holds [`SPAN_HEADROOM`] times `span` without overflow.
///
/// Fails when even [`MIN_EROSION_SCALE`] cannot represent the span.
pub fn erosion_scale_for_span(span: f32) -> Result<f32, ConfigurationError> {
    let limit = i32::MAX as f32;
    if !span.is_finite() || span < 0.0 {
        return Err(ConfigurationError::SpanTooLarge {
            span,
            max: max_representable_span(),
        });
    }
    let mut scale = EROSION_SCALE;
    while span * SPAN_HEADROOM * scale > limit {
        if scale <= MIN_EROSION_SCALE {
            return Err(ConfigurationError::SpanTooLarge {
                span,
                max: max_representable_span(),
            });
        }
        scale *= 0.5;
    }
    Ok(scale)
}

/// Widest height span [`erosion_scale_for_span`] accepts.
pub fn max_representable_span() -> f32 {
    i32::MAX as f32 / (SPAN_HEADROOM * MIN_EROSION_SCALE)
}

/// Clamp a quantised step so `carried - step` stays in `[0, MAX_CARRIED]`.
#[inline]
pub fn clamp_step(step: i32, carried: i32) -> i32 {
    step.clamp(carried - MAX_CARRIED, carried)
}

/// Inverse of [`quantize`].
#[inline]
pub fn dequantize(value: i32, scale: f32) -> f32 {
    value as f32 / scale
}

/// Map a float onto an `i32` whose signed ordering matches the float ordering.
///
/// Non-negative floats keep their bit pattern; negative floats have their
/// magnitude bits flipped so larger magnitudes sort lower. The mapping is its
/// own inverse, see [`decode_ordered`].
#[inline]
pub fn encode_ordered(value: f32) -> i32 {
    let bits = value.to_bits() as i32;
    if bits < 0 { bits ^ 0x7fff_ffff } else { bits }
}

/// Inverse of [`encode_ordered`].
#[inline]
pub fn decode_ordered(encoded: i32) -> f32 {
    let bits = if encoded < 0 {
        encoded ^ 0x7fff_ffff
    } else {
        encoded
    };
    f32::from_bits(bits as u32)
}

/// Reset value of a running minimum.
pub const ORDERED_POS_INF: i32 = 0x7f80_0000;

/// Reset value of a running maximum: `encode_ordered(f32::NEG_INFINITY)`.
pub const ORDERED_NEG_INF: i32 = 0xff80_0000_u32 as i32 ^ 0x7fff_ffff;
