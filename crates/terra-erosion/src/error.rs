//! Error types for the erosion core.

use terra_gpu::{GpuContextError, ReadbackError, ShaderError, TextureError};

use crate::device::BufferId;

/// Size or layout mismatch detected while building simulators or validating
/// parameters. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// The field cannot hold a single sampleable droplet step.
    #[error("field {width}x{height} is too small; both sides must be at least 2 texels")]
    FieldTooSmall { width: u32, height: u32 },

    /// Droplet cells must subdivide cleanly in the quad-tree sampler.
    #[error("droplet cell size {0} is not a power of two")]
    CellNotPowerOfTwo(u32),

    /// The droplet grid must tile the field exactly.
    #[error("droplet cell size {cell} does not divide field {width}x{height}")]
    CellDoesNotDivide { cell: u32, width: u32, height: u32 },

    /// A host array does not match the buffer it is meant to fill.
    #[error("{what} holds {actual} values, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A texture descriptor does not describe an `f32` height field of this size.
    #[error("texel layout {width}x{height} at {bytes_per_texel} B/texel does not match field {expected_width}x{expected_height} of f32")]
    TexelLayout {
        width: u32,
        height: u32,
        bytes_per_texel: u32,
        expected_width: u32,
        expected_height: u32,
    },

    /// Mesh extent is not a positive finite number.
    #[error("mesh size {0} must be positive and finite")]
    MeshSize(f32),

    /// Height span too wide for the fixed-point droplet accumulator.
    #[error("height span {span} exceeds the representable erosion span {max}")]
    SpanTooLarge { span: f32, max: f32 },

    /// A simulation parameter is out of its accepted range.
    #[error("parameter {name} = {value} is outside {range}")]
    InvalidParameter {
        name: &'static str,
        value: f32,
        range: &'static str,
    },
}

/// Failure of the compute backend. Fatal and never retried.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    Context(#[from] GpuContextError),

    #[error(transparent)]
    Readback(#[from] ReadbackError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Texture(#[from] TextureError),

    /// A handle that this device never issued.
    #[error("unknown buffer handle {0:?}")]
    UnknownBuffer(BufferId),

    /// Host write or buffer copy with mismatched lengths.
    #[error("buffer {id:?} holds {capacity} words, got {actual}")]
    SizeMismatch {
        id: BufferId,
        capacity: usize,
        actual: usize,
    },

    /// A worker thread of the reference backend panicked mid-dispatch.
    #[error("compute worker failed: {0}")]
    Worker(String),
}

/// Any failure surfaced by a `run_*` operation.
#[derive(Debug, thiserror::Error)]
pub enum ErosionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_wraps_transparently() {
        let err: ErosionError = ConfigurationError::CellNotPowerOfTwo(3).into();
        assert_eq!(err.to_string(), "droplet cell size 3 is not a power of two");
        assert!(matches!(err, ErosionError::Configuration(_)));
    }

    #[test]
    fn test_device_error_from_readback() {
        let err: DeviceError = ReadbackError::Cancelled.into();
        let err: ErosionError = err.into();
        assert!(matches!(err, ErosionError::Device(DeviceError::Readback(_))));
    }
}
