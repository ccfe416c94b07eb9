//! Compute backend abstraction.
//!
//! Simulators describe their work as a list of [`ComputePass`]es and hand it
//! to a [`ComputeDevice`]. One `submit` call is one command submission; host
//! data only comes back through the asynchronous `read_buffer`. The same pass
//! list runs on the wgpu backend and on the CPU reference backend.

use std::future::Future;

use crate::error::DeviceError;
use crate::kernels::{ApplyUniforms, BlurUniforms, DropletUniforms, GridUniforms, ThermalUniforms};

/// Opaque handle to a device buffer of 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) usize);

/// A bedrock + sediment buffer pair forming one thermal slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerPair {
    pub bedrock: BufferId,
    pub sediment: BufferId,
}

/// One compute dispatch or transfer inside a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputePass {
    /// One droplet per lane, splatting fixed-point deltas into `accum`.
    Droplets {
        uniforms: DropletUniforms,
        height: BufferId,
        accum: BufferId,
        origins: BufferId,
        offsets: BufferId,
        brush: BufferId,
    },
    /// `target += accum / scale`, then `accum = 0`.
    ApplyDelta {
        uniforms: ApplyUniforms,
        accum: BufferId,
        target: BufferId,
    },
    /// Zero every word.
    Clear { buffer: BufferId },
    /// Copy every word of `source` into `destination` (equal lengths).
    Copy {
        source: BufferId,
        destination: BufferId,
    },
    /// One thermal relaxation iteration from `source` to `destination`.
    Thermal {
        uniforms: ThermalUniforms,
        source: LayerPair,
        destination: LayerPair,
    },
    /// `target = bedrock + sediment`.
    Combine {
        uniforms: GridUniforms,
        layers: LayerPair,
        target: BufferId,
    },
    /// Write the ordered encodings of `+inf` / `-inf` into `range[0..2]`.
    ResetRange { range: BufferId },
    /// Atomic min/max of every value in `source` into `range`.
    ReduceRange {
        uniforms: GridUniforms,
        source: BufferId,
        range: BufferId,
    },
    /// 3x3 binomial smoothing from `source` into `destination`.
    Blur {
        uniforms: BlurUniforms,
        source: BufferId,
        destination: BufferId,
    },
}

impl ComputePass {
    /// Short name used in logs and pipeline lookups.
    pub fn kernel_name(&self) -> &'static str {
        match self {
            Self::Droplets { .. } => "droplets",
            Self::ApplyDelta { .. } => "apply_delta",
            Self::Clear { .. } => "clear",
            Self::Copy { .. } => "copy",
            Self::Thermal { .. } => "thermal",
            Self::Combine { .. } => "combine",
            Self::ResetRange { .. } => "range_reset",
            Self::ReduceRange { .. } => "range_reduce",
            Self::Blur { .. } => "blur",
        }
    }
}

/// A device able to hold word buffers and execute [`ComputePass`] lists.
pub trait ComputeDevice: Send + Sync {
    /// Allocate a zeroed buffer of `words` words.
    fn create_buffer(&self, label: &str, words: usize) -> Result<BufferId, DeviceError>;

    /// Overwrite a buffer from the host. `words` must match its length.
    fn write_buffer(&self, id: BufferId, words: &[u32]) -> Result<(), DeviceError>;

    /// Length of a buffer in words.
    fn buffer_len(&self, id: BufferId) -> Result<usize, DeviceError>;

    /// Encode `passes` in order into one submission.
    fn submit(&self, passes: &[ComputePass]) -> Result<(), DeviceError>;

    /// Copy a buffer to host memory once all prior submissions completed.
    fn read_buffer(
        &self,
        id: BufferId,
    ) -> impl Future<Output = Result<Vec<u32>, DeviceError>> + Send;

    /// Number of `submit` calls so far.
    fn submissions(&self) -> u64;

    /// Allocate a buffer and fill it.
    fn create_buffer_init(&self, label: &str, words: &[u32]) -> Result<BufferId, DeviceError> {
        let id = self.create_buffer(label, words.len())?;
        self.write_buffer(id, words)?;
        Ok(id)
    }

    /// Overwrite a buffer with floats.
    fn write_f32(&self, id: BufferId, values: &[f32]) -> Result<(), DeviceError> {
        self.write_buffer(id, bytemuck::cast_slice(values))
    }

    /// Read a buffer as floats.
    fn read_f32(&self, id: BufferId) -> impl Future<Output = Result<Vec<f32>, DeviceError>> + Send {
        async move {
            let words = self.read_buffer(id).await?;
            Ok(words.into_iter().map(f32::from_bits).collect())
        }
    }
}
