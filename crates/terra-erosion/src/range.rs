//! Parallel min/max of a height field.

use std::sync::{Arc, PoisonError, RwLock};

use crate::device::{BufferId, ComputeDevice, ComputePass};
use crate::error::{ConfigurationError, DeviceError, ErosionError};
use crate::fixed::decode_ordered;
use crate::guard::{RunOutcome, SingleFlight};
use crate::height_field::HeightFieldBuffer;
use crate::kernels::GridUniforms;
use crate::layout::TerrainLayout;

/// Lowest and highest displacement of the field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplacementRange {
    pub min: f32,
    pub max: f32,
}

impl DisplacementRange {
    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    pub fn midpoint(&self) -> f32 {
        (self.min + self.max) * 0.5
    }
}

impl Default for DisplacementRange {
    fn default() -> Self {
        Self { min: 0.0, max: 0.0 }
    }
}

/// Reduces a field into two order-preserving integers with atomic min/max.
///
/// The accumulator is reset to `[+inf, -inf]` in the same submission right
/// before every reduction.
pub struct DisplacementRangeReducer<D> {
    device: Arc<D>,
    layout: TerrainLayout,
    bounds: BufferId,
    latest: RwLock<DisplacementRange>,
    flight: SingleFlight,
}

impl<D: ComputeDevice> DisplacementRangeReducer<D> {
    pub fn new(device: Arc<D>, layout: TerrainLayout) -> Result<Self, ErosionError> {
        let bounds = device.create_buffer("displacement-range", 2)?;
        Ok(Self {
            device,
            layout,
            bounds,
            latest: RwLock::new(DisplacementRange::default()),
            flight: SingleFlight::new(),
        })
    }

    /// Range of the last completed run.
    pub fn latest(&self) -> DisplacementRange {
        *self.latest.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn encode(&self, source: BufferId) -> [ComputePass; 2] {
        [
            ComputePass::ResetRange { range: self.bounds },
            ComputePass::ReduceRange {
                uniforms: GridUniforms::new(&self.layout),
                source,
                range: self.bounds,
            },
        ]
    }

    pub async fn run(&self, field: &HeightFieldBuffer) -> Result<RunOutcome, ErosionError> {
        let Some(_flight) = self.flight.try_begin() else {
            log::trace!("Range reduction already running, dropping request");
            return Ok(RunOutcome::Skipped);
        };
        if *field.layout() != self.layout {
            return Err(ConfigurationError::LengthMismatch {
                what: "range source field",
                expected: self.layout.texels(),
                actual: field.layout().texels(),
            }
            .into());
        }

        self.device.submit(&self.encode(field.buffer()))?;
        let words = self.device.read_buffer(self.bounds).await?;
        let [lo, hi] = words[..] else {
            return Err(DeviceError::SizeMismatch {
                id: self.bounds,
                capacity: 2,
                actual: words.len(),
            }
            .into());
        };
        let range = DisplacementRange {
            min: decode_ordered(lo as i32),
            max: decode_ordered(hi as i32),
        };
        log::debug!("Displacement range [{}, {}]", range.min, range.max);
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = range;
        Ok(RunOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_device::CpuDevice;
    use crate::height_field::HeightField;

    fn reduce(values: Vec<f32>, width: u32, height: u32) -> DisplacementRange {
        let device = Arc::new(CpuDevice::new());
        let layout = TerrainLayout::new(width, height, 1, 1.0).unwrap();
        let reducer = DisplacementRangeReducer::new(device.clone(), layout).unwrap();
        let field = HeightFieldBuffer::new(&*device, "height", layout).unwrap();
        field
            .upload(&*device, HeightField::new(width, height, values).unwrap())
            .unwrap();
        pollster::block_on(reducer.run(&field)).unwrap();
        reducer.latest()
    }

    #[test]
    fn test_known_extremes_reduce_exactly() {
        for (width, height) in [(16, 16), (300, 7), (2, 1000)] {
            let n = (width * height) as usize;
            let mut values: Vec<f32> = (0..n).map(|i| ((i * 31) % 40) as f32 - 3.5).collect();
            values[n / 3] = -5.0;
            values[n - 2] = 42.0;
            let range = reduce(values, width, height);
            assert_eq!(range, DisplacementRange { min: -5.0, max: 42.0 });
        }
    }

    #[test]
    fn test_all_negative_field() {
        let range = reduce(vec![-3.0, -1.5, -8.25, -2.0], 2, 2);
        assert_eq!(range.min, -8.25);
        assert_eq!(range.max, -1.5);
    }

    #[test]
    fn test_repeated_runs_reset_accumulators() {
        let device = Arc::new(CpuDevice::new());
        let layout = TerrainLayout::square(4, 1, 1.0).unwrap();
        let reducer = DisplacementRangeReducer::new(device.clone(), layout).unwrap();
        let field = HeightFieldBuffer::new(&*device, "height", layout).unwrap();

        field.upload(&*device, HeightField::flat(4, 4, 100.0)).unwrap();
        pollster::block_on(reducer.run(&field)).unwrap();
        field.upload(&*device, HeightField::flat(4, 4, 1.0)).unwrap();
        pollster::block_on(reducer.run(&field)).unwrap();

        assert_eq!(reducer.latest(), DisplacementRange { min: 1.0, max: 1.0 });
        assert_eq!(reducer.latest().span(), 0.0);
    }

    #[test]
    fn test_encode_resets_before_reducing() {
        let device = Arc::new(CpuDevice::new());
        let layout = TerrainLayout::square(4, 1, 1.0).unwrap();
        let reducer = DisplacementRangeReducer::new(device, layout).unwrap();
        let [reset, reduce] = reducer.encode(BufferId(0));
        assert_eq!(reset.kernel_name(), "range_reset");
        assert_eq!(reduce.kernel_name(), "range_reduce");
    }
}
