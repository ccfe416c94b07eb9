//! Droplet-based hydraulic erosion.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::device::{BufferId, ComputeDevice, ComputePass};
use crate::droplets::DropletTables;
use crate::error::{ConfigurationError, ErosionError};
use crate::fixed::erosion_scale_for_span;
use crate::guard::{RunOutcome, SingleFlight};
use crate::height_field::HeightFieldBuffer;
use crate::kernels::{ApplyUniforms, DropletMode, DropletUniforms};
use crate::params::ErosionParameters;

/// Erodes a height field with one droplet per droplet cell per iteration.
///
/// Every iteration is a `Droplets` dispatch into a fixed-point accumulator
/// followed by an `ApplyDelta` fold, so each iteration sees the terrain left
/// by the previous one. An iteration cursor persists across runs and selects
/// the offset slot, which keeps successive runs walking the sampler sequence.
///
/// The accumulator scale is picked per run from the field's current height
/// span, so steep terrain trades precision for range instead of overflowing.
pub struct HydraulicErosionSimulator<D> {
    device: Arc<D>,
    tables: Arc<DropletTables>,
    accum: BufferId,
    cursor: AtomicUsize,
    seed: u32,
    flight: SingleFlight,
}

impl<D: ComputeDevice> HydraulicErosionSimulator<D> {
    pub fn new(device: Arc<D>, tables: Arc<DropletTables>, seed: u32) -> Result<Self, ErosionError> {
        let accum = device.create_buffer("erosion-accum", tables.layout().texels())?;
        Ok(Self {
            device,
            tables,
            accum,
            cursor: AtomicUsize::new(0),
            seed,
            flight: SingleFlight::new(),
        })
    }

    /// Next offset slot to be used.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    /// Pass list for `params.erosion_iterations` iterations on `target`,
    /// accumulating at fixed-point `scale`.
    ///
    /// Advances the cursor.
    pub fn encode(
        &self,
        target: BufferId,
        params: &ErosionParameters,
        scale: f32,
    ) -> Result<Vec<ComputePass>, ErosionError> {
        let layout = self.tables.layout();
        let (brush, brush_len) = self.tables.brush(&*self.device, params.brush_radius)?;
        let iterations = params.erosion_iterations as usize;
        let first = self.cursor.fetch_add(iterations, Ordering::AcqRel);

        let mut passes = Vec::with_capacity(iterations * 2);
        for slot in first..first + iterations {
            passes.push(ComputePass::Droplets {
                uniforms: DropletUniforms::new(
                    layout,
                    params,
                    DropletMode::Erode,
                    slot,
                    brush_len,
                    self.seed.wrapping_add(slot as u32),
                    scale,
                ),
                height: target,
                accum: self.accum,
                origins: self.tables.origins(),
                offsets: self.tables.offsets(),
                brush,
            });
            passes.push(ComputePass::ApplyDelta {
                uniforms: ApplyUniforms::new(layout.texels(), scale),
                accum: self.accum,
                target,
            });
        }
        Ok(passes)
    }

    /// Erode `field` in place and publish the result to its host copy.
    ///
    /// Returns `Skipped` without touching anything when a run is in flight.
    pub async fn run(
        &self,
        field: &HeightFieldBuffer,
        params: &ErosionParameters,
    ) -> Result<RunOutcome, ErosionError> {
        let Some(_flight) = self.flight.try_begin() else {
            log::trace!("Hydraulic erosion already running, dropping request");
            return Ok(RunOutcome::Skipped);
        };
        params.validate()?;
        if field.layout() != self.tables.layout() {
            return Err(ConfigurationError::LengthMismatch {
                what: "hydraulic target field",
                expected: self.tables.layout().texels(),
                actual: field.layout().texels(),
            }
            .into());
        }

        let span = field
            .read()
            .bounds()
            .map_or(0.0, |(lo, hi)| hi - lo);
        let scale = erosion_scale_for_span(span)?;

        let passes = self.encode(field.buffer(), params, scale)?;
        log::debug!(
            "Hydraulic erosion: {} iterations x {} droplets from slot {} at scale {}",
            params.erosion_iterations,
            self.tables.layout().lanes(),
            self.cursor() - params.erosion_iterations as usize,
            scale
        );
        self.device.submit(&passes)?;
        field.download(&*self.device).await?;
        Ok(RunOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_device::CpuDevice;
    use crate::height_field::HeightField;
    use crate::layout::TerrainLayout;

    fn setup(size: u32, cell: u32) -> (Arc<CpuDevice>, HydraulicErosionSimulator<CpuDevice>, HeightFieldBuffer) {
        let device = Arc::new(CpuDevice::with_workers(4));
        let layout = TerrainLayout::square(size, cell, size as f32).unwrap();
        let tables = Arc::new(DropletTables::upload(&*device, layout).unwrap());
        let sim = HydraulicErosionSimulator::new(device.clone(), tables, 11).unwrap();
        let field = HeightFieldBuffer::new(&*device, "height", layout).unwrap();
        (device, sim, field)
    }

    fn bowl(size: u32) -> HeightField {
        let c = (size - 1) as f32 / 2.0;
        let values = (0..size * size)
            .map(|i| {
                let x = (i % size) as f32 - c;
                let y = (i / size) as f32 - c;
                10.0 + 0.05 * (x * x + y * y) + (x * 0.9).sin() * 0.5
            })
            .collect();
        HeightField::new(size, size, values).unwrap()
    }

    #[tokio::test]
    async fn test_zero_strength_flat_field_unchanged() {
        let (device, sim, field) = setup(4, 2);
        field.upload(&*device, HeightField::flat(4, 4, 10.0)).unwrap();
        let params = ErosionParameters {
            erode_speed: 0.0,
            deposit_speed: 0.0,
            erosion_iterations: 1,
            ..Default::default()
        };

        assert_eq!(sim.run(&field, &params).await.unwrap(), RunOutcome::Completed);
        assert!(field.read().values().iter().all(|&v| v == 10.0));
    }

    #[tokio::test]
    async fn test_mass_drift_stays_small() {
        let (device, sim, field) = setup(32, 4);
        let initial = bowl(32);
        let before = initial.total();
        field.upload(&*device, initial.clone()).unwrap();

        let params = ErosionParameters {
            erosion_iterations: 4,
            ..Default::default()
        };
        sim.run(&field, &params).await.unwrap();

        let after = field.read();
        assert_ne!(*after, initial, "bowl should erode");
        assert!(after.values().iter().all(|v| v.is_finite()));
        let drift = (after.total() - before).abs();
        assert!(drift < 1e-2, "mass drift {drift}");
    }

    fn ramp(size: u32, drop: f32) -> HeightField {
        let values = (0..size * size)
            .map(|i| drop * (size - 1 - i % size) as f32 + 0.5 * (i / size) as f32)
            .collect();
        HeightField::new(size, size, values).unwrap()
    }

    #[tokio::test]
    async fn test_steep_ramp_conserves_mass() {
        for drop in [500.0, 3_000.0] {
            let (device, sim, field) = setup(16, 4);
            let initial = ramp(16, drop);
            let before = initial.total();
            field.upload(&*device, initial).unwrap();

            let params = ErosionParameters {
                erosion_iterations: 1,
                downhill_acceleration: true,
                ..Default::default()
            };
            assert_eq!(sim.run(&field, &params).await.unwrap(), RunOutcome::Completed);

            let after = field.read();
            assert!(after.values().iter().all(|v| v.is_finite()));
            let drift = (after.total() - before).abs();
            assert!(drift < 1.0, "drop {drop}: mass drift {drift} of {before}");
        }
    }

    #[tokio::test]
    async fn test_unrepresentable_span_is_rejected() {
        let (device, sim, field) = setup(4, 2);
        let mut values = vec![0.0; 16];
        values[5] = 1.0e9;
        field.upload(&*device, HeightField::new(4, 4, values).unwrap()).unwrap();

        let err = sim.run(&field, &ErosionParameters::default()).await.unwrap_err();
        assert!(matches!(
            err,
            ErosionError::Configuration(ConfigurationError::SpanTooLarge { .. })
        ));
        assert_eq!(device.submissions(), 0);
        assert!(!sim.is_running());
    }

    #[tokio::test]
    async fn test_results_independent_of_worker_count() {
        let mut results = Vec::new();
        for workers in [1, 3] {
            let device = Arc::new(CpuDevice::with_workers(workers));
            let layout = TerrainLayout::square(32, 4, 32.0).unwrap();
            let tables = Arc::new(DropletTables::upload(&*device, layout).unwrap());
            let sim = HydraulicErosionSimulator::new(device.clone(), tables, 5).unwrap();
            let field = HeightFieldBuffer::new(&*device, "height", layout).unwrap();
            field.upload(&*device, bowl(32)).unwrap();
            sim.run(&field, &ErosionParameters::default()).await.unwrap();
            results.push(field.snapshot());
        }
        assert_eq!(results[0], results[1]);
    }

    #[tokio::test]
    async fn test_cursor_advances_by_iterations() {
        let (device, sim, field) = setup(16, 4);
        field.upload(&*device, bowl(16)).unwrap();
        let params = ErosionParameters {
            erosion_iterations: 3,
            ..Default::default()
        };
        sim.run(&field, &params).await.unwrap();
        sim.run(&field, &params).await.unwrap();
        assert_eq!(sim.cursor(), 6);
        assert_eq!(device.submissions(), 2);
    }

    #[test]
    fn test_encode_pairs_droplets_with_apply() {
        let (_device, sim, field) = setup(16, 4);
        let params = ErosionParameters {
            erosion_iterations: 2,
            ..Default::default()
        };
        let passes = sim.encode(field.buffer(), &params, 1024.0).unwrap();
        let names: Vec<_> = passes.iter().map(ComputePass::kernel_name).collect();
        assert_eq!(names, ["droplets", "apply_delta", "droplets", "apply_delta"]);
    }

    #[tokio::test]
    async fn test_invalid_parameters_are_rejected() {
        let (_device, sim, field) = setup(16, 4);
        let params = ErosionParameters {
            inertia: 2.0,
            ..Default::default()
        };
        let err = sim.run(&field, &params).await.unwrap_err();
        assert!(matches!(err, ErosionError::Configuration(_)));
        assert!(!sim.is_running());
    }
}
