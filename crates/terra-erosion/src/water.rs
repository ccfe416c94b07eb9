//! Transient water field traced by droplets over the current terrain.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::device::{BufferId, ComputeDevice, ComputePass};
use crate::droplets::DropletTables;
use crate::error::{ConfigurationError, ErosionError};
use crate::fixed::WATER_SCALE;
use crate::guard::{RunOutcome, SingleFlight};
use crate::height_field::{HeightField, HeightFieldBuffer};
use crate::kernels::{ApplyUniforms, DropletMode, DropletUniforms};
use crate::params::ErosionParameters;

/// Accumulates the water each droplet carries through every visited cell.
///
/// Uses the same placement tables and step function as hydraulic erosion but
/// only writes its own water buffer, which is cleared at the start of every
/// run. The terrain is read, never written.
pub struct WaterSimulator<D> {
    device: Arc<D>,
    tables: Arc<DropletTables>,
    accum: BufferId,
    water: HeightFieldBuffer,
    cursor: AtomicUsize,
    seed: u32,
    flight: SingleFlight,
}

impl<D: ComputeDevice> WaterSimulator<D> {
    pub fn new(device: Arc<D>, tables: Arc<DropletTables>, seed: u32) -> Result<Self, ErosionError> {
        let layout = *tables.layout();
        let accum = device.create_buffer("water-accum", layout.texels())?;
        let water = HeightFieldBuffer::new(&*device, "water", layout)?;
        Ok(Self {
            device,
            tables,
            accum,
            water,
            cursor: AtomicUsize::new(0),
            seed,
            flight: SingleFlight::new(),
        })
    }

    /// Water field of the last completed run.
    pub fn water_field(&self) -> HeightField {
        self.water.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    pub fn encode(
        &self,
        terrain: BufferId,
        params: &ErosionParameters,
    ) -> Result<Vec<ComputePass>, ErosionError> {
        let layout = self.tables.layout();
        let (brush, brush_len) = self.tables.brush(&*self.device, 0)?;
        let iterations = params.water_iterations as usize;
        let first = self.cursor.fetch_add(iterations, Ordering::AcqRel);

        let mut passes = vec![
            ComputePass::Clear { buffer: self.accum },
            ComputePass::Clear {
                buffer: self.water.buffer(),
            },
        ];
        for slot in first..first + iterations {
            passes.push(ComputePass::Droplets {
                uniforms: DropletUniforms::new(
                    layout,
                    params,
                    DropletMode::Trace,
                    slot,
                    brush_len,
                    self.seed.wrapping_add(slot as u32),
                    WATER_SCALE,
                ),
                height: terrain,
                accum: self.accum,
                origins: self.tables.origins(),
                offsets: self.tables.offsets(),
                brush,
            });
        }
        passes.push(ComputePass::ApplyDelta {
            uniforms: ApplyUniforms::new(layout.texels(), WATER_SCALE),
            accum: self.accum,
            target: self.water.buffer(),
        });
        Ok(passes)
    }

    /// Trace `params.water_iterations` droplet waves over `terrain`.
    pub async fn run(
        &self,
        terrain: &HeightFieldBuffer,
        params: &ErosionParameters,
    ) -> Result<RunOutcome, ErosionError> {
        let Some(_flight) = self.flight.try_begin() else {
            log::trace!("Water simulation already running, dropping request");
            return Ok(RunOutcome::Skipped);
        };
        params.validate()?;
        if terrain.layout() != self.tables.layout() {
            return Err(ConfigurationError::LengthMismatch {
                what: "water terrain field",
                expected: self.tables.layout().texels(),
                actual: terrain.layout().texels(),
            }
            .into());
        }

        log::debug!("Water simulation: {} iterations", params.water_iterations);
        self.device.submit(&self.encode(terrain.buffer(), params)?)?;
        self.water.download(&*self.device).await?;
        Ok(RunOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_device::CpuDevice;
    use crate::layout::TerrainLayout;

    fn valley(size: u32) -> HeightField {
        let c = (size - 1) as f32 / 2.0;
        let values = (0..size * size)
            .map(|i| 5.0 + ((i % size) as f32 - c).abs() * 0.5 + (i / size) as f32 * 0.1)
            .collect();
        HeightField::new(size, size, values).unwrap()
    }

    fn setup() -> (Arc<CpuDevice>, WaterSimulator<CpuDevice>, HeightFieldBuffer) {
        let device = Arc::new(CpuDevice::new());
        let layout = TerrainLayout::square(16, 4, 16.0).unwrap();
        let tables = Arc::new(DropletTables::upload(&*device, layout).unwrap());
        let sim = WaterSimulator::new(device.clone(), tables, 3).unwrap();
        let terrain = HeightFieldBuffer::new(&*device, "height", layout).unwrap();
        terrain.upload(&*device, valley(16)).unwrap();
        (device, sim, terrain)
    }

    #[tokio::test]
    async fn test_terrain_is_not_modified() {
        let (device, sim, terrain) = setup();
        sim.run(&terrain, &ErosionParameters::default()).await.unwrap();
        terrain.download(&*device).await.unwrap();
        assert_eq!(terrain.snapshot(), valley(16));
        assert!(sim.water_field().total() > 0.0);
    }

    #[tokio::test]
    async fn test_each_run_starts_from_empty_field() {
        let (_device, sim, terrain) = setup();
        let params = ErosionParameters {
            water_iterations: 4,
            ..Default::default()
        };
        sim.run(&terrain, &params).await.unwrap();
        let first = sim.water_field().total();
        sim.run(&terrain, &params).await.unwrap();
        let second = sim.water_field().total();
        assert!(second > 0.0);
        assert!(second < first * 2.0, "second run accumulated on top of the first");

        let passes = sim.encode(terrain.buffer(), &params).unwrap();
        assert!(matches!(passes[0], ComputePass::Clear { .. }));
        assert!(matches!(passes[1], ComputePass::Clear { .. }));
        assert_eq!(passes.len(), 4 + 2 + 1);
    }

    #[tokio::test]
    async fn test_water_is_non_negative() {
        let (_device, sim, terrain) = setup();
        sim.run(&terrain, &ErosionParameters::default()).await.unwrap();
        assert!(sim.water_field().values().iter().all(|&w| w >= 0.0));
    }
}
