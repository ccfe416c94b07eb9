//! Double-buffered thermal erosion over bedrock and sediment layers.

use std::sync::Arc;

use crate::device::{BufferId, ComputeDevice, ComputePass, LayerPair};
use crate::error::{ConfigurationError, ErosionError};
use crate::guard::{RunOutcome, SingleFlight};
use crate::height_field::{HeightField, HeightFieldBuffer};
use crate::kernels::{GridUniforms, ThermalUniforms};
use crate::layout::TerrainLayout;
use crate::params::ErosionParameters;

/// Ping-pong slot of a layer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A = 0,
    B = 1,
}

impl Slot {
    /// Slot read by iteration `k`; it writes the other one.
    pub fn for_iteration(k: u32) -> Self {
        if k % 2 == 0 { Self::A } else { Self::B }
    }

    /// Slot holding the result after `iterations` iterations.
    pub fn after(iterations: u32) -> Self {
        Self::for_iteration(iterations)
    }

    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// Slope relaxation that moves material down slopes steeper than the talus
/// threshold.
///
/// Each run seeds slot A bedrock from the height field and clears slot A
/// sediment, queues all iterations back to back, then writes
/// `bedrock + sediment` of the result slot into the height field. The whole
/// run is a single submission.
pub struct ThermalErosionSimulator<D> {
    device: Arc<D>,
    layout: TerrainLayout,
    layers: [LayerPair; 2],
    sediment: HeightFieldBuffer,
    flight: SingleFlight,
}

impl<D: ComputeDevice> ThermalErosionSimulator<D> {
    pub fn new(device: Arc<D>, layout: TerrainLayout) -> Result<Self, ErosionError> {
        let texels = layout.texels();
        let pair = |name: &str| -> Result<LayerPair, ErosionError> {
            Ok(LayerPair {
                bedrock: device.create_buffer(&format!("thermal-bedrock-{name}"), texels)?,
                sediment: device.create_buffer(&format!("thermal-sediment-{name}"), texels)?,
            })
        };
        let layers = [pair("a")?, pair("b")?];
        let sediment = HeightFieldBuffer::new(&*device, "thermal-sediment", layout)?;
        Ok(Self {
            device,
            layout,
            layers,
            sediment,
            flight: SingleFlight::new(),
        })
    }

    pub fn layers(&self, slot: Slot) -> LayerPair {
        self.layers[slot as usize]
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    /// Sediment layer of the last completed run.
    pub fn sediment_field(&self) -> HeightField {
        self.sediment.snapshot()
    }

    /// Pass list for `params.thermal_iterations` iterations on `target`.
    pub fn encode(&self, target: BufferId, params: &ErosionParameters) -> Vec<ComputePass> {
        let iterations = params.thermal_iterations;
        let uniforms = ThermalUniforms::new(&self.layout, params);
        let seed = self.layers(Slot::A);

        let mut passes = Vec::with_capacity(iterations as usize + 4);
        passes.push(ComputePass::Copy {
            source: target,
            destination: seed.bedrock,
        });
        passes.push(ComputePass::Clear {
            buffer: seed.sediment,
        });
        for k in 0..iterations {
            let read = Slot::for_iteration(k);
            passes.push(ComputePass::Thermal {
                uniforms,
                source: self.layers(read),
                destination: self.layers(read.other()),
            });
        }

        let result = self.layers(Slot::after(iterations));
        passes.push(ComputePass::Combine {
            uniforms: GridUniforms::new(&self.layout),
            layers: result,
            target,
        });
        passes.push(ComputePass::Copy {
            source: result.sediment,
            destination: self.sediment.buffer(),
        });
        passes
    }

    /// Relax `field` in place and publish both it and the sediment layer.
    pub async fn run(
        &self,
        field: &HeightFieldBuffer,
        params: &ErosionParameters,
    ) -> Result<RunOutcome, ErosionError> {
        let Some(_flight) = self.flight.try_begin() else {
            log::trace!("Thermal erosion already running, dropping request");
            return Ok(RunOutcome::Skipped);
        };
        params.validate()?;
        if *field.layout() != self.layout {
            return Err(ConfigurationError::LengthMismatch {
                what: "thermal target field",
                expected: self.layout.texels(),
                actual: field.layout().texels(),
            }
            .into());
        }

        log::debug!(
            "Thermal erosion: {} iterations, result in slot {:?}",
            params.thermal_iterations,
            Slot::after(params.thermal_iterations)
        );
        self.device.submit(&self.encode(field.buffer(), params))?;
        field.download(&*self.device).await?;
        self.sediment.download(&*self.device).await?;
        Ok(RunOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_device::CpuDevice;
    use crate::kernels::thermal::thermal_step;

    fn setup(size: u32) -> (Arc<CpuDevice>, ThermalErosionSimulator<CpuDevice>, HeightFieldBuffer) {
        let device = Arc::new(CpuDevice::new());
        let layout = TerrainLayout::square(size, 2, size as f32).unwrap();
        let sim = ThermalErosionSimulator::new(device.clone(), layout).unwrap();
        let field = HeightFieldBuffer::new(&*device, "height", layout).unwrap();
        (device, sim, field)
    }

    fn spike(size: u32, value: f32) -> HeightField {
        let mut field = HeightField::flat(size, size, 0.0).into_values();
        let centre = (size / 2 * size + size / 2) as usize;
        field[centre] = value;
        HeightField::new(size, size, field).unwrap()
    }

    fn params(iterations: u32) -> ErosionParameters {
        ErosionParameters {
            thermal_iterations: iterations,
            thermal_border_min: 0.0,
            thermal_border_range: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_slot_parity() {
        assert_eq!(Slot::for_iteration(0), Slot::A);
        assert_eq!(Slot::for_iteration(3), Slot::B);
        assert_eq!(Slot::after(0), Slot::A);
        assert_eq!(Slot::after(7), Slot::B);
        assert_eq!(Slot::after(8), Slot::A);
    }

    #[test]
    fn test_combine_reads_result_parity() {
        let (_device, sim, field) = setup(8);
        for k in [0, 1, 2, 5] {
            let passes = sim.encode(field.buffer(), &params(k));
            let combine = passes
                .iter()
                .find_map(|p| match p {
                    ComputePass::Combine { layers, .. } => Some(*layers),
                    _ => None,
                })
                .unwrap();
            assert_eq!(combine, sim.layers(Slot::after(k)), "k = {k}");
            assert_eq!(passes.len(), k as usize + 4);
        }
    }

    #[tokio::test]
    async fn test_odd_and_even_iterations_publish_latest_result() {
        for k in [1, 2, 3] {
            let (device, sim, field) = setup(8);
            field.upload(&*device, spike(8, 20.0)).unwrap();
            sim.run(&field, &params(k)).await.unwrap();
            assert_eq!(field.snapshot(), relax(&spike(8, 20.0), k), "k = {k}");
        }
    }

    /// `iterations` steps computed directly with the step function.
    fn relax(field: &HeightField, iterations: u32) -> HeightField {
        let layout = TerrainLayout::square(field.width(), 2, 8.0).unwrap();
        let uniforms = ThermalUniforms::new(&layout, &params(iterations));
        let mut bed: Vec<u32> = field.values().iter().map(|v| v.to_bits()).collect();
        let mut sed = vec![0u32; bed.len()];
        let mut bed_out = vec![0; bed.len()];
        let mut sed_out = vec![0; bed.len()];
        for _ in 0..iterations {
            thermal_step(&uniforms, &bed, &sed, &mut bed_out, &mut sed_out);
            std::mem::swap(&mut bed, &mut bed_out);
            std::mem::swap(&mut sed, &mut sed_out);
        }
        let values = bed
            .iter()
            .zip(&sed)
            .map(|(b, s)| f32::from_bits(*b) + f32::from_bits(*s))
            .collect();
        HeightField::new(field.width(), field.height(), values).unwrap()
    }

    #[tokio::test]
    async fn test_mass_is_conserved_and_spike_spreads() {
        let (device, sim, field) = setup(16);
        field.upload(&*device, spike(16, 50.0)).unwrap();
        sim.run(&field, &params(12)).await.unwrap();

        let result = field.snapshot();
        assert!((result.total() - 50.0).abs() < 1e-3);
        assert!(result.get(8, 8) < 50.0);
        assert!(sim.sediment_field().total() > 0.0);
        assert_eq!(device.submissions(), 1);
    }

    #[tokio::test]
    async fn test_zero_iterations_leave_field_unchanged() {
        let (device, sim, field) = setup(8);
        field.upload(&*device, spike(8, 5.0)).unwrap();
        sim.run(&field, &params(0)).await.unwrap();
        assert_eq!(field.snapshot(), spike(8, 5.0));
        assert_eq!(sim.sediment_field().total(), 0.0);
    }
}
