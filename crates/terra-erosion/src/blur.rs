//! Height field smoothing.

use std::sync::Arc;

use crate::device::{BufferId, ComputeDevice, ComputePass};
use crate::error::{ConfigurationError, ErosionError};
use crate::guard::{RunOutcome, SingleFlight};
use crate::height_field::HeightFieldBuffer;
use crate::kernels::BlurUniforms;
use crate::layout::TerrainLayout;

/// Repeated 3x3 binomial blur through a scratch buffer.
pub struct BlurFilter<D> {
    device: Arc<D>,
    layout: TerrainLayout,
    scratch: BufferId,
    flight: SingleFlight,
}

impl<D: ComputeDevice> BlurFilter<D> {
    pub fn new(device: Arc<D>, layout: TerrainLayout) -> Result<Self, ErosionError> {
        let scratch = device.create_buffer("blur-scratch", layout.texels())?;
        Ok(Self {
            device,
            layout,
            scratch,
            flight: SingleFlight::new(),
        })
    }

    pub fn encode(&self, target: BufferId, iterations: u32) -> Vec<ComputePass> {
        let uniforms = BlurUniforms::new(&self.layout);
        (0..iterations)
            .flat_map(|_| {
                [
                    ComputePass::Blur {
                        uniforms,
                        source: target,
                        destination: self.scratch,
                    },
                    ComputePass::Copy {
                        source: self.scratch,
                        destination: target,
                    },
                ]
            })
            .collect()
    }

    pub async fn run(
        &self,
        field: &HeightFieldBuffer,
        iterations: u32,
    ) -> Result<RunOutcome, ErosionError> {
        let Some(_flight) = self.flight.try_begin() else {
            log::trace!("Blur already running, dropping request");
            return Ok(RunOutcome::Skipped);
        };
        if *field.layout() != self.layout {
            return Err(ConfigurationError::LengthMismatch {
                what: "blur target field",
                expected: self.layout.texels(),
                actual: field.layout().texels(),
            }
            .into());
        }

        log::debug!("Blur: {} iterations", iterations);
        self.device.submit(&self.encode(field.buffer(), iterations))?;
        field.download(&*self.device).await?;
        Ok(RunOutcome::Completed)
    }
}
