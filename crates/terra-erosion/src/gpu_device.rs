//! wgpu implementation of [`ComputeDevice`].
//!
//! Each kernel is one WGSL module under `shaders/` with entry point `main`.
//! Pipelines use auto-derived layouts: binding 0 is the kernel's uniform block
//! (when it has one) and storage buffers follow from binding 1.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use terra_gpu::{
    DisplacementTexture, GpuContext, PendingReadback, ShaderError, ShaderLibrary,
    StorageAllocator, WORD_SIZE,
};

use crate::device::{BufferId, ComputeDevice, ComputePass};
use crate::error::{DeviceError, ErosionError};
use crate::height_field::HeightField;
use crate::layout::{TerrainLayout, TexelLayout};

const KERNELS: [(&str, &str); 7] = [
    ("droplets", include_str!("shaders/droplets.wgsl")),
    ("apply_delta", include_str!("shaders/apply_delta.wgsl")),
    ("thermal", include_str!("shaders/thermal.wgsl")),
    ("combine", include_str!("shaders/combine.wgsl")),
    ("range_reset", include_str!("shaders/range_reset.wgsl")),
    ("range_reduce", include_str!("shaders/range_reduce.wgsl")),
    ("blur", include_str!("shaders/blur.wgsl")),
];

const LINEAR_GROUP: u32 = 256;
const DROPLET_GROUP: u32 = 64;
const TILE_GROUP: u32 = 8;

struct DeviceBuffer {
    buffer: wgpu::Buffer,
    words: usize,
}

/// GPU compute backend.
pub struct WgpuDevice {
    context: GpuContext,
    pipelines: HashMap<&'static str, wgpu::ComputePipeline>,
    buffers: RwLock<Vec<DeviceBuffer>>,
    submissions: AtomicU64,
}

impl WgpuDevice {
    /// Compile every kernel on an existing context.
    pub fn new(context: GpuContext) -> Result<Self, DeviceError> {
        let mut shaders = ShaderLibrary::new();
        let mut pipelines = HashMap::new();
        for (name, source) in KERNELS {
            shaders.load_from_source(&context.device, name, source);
            let module = shaders.get(name)?;
            let pipeline =
                context
                    .device
                    .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some(name),
                        layout: None,
                        module: &module,
                        entry_point: Some("main"),
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                        cache: None,
                    });
            pipelines.insert(name, pipeline);
        }
        log::info!(
            "GPU compute device ready on {} ({} kernels)",
            context.adapter_summary(),
            shaders.len()
        );

        Ok(Self {
            context,
            pipelines,
            buffers: RwLock::new(Vec::new()),
            submissions: AtomicU64::new(0),
        })
    }

    /// Acquire a headless adapter and compile the kernels.
    pub async fn headless() -> Result<Self, DeviceError> {
        let context = GpuContext::new_headless(wgpu::PowerPreference::HighPerformance).await?;
        Self::new(context)
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Texture the renderer samples for displacement.
    pub fn create_displacement_texture(
        &self,
        layout: &TerrainLayout,
    ) -> Result<DisplacementTexture, ErosionError> {
        layout.check_texels(&TexelLayout {
            width: layout.width(),
            height: layout.height(),
            bytes_per_texel: DisplacementTexture::BYTES_PER_TEXEL,
        })?;
        let texture =
            DisplacementTexture::new(&self.context.device, layout.width(), layout.height())
                .map_err(DeviceError::from)?;
        Ok(texture)
    }

    /// Copy a published height field into the displacement texture.
    pub fn publish_displacement(
        &self,
        texture: &DisplacementTexture,
        field: &HeightField,
    ) -> Result<(), ErosionError> {
        let (width, height) = texture.dimensions();
        let layout = TerrainLayout::new(field.width(), field.height(), 1, 1.0)?;
        layout.check_texels(&TexelLayout {
            width,
            height,
            bytes_per_texel: DisplacementTexture::BYTES_PER_TEXEL,
        })?;
        texture
            .upload(&self.context.queue, field.values())
            .map_err(DeviceError::from)?;
        Ok(())
    }

    fn lookup<'a>(
        buffers: &'a [DeviceBuffer],
        id: BufferId,
    ) -> Result<&'a DeviceBuffer, DeviceError> {
        buffers.get(id.0).ok_or(DeviceError::UnknownBuffer(id))
    }

    fn pipeline(&self, name: &str) -> Result<&wgpu::ComputePipeline, DeviceError> {
        self.pipelines.get(name).ok_or_else(|| {
            DeviceError::Shader(ShaderError::NotLoaded {
                name: name.to_string(),
            })
        })
    }

    /// Record one compute dispatch of `pass`.
    fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        name: &str,
        uniform: Option<wgpu::Buffer>,
        storage: &[&wgpu::Buffer],
        groups: (u32, u32),
    ) -> Result<(), DeviceError> {
        let pipeline = self.pipeline(name)?;
        let mut entries = Vec::with_capacity(storage.len() + 1);
        if let Some(uniform) = &uniform {
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            });
        }
        for (i, buffer) in storage.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: buffer.as_entire_binding(),
            });
        }

        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(name),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &entries,
            });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(name),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups.0.max(1), groups.1.max(1), 1);
        Ok(())
    }

    fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        buffers: &[DeviceBuffer],
        pass: &ComputePass,
    ) -> Result<(), DeviceError> {
        let allocator = StorageAllocator::new(&self.context.device);
        let name = pass.kernel_name();
        let get = move |id: BufferId| Self::lookup(buffers, id).map(|b| &b.buffer);
        let linear = |count: u32| (count.div_ceil(LINEAR_GROUP), 1);
        let tiles = |w: u32, h: u32| (w.div_ceil(TILE_GROUP), h.div_ceil(TILE_GROUP));

        match pass {
            ComputePass::Droplets {
                uniforms,
                height,
                accum,
                origins,
                offsets,
                brush,
            } => self.dispatch(
                encoder,
                name,
                Some(allocator.create_uniform(name, uniforms)),
                &[get(*height)?, get(*accum)?, get(*origins)?, get(*offsets)?, get(*brush)?],
                (uniforms.lanes.div_ceil(DROPLET_GROUP), 1),
            ),
            ComputePass::ApplyDelta {
                uniforms,
                accum,
                target,
            } => self.dispatch(
                encoder,
                name,
                Some(allocator.create_uniform(name, uniforms)),
                &[get(*accum)?, get(*target)?],
                linear(uniforms.count),
            ),
            ComputePass::Clear { buffer } => {
                encoder.clear_buffer(get(*buffer)?, 0, None);
                Ok(())
            }
            ComputePass::Copy {
                source,
                destination,
            } => {
                let src = Self::lookup(buffers, *source)?;
                let dst = Self::lookup(buffers, *destination)?;
                if src.words != dst.words {
                    return Err(DeviceError::SizeMismatch {
                        id: *destination,
                        capacity: dst.words,
                        actual: src.words,
                    });
                }
                if src.words > 0 {
                    encoder.copy_buffer_to_buffer(
                        &src.buffer,
                        0,
                        &dst.buffer,
                        0,
                        src.words as u64 * WORD_SIZE,
                    );
                }
                Ok(())
            }
            ComputePass::Thermal {
                uniforms,
                source,
                destination,
            } => self.dispatch(
                encoder,
                name,
                Some(allocator.create_uniform(name, uniforms)),
                &[
                    get(source.bedrock)?,
                    get(source.sediment)?,
                    get(destination.bedrock)?,
                    get(destination.sediment)?,
                ],
                tiles(uniforms.width, uniforms.height),
            ),
            ComputePass::Combine {
                uniforms,
                layers,
                target,
            } => self.dispatch(
                encoder,
                name,
                Some(allocator.create_uniform(name, uniforms)),
                &[get(layers.bedrock)?, get(layers.sediment)?, get(*target)?],
                linear(uniforms.count),
            ),
            ComputePass::ResetRange { range } => {
                self.dispatch(encoder, name, None, &[get(*range)?], (1, 1))
            }
            ComputePass::ReduceRange {
                uniforms,
                source,
                range,
            } => self.dispatch(
                encoder,
                name,
                Some(allocator.create_uniform(name, uniforms)),
                &[get(*source)?, get(*range)?],
                linear(uniforms.count),
            ),
            ComputePass::Blur {
                uniforms,
                source,
                destination,
            } => self.dispatch(
                encoder,
                name,
                Some(allocator.create_uniform(name, uniforms)),
                &[get(*source)?, get(*destination)?],
                tiles(uniforms.width, uniforms.height),
            ),
        }
    }
}

impl ComputeDevice for WgpuDevice {
    fn create_buffer(&self, label: &str, words: usize) -> Result<BufferId, DeviceError> {
        let buffer = StorageAllocator::new(&self.context.device).create_storage(label, words);
        let mut buffers = self.buffers.write().unwrap_or_else(PoisonError::into_inner);
        buffers.push(DeviceBuffer { buffer, words });
        Ok(BufferId(buffers.len() - 1))
    }

    fn write_buffer(&self, id: BufferId, data: &[u32]) -> Result<(), DeviceError> {
        let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        let target = Self::lookup(&buffers, id)?;
        if target.words != data.len() {
            return Err(DeviceError::SizeMismatch {
                id,
                capacity: target.words,
                actual: data.len(),
            });
        }
        if !data.is_empty() {
            self.context
                .queue
                .write_buffer(&target.buffer, 0, bytemuck::cast_slice(data));
        }
        Ok(())
    }

    fn buffer_len(&self, id: BufferId) -> Result<usize, DeviceError> {
        let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(Self::lookup(&buffers, id)?.words)
    }

    fn submit(&self, passes: &[ComputePass]) -> Result<(), DeviceError> {
        let index = self.submissions.fetch_add(1, Ordering::AcqRel) + 1;
        let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("erosion-submission"),
                });
        for pass in passes {
            self.encode(&mut encoder, &buffers, pass).inspect_err(|e| {
                log::error!("Encoding pass '{}' failed: {}", pass.kernel_name(), e);
            })?;
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));

        log::trace!("GPU submission #{} with {} passes", index, passes.len());
        Ok(())
    }

    fn read_buffer(
        &self,
        id: BufferId,
    ) -> impl Future<Output = Result<Vec<u32>, DeviceError>> + Send {
        let pending = {
            let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
            Self::lookup(&buffers, id).map(|source| {
                PendingReadback::encode(
                    &self.context.device,
                    &self.context.queue,
                    &source.buffer,
                    source.words,
                )
            })
        };
        async move { Ok(pending?.resolve(&self.context.device).await?) }
    }

    fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cpu_device::CpuDevice;
    use crate::droplets::DropletTables;
    use crate::fixed::decode_ordered;
    use crate::height_field::HeightFieldBuffer;
    use crate::hydraulic::HydraulicErosionSimulator;
    use crate::kernels::{BlurUniforms, GridUniforms};
    use crate::params::ErosionParameters;
    use crate::thermal::ThermalErosionSimulator;

    fn test_device() -> Option<WgpuDevice> {
        pollster::block_on(WgpuDevice::headless()).ok()
    }

    fn floats(values: &[f32]) -> Vec<u32> {
        values.iter().map(|v| v.to_bits()).collect()
    }

    #[test]
    fn test_every_kernel_has_source() {
        for (name, source) in KERNELS {
            assert!(source.contains("fn main"), "{name} has no entry point");
        }
    }

    #[test]
    fn test_range_reduce_matches_known_bounds() {
        let Some(device) = test_device() else {
            return;
        };
        let layout = TerrainLayout::new(64, 32, 4, 1.0).unwrap();
        let mut values: Vec<f32> = (0..layout.texels()).map(|i| (i % 37) as f32).collect();
        values[100] = -5.0;
        values[1500] = 42.0;

        let source = device.create_buffer_init("values", &floats(&values)).unwrap();
        let range = device.create_buffer("range", 2).unwrap();
        device
            .submit(&[
                ComputePass::ResetRange { range },
                ComputePass::ReduceRange {
                    uniforms: GridUniforms::new(&layout),
                    source,
                    range,
                },
            ])
            .unwrap();

        let words = pollster::block_on(device.read_buffer(range)).unwrap();
        assert_eq!(decode_ordered(words[0] as i32), -5.0);
        assert_eq!(decode_ordered(words[1] as i32), 42.0);
    }

    #[test]
    fn test_blur_matches_cpu_reference() {
        let Some((gpu, cpu)) = backends() else {
            return;
        };
        let layout = TerrainLayout::square(16, 4, 1.0).unwrap();
        let values: Vec<f32> = (0..layout.texels()).map(|i| ((i * 7) % 11) as f32).collect();

        let results: Vec<_> = [&gpu as &dyn ParityHarness, &cpu as &dyn ParityHarness]
            .iter()
            .map(|device| device.blur(&layout, &values))
            .collect();
        for (a, b) in results[0].iter().zip(&results[1]) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn test_droplets_match_cpu_reference() {
        let Some((gpu, cpu)) = backends() else {
            return;
        };
        let layout = TerrainLayout::square(32, 4, 32.0).unwrap();
        let field = slope(&layout);
        let params = ErosionParameters {
            erosion_iterations: 2,
            max_lifetime: 8,
            brush_radius: 2,
            ..Default::default()
        };

        let results: Vec<_> = [&gpu as &dyn ParityHarness, &cpu as &dyn ParityHarness]
            .iter()
            .map(|device| device.erode(layout, &field, &params))
            .collect();
        let (gpu_field, cpu_field) = (&results[0], &results[1]);
        assert_ne!(*cpu_field, field, "slope should erode");
        assert!((gpu_field.total() - cpu_field.total()).abs() < 1e-2);

        let diffs: Vec<f32> = gpu_field
            .values()
            .iter()
            .zip(cpu_field.values())
            .map(|(a, b)| (a - b).abs())
            .collect();
        let close = diffs.iter().filter(|&&d| d < 1e-3).count();
        assert!(diffs.iter().all(|&d| d < 0.1), "max diff {:?}", diffs.iter().cloned().fold(0.0, f32::max));
        assert!(close * 20 >= diffs.len() * 19, "{close} of {} cells agree", diffs.len());
    }

    #[test]
    fn test_thermal_matches_cpu_reference() {
        let Some((gpu, cpu)) = backends() else {
            return;
        };
        let layout = TerrainLayout::square(32, 4, 32.0).unwrap();
        let values: Vec<f32> = (0..layout.texels())
            .map(|i| if (i % 32) / 8 % 2 == 0 { 0.0 } else { 6.0 })
            .collect();
        let field = HeightField::new(32, 32, values).unwrap();

        for iterations in [1, 2, 5] {
            let params = ErosionParameters {
                thermal_iterations: iterations,
                thermal_border_min: 0.0,
                thermal_border_range: 1.0,
                ..Default::default()
            };
            let results: Vec<_> = [&gpu as &dyn ParityHarness, &cpu as &dyn ParityHarness]
                .iter()
                .map(|device| device.relax(layout, &field, &params))
                .collect();
            let (gpu_out, cpu_out) = (&results[0], &results[1]);
            assert_ne!(cpu_out.0, field);
            assert!((gpu_out.0.total() - cpu_out.0.total()).abs() < 1e-2);
            for (a, b) in gpu_out.0.values().iter().zip(cpu_out.0.values()) {
                assert!((a - b).abs() < 1e-3, "k={iterations}: {a} vs {b}");
            }
            for (a, b) in gpu_out.1.values().iter().zip(cpu_out.1.values()) {
                assert!((a - b).abs() < 1e-3, "k={iterations} sediment: {a} vs {b}");
            }
        }
    }

    fn backends() -> Option<(Arc<WgpuDevice>, Arc<CpuDevice>)> {
        let gpu = test_device()?;
        Some((Arc::new(gpu), Arc::new(CpuDevice::with_workers(4))))
    }

    fn slope(layout: &TerrainLayout) -> HeightField {
        let width = layout.width();
        let values = (0..layout.texels() as u32)
            .map(|i| {
                let x = (i % width) as f32;
                let y = (i / width) as f32;
                30.0 - 0.3 * x - 0.2 * y + (y * 0.5).sin()
            })
            .collect();
        HeightField::from_layout(layout, values)
    }

    /// Runs the same work on either backend for side-by-side comparison.
    trait ParityHarness {
        fn blur(&self, layout: &TerrainLayout, values: &[f32]) -> Vec<f32>;

        fn erode(
            &self,
            layout: TerrainLayout,
            field: &HeightField,
            params: &ErosionParameters,
        ) -> HeightField;

        /// Thermal result and its sediment layer.
        fn relax(
            &self,
            layout: TerrainLayout,
            field: &HeightField,
            params: &ErosionParameters,
        ) -> (HeightField, HeightField);
    }

    impl<D: ComputeDevice> ParityHarness for Arc<D> {
        fn blur(&self, layout: &TerrainLayout, values: &[f32]) -> Vec<f32> {
            let source = self.create_buffer_init("source", &floats(values)).unwrap();
            let destination = self.create_buffer("destination", values.len()).unwrap();
            self.submit(&[ComputePass::Blur {
                uniforms: BlurUniforms::new(layout),
                source,
                destination,
            }])
            .unwrap();
            pollster::block_on(self.read_f32(destination)).unwrap()
        }

        fn erode(
            &self,
            layout: TerrainLayout,
            field: &HeightField,
            params: &ErosionParameters,
        ) -> HeightField {
            let tables = Arc::new(DropletTables::upload(&**self, layout).unwrap());
            let sim = HydraulicErosionSimulator::new(Arc::clone(self), tables, 21).unwrap();
            let buffer = HeightFieldBuffer::new(&**self, "height", layout).unwrap();
            buffer.upload(&**self, field.clone()).unwrap();
            pollster::block_on(sim.run(&buffer, params)).unwrap();
            buffer.snapshot()
        }

        fn relax(
            &self,
            layout: TerrainLayout,
            field: &HeightField,
            params: &ErosionParameters,
        ) -> (HeightField, HeightField) {
            let sim = ThermalErosionSimulator::new(Arc::clone(self), layout).unwrap();
            let buffer = HeightFieldBuffer::new(&**self, "height", layout).unwrap();
            buffer.upload(&**self, field.clone()).unwrap();
            pollster::block_on(sim.run(&buffer, params)).unwrap();
            (buffer.snapshot(), sim.sediment_field())
        }
    }
}
