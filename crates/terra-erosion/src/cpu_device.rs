//! Host-memory reference backend.
//!
//! Executes every [`ComputePass`] with the step functions in [`crate::kernels`].
//! Droplet lanes are spread over scoped worker threads and accumulate through
//! `AtomicI32`, so overlapping brush footprints race exactly like they do on
//! the GPU and still produce the same integer sums.

use std::future::Future;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::brush::ErosionBrush;
use crate::device::{BufferId, ComputeDevice, ComputePass};
use crate::error::DeviceError;
use crate::kernels::{blur, droplet, grid, thermal};

struct HostBuffer {
    label: String,
    words: Vec<u32>,
}

/// Reference [`ComputeDevice`] running on the CPU.
pub struct CpuDevice {
    buffers: Mutex<Vec<HostBuffer>>,
    workers: usize,
    submissions: AtomicU64,
}

impl CpuDevice {
    /// Device using one worker per logical CPU.
    pub fn new() -> Self {
        Self::with_workers(0)
    }

    /// Device with a fixed worker count; `0` means one per logical CPU.
    pub fn with_workers(workers: usize) -> Self {
        let workers = if workers == 0 {
            num_cpus::get()
        } else {
            workers
        };
        log::debug!("CPU compute device with {} workers", workers);
        Self {
            buffers: Mutex::new(Vec::new()),
            workers: workers.max(1),
            submissions: AtomicU64::new(0),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HostBuffer>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn execute(&self, buffers: &mut [HostBuffer], pass: &ComputePass) -> Result<(), DeviceError> {
        match pass {
            ComputePass::Droplets {
                uniforms,
                height,
                accum,
                origins,
                offsets,
                brush,
            } => {
                let texels = uniforms.width as usize * uniforms.height as usize;
                let lanes = uniforms.lanes as usize;
                let height: Vec<f32> = words(buffers, *height, texels)?
                    .iter()
                    .map(|w| f32::from_bits(*w))
                    .collect();
                let origins = words(buffers, *origins, lanes)?.to_vec();
                let offsets =
                    words(buffers, *offsets, (uniforms.offset_base as usize + lanes) * 2)?.to_vec();
                let brush_words = words(
                    buffers,
                    *brush,
                    uniforms.brush_len as usize * ErosionBrush::TAP_WORDS,
                )?;
                let taps: Vec<_> = (0..uniforms.brush_len as usize)
                    .map(|i| ErosionBrush::tap_from_words(brush_words, i))
                    .collect();

                let target = words_mut(buffers, *accum, texels)?;
                let atoms: Vec<AtomicI32> =
                    target.iter().map(|w| AtomicI32::new(*w as i32)).collect();
                self.run_lanes(lanes, |lane| {
                    droplet::simulate_lane(
                        uniforms, &height, &origins, &offsets, &taps, lane,
                        |i, q| {
                            atoms[i].fetch_add(q, Ordering::Relaxed);
                        },
                    );
                })?;
                for (word, atom) in target.iter_mut().zip(atoms) {
                    *word = atom.into_inner() as u32;
                }
            }
            ComputePass::ApplyDelta {
                uniforms,
                accum,
                target,
            } => {
                let count = uniforms.count as usize;
                let mut acc = std::mem::take(words_mut(buffers, *accum, count)?);
                let result =
                    words_mut(buffers, *target, count).map(|t| grid::apply_delta(uniforms, &mut acc, t));
                *words_mut(buffers, *accum, 0)? = acc;
                result?;
            }
            ComputePass::Clear { buffer } => {
                words_mut(buffers, *buffer, 0)?.fill(0);
            }
            ComputePass::Copy {
                source,
                destination,
            } => {
                let data = words(buffers, *source, 0)?.to_vec();
                let target = words_mut(buffers, *destination, 0)?;
                if target.len() != data.len() {
                    return Err(DeviceError::SizeMismatch {
                        id: *destination,
                        capacity: target.len(),
                        actual: data.len(),
                    });
                }
                target.copy_from_slice(&data);
            }
            ComputePass::Thermal {
                uniforms,
                source,
                destination,
            } => {
                let texels = uniforms.width as usize * uniforms.height as usize;
                let bedrock = words(buffers, source.bedrock, texels)?.to_vec();
                let sediment = words(buffers, source.sediment, texels)?.to_vec();
                let mut bedrock_out = std::mem::take(words_mut(buffers, destination.bedrock, texels)?);
                let result = words_mut(buffers, destination.sediment, texels).map(|sediment_out| {
                    thermal::thermal_step(uniforms, &bedrock, &sediment, &mut bedrock_out, sediment_out)
                });
                *words_mut(buffers, destination.bedrock, 0)? = bedrock_out;
                result?;
            }
            ComputePass::Combine {
                uniforms,
                layers,
                target,
            } => {
                let count = uniforms.count as usize;
                let bedrock = words(buffers, layers.bedrock, count)?.to_vec();
                let sediment = words(buffers, layers.sediment, count)?.to_vec();
                grid::combine(uniforms, &bedrock, &sediment, words_mut(buffers, *target, count)?);
            }
            ComputePass::ResetRange { range } => {
                grid::reset_range(words_mut(buffers, *range, 2)?);
            }
            ComputePass::ReduceRange {
                uniforms,
                source,
                range,
            } => {
                let data = words(buffers, *source, uniforms.count as usize)?.to_vec();
                grid::reduce_range(uniforms, &data, words_mut(buffers, *range, 2)?);
            }
            ComputePass::Blur {
                uniforms,
                source,
                destination,
            } => {
                let texels = uniforms.width as usize * uniforms.height as usize;
                let data = words(buffers, *source, texels)?.to_vec();
                blur::blur(uniforms, &data, words_mut(buffers, *destination, texels)?);
            }
        }
        Ok(())
    }

    /// Run `lane` for `0..lanes` split into contiguous chunks across workers.
    fn run_lanes(&self, lanes: usize, lane: impl Fn(usize) + Sync) -> Result<(), DeviceError> {
        if lanes == 0 {
            return Ok(());
        }
        let chunk = lanes.div_ceil(self.workers);
        let lane = &lane;
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..lanes)
                .step_by(chunk)
                .map(|start| {
                    let end = (start + chunk).min(lanes);
                    scope.spawn(move || (start..end).for_each(lane))
                })
                .collect();
            handles.into_iter().try_for_each(|handle| {
                handle
                    .join()
                    .map_err(|_| DeviceError::Worker("droplet lane panicked".to_string()))
            })
        })
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrow a buffer, requiring at least `min_len` words.
fn words(buffers: &[HostBuffer], id: BufferId, min_len: usize) -> Result<&[u32], DeviceError> {
    let buffer = buffers.get(id.0).ok_or(DeviceError::UnknownBuffer(id))?;
    if buffer.words.len() < min_len {
        return Err(DeviceError::SizeMismatch {
            id,
            capacity: buffer.words.len(),
            actual: min_len,
        });
    }
    Ok(&buffer.words)
}

/// Mutably borrow a buffer, requiring at least `min_len` words.
fn words_mut(
    buffers: &mut [HostBuffer],
    id: BufferId,
    min_len: usize,
) -> Result<&mut Vec<u32>, DeviceError> {
    let buffer = buffers.get_mut(id.0).ok_or(DeviceError::UnknownBuffer(id))?;
    if buffer.words.len() < min_len {
        return Err(DeviceError::SizeMismatch {
            id,
            capacity: buffer.words.len(),
            actual: min_len,
        });
    }
    Ok(&mut buffer.words)
}

impl ComputeDevice for CpuDevice {
    fn create_buffer(&self, label: &str, words: usize) -> Result<BufferId, DeviceError> {
        let mut buffers = self.lock();
        buffers.push(HostBuffer {
            label: label.to_string(),
            words: vec![0; words],
        });
        Ok(BufferId(buffers.len() - 1))
    }

    fn write_buffer(&self, id: BufferId, data: &[u32]) -> Result<(), DeviceError> {
        let mut buffers = self.lock();
        let target = words_mut(&mut buffers, id, 0)?;
        if target.len() != data.len() {
            return Err(DeviceError::SizeMismatch {
                id,
                capacity: target.len(),
                actual: data.len(),
            });
        }
        target.copy_from_slice(data);
        Ok(())
    }

    fn buffer_len(&self, id: BufferId) -> Result<usize, DeviceError> {
        Ok(words(&self.lock(), id, 0)?.len())
    }

    fn submit(&self, passes: &[ComputePass]) -> Result<(), DeviceError> {
        let index = self.submissions.fetch_add(1, Ordering::AcqRel) + 1;
        let mut buffers = self.lock();
        for pass in passes {
            self.execute(&mut buffers, pass).inspect_err(|e| {
                log::error!("CPU pass '{}' failed: {}", pass.kernel_name(), e);
            })?;
        }
        log::trace!("CPU submission #{} ran {} passes", index, passes.len());
        Ok(())
    }

    fn read_buffer(
        &self,
        id: BufferId,
    ) -> impl Future<Output = Result<Vec<u32>, DeviceError>> + Send {
        let result = {
            let buffers = self.lock();
            words(&buffers, id, 0).map(|w| {
                log::trace!("Read back '{}'", buffers[id.0].label);
                w.to_vec()
            })
        };
        std::future::ready(result)
    }

    fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{EROSION_SCALE, decode_ordered, quantize};
    use crate::kernels::{ApplyUniforms, GridUniforms};
    use crate::layout::TerrainLayout;

    fn floats(values: &[f32]) -> Vec<u32> {
        values.iter().map(|v| v.to_bits()).collect()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let device = CpuDevice::with_workers(2);
        let id = device.create_buffer_init("data", &[1, 2, 3]).unwrap();
        assert_eq!(device.read_buffer(id).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(device.buffer_len(id).unwrap(), 3);
    }

    #[test]
    fn test_write_size_mismatch() {
        let device = CpuDevice::new();
        let id = device.create_buffer("data", 4).unwrap();
        assert!(matches!(
            device.write_buffer(id, &[1, 2]),
            Err(DeviceError::SizeMismatch { capacity: 4, actual: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_buffer() {
        let device = CpuDevice::new();
        assert!(matches!(
            device.submit(&[ComputePass::Clear { buffer: BufferId(9) }]),
            Err(DeviceError::UnknownBuffer(BufferId(9)))
        ));
    }

    #[tokio::test]
    async fn test_submission_counter_and_pass_order() {
        let device = CpuDevice::new();
        let layout = TerrainLayout::new(2, 2, 1, 1.0).unwrap();
        let accum = device
            .create_buffer_init("accum", &[quantize(1.5, EROSION_SCALE) as u32; 4])
            .unwrap();
        let field = device.create_buffer_init("field", &floats(&[1.0; 4])).unwrap();
        let copy = device.create_buffer("copy", 4).unwrap();
        let range = device.create_buffer("range", 2).unwrap();

        device
            .submit(&[
                ComputePass::ApplyDelta {
                    uniforms: ApplyUniforms::new(4, EROSION_SCALE),
                    accum,
                    target: field,
                },
                ComputePass::Copy {
                    source: field,
                    destination: copy,
                },
                ComputePass::ResetRange { range },
                ComputePass::ReduceRange {
                    uniforms: GridUniforms::new(&layout),
                    source: copy,
                    range,
                },
            ])
            .unwrap();
        assert_eq!(device.submissions(), 1);

        assert_eq!(device.read_f32(copy).await.unwrap(), vec![2.5; 4]);
        assert_eq!(device.read_buffer(accum).await.unwrap(), vec![0; 4]);
        let range = device.read_buffer(range).await.unwrap();
        assert_eq!(decode_ordered(range[0] as i32), 2.5);
        assert_eq!(decode_ordered(range[1] as i32), 2.5);
    }

    #[test]
    fn test_run_lanes_visits_every_lane_once() {
        let device = CpuDevice::with_workers(3);
        let hits: Vec<AtomicI32> = (0..10).map(|_| AtomicI32::new(0)).collect();
        device
            .run_lanes(10, |lane| {
                hits[lane].fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }
}
