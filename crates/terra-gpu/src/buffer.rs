//! Storage and uniform buffer allocation for compute kernels.
//!
//! Every simulation buffer is a flat array of 32-bit words so heights (`f32`),
//! fixed-point accumulators (`i32`) and indices (`u32`) share one allocation path.

use wgpu::util::DeviceExt;

/// Bytes per buffer word.
pub const WORD_SIZE: u64 = 4;

/// Usage shared by all simulation storage buffers: bound as storage, filled
/// from the host, copied to staging for readback and to textures for display.
pub const STORAGE_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

/// GPU buffer allocator for compute storage and uniforms.
pub struct StorageAllocator<'a> {
    device: &'a wgpu::Device,
}

impl<'a> StorageAllocator<'a> {
    /// Create a new allocator with the given device.
    pub fn new(device: &'a wgpu::Device) -> Self {
        Self { device }
    }

    /// Byte size backing `words` words. Zero-length buffers cannot be bound,
    /// so at least one word is always allocated.
    pub fn byte_size(words: usize) -> u64 {
        words.max(1) as u64 * WORD_SIZE
    }

    /// Create a zero-initialised storage buffer of `words` words.
    pub fn create_storage(&self, label: &str, words: usize) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: Self::byte_size(words),
            usage: STORAGE_USAGE,
            mapped_at_creation: false,
        })
    }

    /// Create a uniform buffer from a `Pod` parameter block.
    pub fn create_uniform<T: bytemuck::Pod>(&self, label: &str, value: &T) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(value),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    /// Create a host-mappable staging buffer for readback.
    pub fn create_staging(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        })
    }
}

#[cfg(test)]
pub(crate) fn create_test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;

        adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: Default::default(),
                ..Default::default()
            })
            .await
            .ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_never_zero() {
        assert_eq!(StorageAllocator::byte_size(0), 4);
        assert_eq!(StorageAllocator::byte_size(1), 4);
        assert_eq!(StorageAllocator::byte_size(256), 1024);
    }

    #[test]
    fn test_storage_usage_flags() {
        assert!(STORAGE_USAGE.contains(wgpu::BufferUsages::STORAGE));
        assert!(STORAGE_USAGE.contains(wgpu::BufferUsages::COPY_SRC));
        assert!(STORAGE_USAGE.contains(wgpu::BufferUsages::COPY_DST));
        assert!(!STORAGE_USAGE.contains(wgpu::BufferUsages::MAP_READ));
    }

    #[test]
    fn test_storage_buffer_creation() {
        let Some((device, _queue)) = create_test_device() else {
            return;
        };
        let allocator = StorageAllocator::new(&device);

        let buffer = allocator.create_storage("heights", 64 * 64);
        assert_eq!(buffer.size(), 64 * 64 * 4);

        let empty = allocator.create_storage("empty", 0);
        assert_eq!(empty.size(), 4);
    }

    #[test]
    fn test_staging_buffer_is_mappable() {
        let Some((device, _queue)) = create_test_device() else {
            return;
        };
        let staging = StorageAllocator::new(&device).create_staging("staging", 32);
        assert!(staging.usage().contains(wgpu::BufferUsages::MAP_READ));
    }
}
