//! Headless wgpu plumbing for compute-driven terrain simulation: device
//! acquisition, shader caching, storage buffers, staged readback and the
//! displacement texture mirror handed to the renderer.

pub mod buffer;
pub mod context;
pub mod readback;
pub mod shader;
pub mod texture;

pub use buffer::{STORAGE_USAGE, StorageAllocator, WORD_SIZE};
pub use context::{GpuContext, GpuContextError};
pub use readback::{PendingReadback, ReadbackError};
pub use shader::{ShaderError, ShaderLibrary};
pub use texture::{DisplacementTexture, TextureError};
