//! Compute shader module loading and caching.

use std::{collections::HashMap, sync::Arc};

use log::{debug, info};
use thiserror::Error;
use wgpu::{ShaderModuleDescriptor, ShaderSource};

/// Error types for shader lookups.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader '{name}' not found in library")]
    NotLoaded { name: String },
}

/// Central registry of compiled shader modules, keyed by kernel name.
pub struct ShaderLibrary {
    modules: HashMap<String, Arc<wgpu::ShaderModule>>,
}

impl ShaderLibrary {
    /// Create a new empty shader library.
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Compile a WGSL source string and cache it under `name`, replacing any
    /// previous module with that name.
    pub fn load_from_source(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        source: &str,
    ) -> Arc<wgpu::ShaderModule> {
        debug!("Compiling shader '{}'", name);

        let module = Arc::new(device.create_shader_module(ShaderModuleDescriptor {
            label: Some(name),
            source: ShaderSource::Wgsl(source.into()),
        }));

        if self
            .modules
            .insert(name.to_string(), Arc::clone(&module))
            .is_some()
        {
            info!("Replaced shader '{}'", name);
        } else {
            info!("Loaded shader '{}'", name);
        }

        module
    }

    /// Get a previously loaded shader by name.
    pub fn get(&self, name: &str) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| ShaderError::NotLoaded {
                name: name.to_string(),
            })
    }

    /// Number of loaded shaders.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the shader library is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}
