//! Sampled texture mirror of the height field.
//!
//! The renderer displaces its plane mesh by sampling an `R32Float` texture.
//! [`DisplacementTexture`] owns that texture and refreshes it from the host
//! copy of the height field once a simulation run has published new values.

/// Errors raised when creating or filling a displacement texture.
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    /// Width or height is zero.
    #[error("texture dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },

    /// Host data does not cover the texture exactly.
    #[error("height data has {actual} texels, texture {width}x{height} needs {expected}")]
    DataSizeMismatch {
        actual: usize,
        expected: usize,
        width: u32,
        height: u32,
    },
}

/// A single-channel float texture holding terrain displacement.
pub struct DisplacementTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl DisplacementTexture {
    /// Texel format used for displacement.
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

    /// Bytes per displacement texel.
    pub const BYTES_PER_TEXEL: u32 = 4;

    /// Allocate a displacement texture of the given size.
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self, TextureError> {
        if width == 0 || height == 0 {
            return Err(TextureError::ZeroDimensions { width, height });
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("displacement-map"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            width,
            height,
        })
    }

    /// Width and height in texels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Upload a row-major height field.
    pub fn upload(&self, queue: &wgpu::Queue, heights: &[f32]) -> Result<(), TextureError> {
        let expected = self.width as usize * self.height as usize;
        if heights.len() != expected {
            return Err(TextureError::DataSizeMismatch {
                actual: heights.len(),
                expected,
                width: self.width,
                height: self.height,
            });
        }

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(heights),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * Self::BYTES_PER_TEXEL),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::create_test_device;

    #[test]
    fn test_format_matches_texel_size() {
        assert_eq!(
            DisplacementTexture::FORMAT.block_copy_size(None),
            Some(DisplacementTexture::BYTES_PER_TEXEL)
        );
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let Some((device, _queue)) = create_test_device() else {
            return;
        };
        assert!(matches!(
            DisplacementTexture::new(&device, 0, 16),
            Err(TextureError::ZeroDimensions { .. })
        ));
    }

    #[test]
    fn test_upload_checks_length() {
        let Some((device, queue)) = create_test_device() else {
            return;
        };
        let texture = DisplacementTexture::new(&device, 4, 4).unwrap();
        assert_eq!(texture.dimensions(), (4, 4));
        assert!(texture.upload(&queue, &[0.0; 16]).is_ok());
        assert!(matches!(
            texture.upload(&queue, &[0.0; 15]),
            Err(TextureError::DataSizeMismatch {
                actual: 15,
                expected: 16,
                ..
            })
        ));
    }
}
