//! Field dimensions and the droplet grid laid over them.

use crate::error::ConfigurationError;

/// Resolution of the height field plus the droplet cell tiling.
///
/// Every droplet dispatch runs one lane per droplet cell; a lane spawns inside
/// its own cell at an offset chosen by the quad-tree sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainLayout {
    width: u32,
    height: u32,
    droplet_cell_size: u32,
    mesh_size: f32,
}

impl TerrainLayout {
    /// Validate and build a layout.
    pub fn new(
        width: u32,
        height: u32,
        droplet_cell_size: u32,
        mesh_size: f32,
    ) -> Result<Self, ConfigurationError> {
        if width < 2 || height < 2 {
            return Err(ConfigurationError::FieldTooSmall { width, height });
        }
        if !droplet_cell_size.is_power_of_two() {
            return Err(ConfigurationError::CellNotPowerOfTwo(droplet_cell_size));
        }
        if width % droplet_cell_size != 0 || height % droplet_cell_size != 0 {
            return Err(ConfigurationError::CellDoesNotDivide {
                cell: droplet_cell_size,
                width,
                height,
            });
        }
        if !(mesh_size.is_finite() && mesh_size > 0.0) {
            return Err(ConfigurationError::MeshSize(mesh_size));
        }
        Ok(Self {
            width,
            height,
            droplet_cell_size,
            mesh_size,
        })
    }

    /// Square field of `resolution`² texels.
    pub fn square(
        resolution: u32,
        droplet_cell_size: u32,
        mesh_size: f32,
    ) -> Result<Self, ConfigurationError> {
        Self::new(resolution, resolution, droplet_cell_size, mesh_size)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn droplet_cell_size(&self) -> u32 {
        self.droplet_cell_size
    }

    /// Horizontal extent of the rendered plane mesh in world units.
    pub fn mesh_size(&self) -> f32 {
        self.mesh_size
    }

    /// Number of texels.
    pub fn texels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Droplet cells along x.
    pub fn cells_x(&self) -> u32 {
        self.width / self.droplet_cell_size
    }

    /// Droplet cells along y.
    pub fn cells_y(&self) -> u32 {
        self.height / self.droplet_cell_size
    }

    /// Lanes per droplet dispatch (one per droplet cell).
    pub fn lanes(&self) -> usize {
        self.cells_x() as usize * self.cells_y() as usize
    }

    /// Dispatches needed for every lane to visit every sub-cell offset once.
    pub fn period(&self) -> usize {
        self.droplet_cell_size as usize * self.droplet_cell_size as usize
    }

    /// Row-major texel index.
    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Check that a texture descriptor can mirror this field.
    pub fn check_texels(&self, texels: &TexelLayout) -> Result<(), ConfigurationError> {
        if texels.width != self.width
            || texels.height != self.height
            || texels.bytes_per_texel != 4
        {
            return Err(ConfigurationError::TexelLayout {
                width: texels.width,
                height: texels.height,
                bytes_per_texel: texels.bytes_per_texel,
                expected_width: self.width,
                expected_height: self.height,
            });
        }
        Ok(())
    }

    /// Check that a host array covers the field exactly.
    pub fn check_len(&self, what: &'static str, len: usize) -> Result<(), ConfigurationError> {
        if len != self.texels() {
            return Err(ConfigurationError::LengthMismatch {
                what,
                expected: self.texels(),
                actual: len,
            });
        }
        Ok(())
    }
}

/// Texture descriptor handed over by the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexelLayout {
    pub width: u32,
    pub height: u32,
    pub bytes_per_texel: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_and_period_counts() {
        let layout = TerrainLayout::new(256, 128, 4, 100.0).unwrap();
        assert_eq!(layout.cells_x(), 64);
        assert_eq!(layout.cells_y(), 32);
        assert_eq!(layout.lanes(), 2048);
        assert_eq!(layout.period(), 16);
        assert_eq!(layout.lanes() * layout.period(), layout.texels());
    }

    #[test]
    fn test_rejects_non_power_of_two_cell() {
        assert!(matches!(
            TerrainLayout::square(48, 3, 1.0),
            Err(ConfigurationError::CellNotPowerOfTwo(3))
        ));
        assert!(matches!(
            TerrainLayout::square(48, 0, 1.0),
            Err(ConfigurationError::CellNotPowerOfTwo(0))
        ));
    }

    #[test]
    fn test_rejects_indivisible_field() {
        assert!(matches!(
            TerrainLayout::new(20, 16, 8, 1.0),
            Err(ConfigurationError::CellDoesNotDivide { cell: 8, .. })
        ));
    }

    #[test]
    fn test_rejects_tiny_field_and_bad_mesh() {
        assert!(TerrainLayout::square(1, 1, 1.0).is_err());
        assert!(TerrainLayout::square(4, 2, 0.0).is_err());
        assert!(TerrainLayout::square(4, 2, f32::INFINITY).is_err());
    }

    #[test]
    fn test_texel_layout_check() {
        let layout = TerrainLayout::square(64, 4, 64.0).unwrap();
        let good = TexelLayout {
            width: 64,
            height: 64,
            bytes_per_texel: 4,
        };
        assert!(layout.check_texels(&good).is_ok());
        assert!(layout
            .check_texels(&TexelLayout {
                bytes_per_texel: 2,
                ..good
            })
            .is_err());
        assert!(layout
            .check_texels(&TexelLayout { width: 32, ..good })
            .is_err());
    }

    #[test]
    fn test_check_len() {
        let layout = TerrainLayout::square(4, 2, 1.0).unwrap();
        assert!(layout.check_len("heights", 16).is_ok());
        assert!(matches!(
            layout.check_len("heights", 15),
            Err(ConfigurationError::LengthMismatch { expected: 16, actual: 15, .. })
        ));
    }
}
