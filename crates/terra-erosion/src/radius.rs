//! Bounding sphere of the displaced terrain mesh.

use crate::error::ConfigurationError;
use crate::height_field::HeightField;
use crate::range::DisplacementRange;

/// Sphere containing a `width x depth` plane displaced by a [`DisplacementRange`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplacementRadiusEstimator {
    mesh_width: f32,
    mesh_depth: f32,
}

impl DisplacementRadiusEstimator {
    pub fn new(mesh_width: f32, mesh_depth: f32) -> Result<Self, ConfigurationError> {
        for size in [mesh_width, mesh_depth] {
            if !(size.is_finite() && size > 0.0) {
                return Err(ConfigurationError::MeshSize(size));
            }
        }
        Ok(Self {
            mesh_width,
            mesh_depth,
        })
    }

    /// Radius of the box `width x depth x (max - min)` around its centre.
    pub fn radius(&self, range: &DisplacementRange) -> f32 {
        let half_width = self.mesh_width * 0.5;
        let half_depth = self.mesh_depth * 0.5;
        let half_height = range.span() * 0.5;
        (half_width * half_width + half_depth * half_depth + half_height * half_height).sqrt()
    }

    /// Vertical offset of the sphere centre from the undisplaced plane.
    pub fn center_offset(&self, range: &DisplacementRange) -> f32 {
        range.midpoint()
    }

    /// Everything the renderer needs to displace and cull the mesh.
    pub fn source(&self, map: HeightField, range: DisplacementRange) -> DisplacementSource {
        DisplacementSource {
            radius: self.radius(&range),
            center_offset: self.center_offset(&range),
            min: range.min,
            max: range.max,
            map,
        }
    }
}

/// Displacement contract handed to the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementSource {
    pub map: HeightField,
    pub min: f32,
    pub max: f32,
    pub radius: f32,
    pub center_offset: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_range_is_plane_half_diagonal() {
        let estimator = DisplacementRadiusEstimator::new(6.0, 8.0).unwrap();
        let range = DisplacementRange { min: 2.0, max: 2.0 };
        assert_eq!(estimator.radius(&range), 5.0);
        assert_eq!(estimator.center_offset(&range), 2.0);
    }

    #[test]
    fn test_sphere_contains_box_corners() {
        let estimator = DisplacementRadiusEstimator::new(10.0, 10.0).unwrap();
        let range = DisplacementRange { min: -5.0, max: 42.0 };
        let radius = estimator.radius(&range);
        let centre = estimator.center_offset(&range);
        assert_eq!(centre, 18.5);
        for (x, y, z) in [(5.0f32, -5.0f32, 5.0f32), (-5.0, 42.0, -5.0)] {
            let d = (x * x + (y - centre) * (y - centre) + z * z).sqrt();
            assert!(d <= radius + 1e-4);
        }
    }

    #[test]
    fn test_source_carries_range() {
        let estimator = DisplacementRadiusEstimator::new(2.0, 2.0).unwrap();
        let map = HeightField::flat(2, 2, 1.0);
        let source = estimator.source(map.clone(), DisplacementRange { min: 0.0, max: 4.0 });
        assert_eq!(source.map, map);
        assert_eq!((source.min, source.max), (0.0, 4.0));
        assert_eq!(source.center_offset, 2.0);
        assert!((source.radius - 6f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_degenerate_mesh() {
        assert!(DisplacementRadiusEstimator::new(0.0, 1.0).is_err());
        assert!(DisplacementRadiusEstimator::new(1.0, f32::NAN).is_err());
    }
}
