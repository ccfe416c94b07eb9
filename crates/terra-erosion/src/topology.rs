//! Initial terrain from fractal Brownian motion over simplex noise.

use noise::{NoiseFn, Simplex};

use crate::error::ConfigurationError;
use crate::fixed::max_representable_span;
use crate::height_field::HeightField;
use crate::layout::TerrainLayout;

/// fBm settings, sampled in height-field cell coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct TopologyParams {
    pub seed: u64,
    /// Octaves composited per sample.
    pub octaves: u32,
    /// Frequency of the first octave in cycles per cell.
    pub base_frequency: f64,
    /// Amplitude of the first octave.
    pub amplitude: f64,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
}

impl Default for TopologyParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 6,
            base_frequency: 0.008,
            amplitude: 40.0,
            lacunarity: 2.0,
            persistence: 0.5,
        }
    }
}

impl TopologyParams {
    /// Largest possible `|sample|`, the geometric sum of octave amplitudes.
    pub fn max_amplitude(&self) -> f64 {
        (0..self.octaves)
            .map(|i| self.amplitude * self.persistence.powi(i as i32))
            .sum()
    }

    /// Reject settings whose terrain could exceed the span hydraulic erosion
    /// can accumulate.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let span = 2.0 * self.max_amplitude().abs();
        if span.is_finite() && span <= f64::from(max_representable_span()) {
            Ok(())
        } else {
            Err(ConfigurationError::SpanTooLarge {
                span: span as f32,
                max: max_representable_span(),
            })
        }
    }
}

pub struct TopologyGenerator {
    noise: Simplex,
    params: TopologyParams,
}

impl TopologyGenerator {
    pub fn new(params: TopologyParams) -> Self {
        Self {
            noise: Simplex::new(params.seed as u32),
            params,
        }
    }

    pub fn params(&self) -> &TopologyParams {
        &self.params
    }

    /// Height at cell coordinate `(x, y)`.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;
        for _ in 0..self.params.octaves {
            total += self.noise.get([x * frequency, y * frequency]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }
        total
    }

    pub fn max_amplitude(&self) -> f64 {
        self.params.max_amplitude()
    }

    /// Sample every cell of `layout`.
    pub fn generate(&self, layout: &TerrainLayout) -> HeightField {
        let values = (0..layout.height())
            .flat_map(|y| (0..layout.width()).map(move |x| (x, y)))
            .map(|(x, y)| self.sample(x as f64, y as f64) as f32)
            .collect();
        HeightField::from_layout(layout, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_field() {
        let layout = TerrainLayout::square(32, 4, 32.0).unwrap();
        let params = TopologyParams {
            seed: 42,
            ..Default::default()
        };
        let a = TopologyGenerator::new(params.clone()).generate(&layout);
        let b = TopologyGenerator::new(params).generate(&layout);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_differ() {
        let layout = TerrainLayout::square(32, 4, 32.0).unwrap();
        let a = TopologyGenerator::new(TopologyParams {
            seed: 1,
            ..Default::default()
        })
        .generate(&layout);
        let b = TopologyGenerator::new(TopologyParams {
            seed: 999,
            ..Default::default()
        })
        .generate(&layout);
        assert_ne!(a, b);
    }

    #[test]
    fn test_values_within_amplitude() {
        let layout = TerrainLayout::square(64, 4, 64.0).unwrap();
        let generator = TopologyGenerator::new(TopologyParams::default());
        let limit = generator.max_amplitude() as f32 + 1e-3;
        let field = generator.generate(&layout);
        assert_eq!(field.values().len(), layout.texels());
        assert!(field.values().iter().all(|v| v.is_finite() && v.abs() <= limit));
    }

    #[test]
    fn test_validate_rejects_unrepresentable_amplitude() {
        assert!(TopologyParams::default().validate().is_ok());
        let params = TopologyParams {
            amplitude: 1.0e7,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigurationError::SpanTooLarge { .. })
        ));
    }

    #[test]
    fn test_zero_octaves_is_flat() {
        let layout = TerrainLayout::square(8, 2, 8.0).unwrap();
        let generator = TopologyGenerator::new(TopologyParams {
            octaves: 0,
            ..Default::default()
        });
        assert_eq!(generator.generate(&layout), HeightField::flat(8, 8, 0.0));
    }
}
