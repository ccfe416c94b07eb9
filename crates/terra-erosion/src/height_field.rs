//! Host and device copies of a scalar grid.

use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use crate::device::{BufferId, ComputeDevice};
use crate::error::{ConfigurationError, ErosionError};
use crate::layout::TerrainLayout;

/// Row-major grid of `f32` values.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl HeightField {
    /// Wrap `values`, which must hold exactly `width * height` entries.
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self, ConfigurationError> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(ConfigurationError::LengthMismatch {
                what: "height field",
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// Wrap values generated for every texel of `layout`.
    pub(crate) fn from_layout(layout: &TerrainLayout, values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), layout.texels());
        Self {
            width: layout.width(),
            height: layout.height(),
            values,
        }
    }

    /// Field filled with `value`.
    pub fn flat(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[y as usize * self.width as usize + x as usize]
    }

    /// Sum of all values in `f64`.
    pub fn total(&self) -> f64 {
        self.values.iter().map(|&v| v as f64).sum()
    }

    /// `(min, max)`, or `None` for an empty field.
    pub fn bounds(&self) -> Option<(f32, f32)> {
        self.values.iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    fn to_words(&self) -> Vec<u32> {
        self.values.iter().map(|v| v.to_bits()).collect()
    }
}

/// A device buffer together with the host copy last read back from it.
///
/// Only the owning simulator writes the buffer; readers see the host copy,
/// which is replaced after each completed run.
pub struct HeightFieldBuffer {
    buffer: BufferId,
    layout: TerrainLayout,
    host: RwLock<HeightField>,
}

impl HeightFieldBuffer {
    /// Allocate a zeroed field.
    pub fn new<D: ComputeDevice>(
        device: &D,
        label: &str,
        layout: TerrainLayout,
    ) -> Result<Self, ErosionError> {
        let buffer = device.create_buffer(label, layout.texels())?;
        Ok(Self {
            buffer,
            layout,
            host: RwLock::new(HeightField::flat(layout.width(), layout.height(), 0.0)),
        })
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn layout(&self) -> &TerrainLayout {
        &self.layout
    }

    /// Replace both copies with `field`.
    pub fn upload<D: ComputeDevice>(&self, device: &D, field: HeightField) -> Result<(), ErosionError> {
        if field.width() != self.layout.width() || field.height() != self.layout.height() {
            return Err(ConfigurationError::LengthMismatch {
                what: "uploaded height field",
                expected: self.layout.texels(),
                actual: field.values().len(),
            }
            .into());
        }
        device.write_buffer(self.buffer, &field.to_words())?;
        *self.host.write().unwrap_or_else(PoisonError::into_inner) = field;
        Ok(())
    }

    /// Read the device buffer back and publish it as the host copy.
    pub async fn download<D: ComputeDevice>(&self, device: &D) -> Result<(), ErosionError> {
        let values = device.read_f32(self.buffer).await?;
        self.layout.check_len("downloaded height field", values.len())?;
        let field = HeightField::new(self.layout.width(), self.layout.height(), values)?;
        *self.host.write().unwrap_or_else(PoisonError::into_inner) = field;
        Ok(())
    }

    /// Borrow the host copy.
    pub fn read(&self) -> RwLockReadGuard<'_, HeightField> {
        self.host.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone the host copy.
    pub fn snapshot(&self) -> HeightField {
        self.read().clone()
    }
}
