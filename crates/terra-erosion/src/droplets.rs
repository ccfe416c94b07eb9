//! Immutable droplet placement tables uploaded once per resolution.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use glam::Vec2;

use crate::brush::ErosionBrush;
use crate::device::{BufferId, ComputeDevice};
use crate::error::DeviceError;
use crate::layout::TerrainLayout;
use crate::sampler::DropletOriginSampler;

/// Lane -> texel index of the lane's droplet cell origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropletOriginSet {
    origins: Vec<u32>,
}

impl DropletOriginSet {
    pub fn new(layout: &TerrainLayout) -> Self {
        let cell = layout.droplet_cell_size();
        let mut origins = Vec::with_capacity(layout.lanes());
        for cy in 0..layout.cells_y() {
            for cx in 0..layout.cells_x() {
                origins.push(layout.index(cx * cell, cy * cell) as u32);
            }
        }
        Self { origins }
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.origins
    }

    /// Buffer words, one per lane.
    pub fn to_words(&self) -> Vec<u32> {
        self.origins.clone()
    }
}

/// Sub-cell spawn offsets for every (iteration slot, lane) pair.
///
/// Slot `k` lane `l` lives at `k * lanes + l` and uses sampler element
/// `(k + l) mod period`. Each lane therefore walks the whole sampler sequence
/// once per period while neighbouring lanes stay out of phase.
#[derive(Debug, Clone, PartialEq)]
pub struct DropletOffsetSet {
    offsets: Vec<Vec2>,
    lanes: usize,
    period: usize,
}

impl DropletOffsetSet {
    pub fn new(layout: &TerrainLayout) -> Self {
        let lanes = layout.lanes();
        let period = layout.period();
        let sequence =
            DropletOriginSampler::for_cell(layout.droplet_cell_size()).take_positions(period);

        let mut offsets = Vec::with_capacity(period * lanes);
        for slot in 0..period {
            for lane in 0..lanes {
                offsets.push(sequence[(slot + lane) % period]);
            }
        }

        Self {
            offsets,
            lanes,
            period,
        }
    }

    /// Number of distinct iteration slots.
    pub fn period(&self) -> usize {
        self.period
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Offset for `lane` at iteration slot `slot` (wrapped to the period).
    pub fn get(&self, slot: usize, lane: usize) -> Vec2 {
        self.offsets[(slot % self.period) * self.lanes + lane]
    }

    /// Interleaved `x, y` float words.
    pub fn to_words(&self) -> Vec<u32> {
        self.offsets
            .iter()
            .flat_map(|o| [o.x.to_bits(), o.y.to_bits()])
            .collect()
    }
}

/// Device copies of the placement tables plus uploaded brushes by radius.
///
/// Shared by every simulator that dispatches droplets on the same layout.
pub struct DropletTables {
    layout: TerrainLayout,
    origins: BufferId,
    offsets: BufferId,
    brushes: Mutex<HashMap<u32, (BufferId, usize)>>,
}

impl DropletTables {
    pub fn upload<D: ComputeDevice>(device: &D, layout: TerrainLayout) -> Result<Self, DeviceError> {
        let origins = DropletOriginSet::new(&layout);
        let offsets = DropletOffsetSet::new(&layout);
        log::debug!(
            "Uploading droplet tables: {} lanes, period {}",
            origins.len(),
            offsets.period()
        );
        Ok(Self {
            layout,
            origins: device.create_buffer_init("droplet-origins", &origins.to_words())?,
            offsets: device.create_buffer_init("droplet-offsets", &offsets.to_words())?,
            brushes: Mutex::new(HashMap::new()),
        })
    }

    pub fn layout(&self) -> &TerrainLayout {
        &self.layout
    }

    pub fn origins(&self) -> BufferId {
        self.origins
    }

    pub fn offsets(&self) -> BufferId {
        self.offsets
    }

    /// Brush buffer and tap count for `radius`, uploading it on first use.
    pub fn brush<D: ComputeDevice>(
        &self,
        device: &D,
        radius: u32,
    ) -> Result<(BufferId, usize), DeviceError> {
        let mut brushes = self.brushes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = brushes.get(&radius) {
            return Ok(*entry);
        }
        let brush = ErosionBrush::new(radius);
        let id = device.create_buffer_init("erosion-brush", &brush.to_words())?;
        brushes.insert(radius, (id, brush.len()));
        Ok((id, brush.len()))
    }
}
