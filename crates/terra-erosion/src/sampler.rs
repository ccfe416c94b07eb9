//! Quad-tree sampler producing deterministic, space-filling sub-cell offsets.
//!
//! Every node holds the four corner points of its quadrants and a rotation
//! index. Each call advances the root rotation and descends into the selected
//! child, so a leaf is only revisited after every other leaf has been visited.

use glam::Vec2;

/// Recursive quad-tree of candidate droplet origins.
#[derive(Debug, Clone)]
pub struct DropletOriginSampler {
    positions: [Vec2; 4],
    children: Option<Box<[DropletOriginSampler; 4]>>,
    index: usize,
}

impl DropletOriginSampler {
    /// Build a sampler over the rectangle `origin .. origin + size`, subdividing
    /// while either side is larger than `min_size`.
    pub fn new(origin: Vec2, size: Vec2, min_size: Vec2) -> Self {
        let half = size * 0.5;
        let positions = [
            origin,
            origin + Vec2::new(half.x, 0.0),
            origin + half,
            origin + Vec2::new(0.0, half.y),
        ];

        let children = (size.x > min_size.x || size.y > min_size.y).then(|| {
            Box::new(positions.map(|corner| Self::new(corner, half, min_size)))
        });

        Self {
            positions,
            children,
            index: 0,
        }
    }

    /// Sampler over a square droplet cell with unit leaves.
    pub fn for_cell(cell_size: u32) -> Self {
        let size = Vec2::splat(cell_size as f32);
        Self::new(Vec2::ZERO, size, Vec2::ONE)
    }

    /// Advance the rotation and return the next position.
    pub fn next_position(&mut self) -> Vec2 {
        self.index = (self.index + 1) % 4;
        match self.children.as_deref_mut() {
            Some(children) => children[self.index].next_position(),
            None => self.positions[self.index],
        }
    }

    /// Take the next `count` positions.
    pub fn take_positions(&mut self, count: usize) -> Vec<Vec2> {
        (0..count).map(|_| self.next_position()).collect()
    }

    /// Depth of the tree below this node.
    pub fn depth(&self) -> u32 {
        self.children
            .as_deref()
            .map_or(0, |children| 1 + children[0].depth())
    }
}
