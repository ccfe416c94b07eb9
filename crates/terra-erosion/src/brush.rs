//! Radially weighted erosion brush and exact fixed-point splatting.

/// One brush tap relative to the droplet's cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushTap {
    pub dx: i32,
    pub dy: i32,
    pub weight: f32,
}

/// Precomputed kernel of radius `r` with weights `1 - d/r`, normalised to 1.
///
/// The centre tap is always first; splats hand it the rounding residual.
#[derive(Debug, Clone, PartialEq)]
pub struct ErosionBrush {
    radius: u32,
    taps: Vec<BrushTap>,
}

impl ErosionBrush {
    /// Words per tap in the uploaded buffer (`dx`, `dy`, weight bits).
    pub const TAP_WORDS: usize = 3;

    pub fn new(radius: u32) -> Self {
        let mut taps = vec![BrushTap {
            dx: 0,
            dy: 0,
            weight: 1.0,
        }];

        if radius > 0 {
            let r = radius as i32;
            let rf = radius as f32;
            for dy in -r..=r {
                for dx in -r..=r {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let distance = ((dx * dx + dy * dy) as f32).sqrt();
                    if distance < rf {
                        taps.push(BrushTap {
                            dx,
                            dy,
                            weight: 1.0 - distance / rf,
                        });
                    }
                }
            }
        }

        let sum: f32 = taps.iter().map(|t| t.weight).sum();
        for tap in &mut taps {
            tap.weight /= sum;
        }

        Self { radius, taps }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn taps(&self) -> &[BrushTap] {
        &self.taps
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Buffer words: `dx`, `dy` as `i32` bits, then the weight bits.
    pub fn to_words(&self) -> Vec<u32> {
        self.taps
            .iter()
            .flat_map(|t| [t.dx as u32, t.dy as u32, t.weight.to_bits()])
            .collect()
    }

    /// Decode a tap from uploaded words.
    pub fn tap_from_words(words: &[u32], tap: usize) -> BrushTap {
        let base = tap * Self::TAP_WORDS;
        BrushTap {
            dx: words[base] as i32,
            dy: words[base + 1] as i32,
            weight: f32::from_bits(words[base + 2]),
        }
    }
}

/// Spread an already quantised `total` over the brush around `centre`.
///
/// Taps outside the `field` (width, height) are dropped and the remaining
/// weights renormalised. Every tap receives `round(total * w / covered)`
/// (ties to even) and the centre tap receives whatever is left, so the
/// emitted values always sum to exactly `total`.
pub fn splat_quantized(
    taps: &[BrushTap],
    centre: (i32, i32),
    field: (i32, i32),
    total: i32,
    mut emit: impl FnMut(usize, i32),
) -> i32 {
    let (cx, cy) = centre;
    let (width, height) = field;
    if total == 0 {
        return 0;
    }

    let inside = |t: &BrushTap| {
        let x = cx + t.dx;
        let y = cy + t.dy;
        x >= 0 && y >= 0 && x < width && y < height
    };
    let covered: f32 = taps.iter().filter(|t| inside(t)).map(|t| t.weight).sum();

    let mut assigned = 0i32;
    for tap in taps.iter().skip(1).filter(|t| inside(t)) {
        let share = (total as f32 * tap.weight / covered).round_ties_even() as i32;
        if share != 0 {
            let index = (cy + tap.dy) as usize * width as usize + (cx + tap.dx) as usize;
            emit(index, share);
            assigned = assigned.wrapping_add(share);
        }
    }

    emit(cy as usize * width as usize + cx as usize, total.wrapping_sub(assigned));
    total
}
