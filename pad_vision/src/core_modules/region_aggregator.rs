// THEORY:
// The `RegionAggregator` turns one connected blob of foreground cells into a
// single weighted centroid. It is a flood fill with three properties that
// matter more than the traversal itself:
//
// 1.  **Iterative, bounded**: pending cells live on an explicit LIFO stack
//     whose capacity is fixed when the aggregator is built. There is no
//     recursion and the stack never grows past that capacity.
// 2.  **Abort on overflow**: if a blob is so large that the stack would have to
//     grow past its capacity, the search stops on the spot and the blob yields
//     nothing. An oversized blob costs one skipped centroid, never the frame.
// 3.  **Claim on push**: a neighbour is pushed only if it is an interior cell
//     that is still `FOREGROUND`, and it is flipped to `VISITED` in the same
//     step. No cell can be on the stack twice, so no pixel is ever counted
//     twice, whichever seed reached it first.
//
// The centroid is the truncating integer mean of the member coordinates and
// the member count is its weight. Sums are order-independent, so the LIFO
// traversal order is an implementation detail.

use crate::core_modules::geometry::Point;
use crate::core_modules::mask::{Mask, FOREGROUND, VISITED};
use crate::error::{Result, VisionError};

pub const DEFAULT_MAX_SEARCH_BUF: usize = 5000;

/// Mean position of a connected region and its pixel count.
/// `repr(C)` keeps the layout `{ x, y, weight }` for foreign consumers of the list.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Centroid {
    pub x: i32,
    pub y: i32,
    pub weight: i32,
}

/// Outcome of a single seeded search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSearch {
    /// The seed was background or already claimed by an earlier search.
    Skipped,
    /// The region outgrew the search stack and was dropped.
    Aborted { claimed: usize },
    Found(Centroid),
}

#[derive(Debug, Default)]
struct Accumulator {
    sum_x: u64,
    sum_y: u64,
    count: u64,
}

impl Accumulator {
    #[inline]
    fn push(&mut self, point: Point) {
        self.sum_x += point.x as u64;
        self.sum_y += point.y as u64;
        self.count += 1;
    }

    fn centroid(&self) -> Option<Centroid> {
        if self.count == 0 {
            return None;
        }
        Some(Centroid {
            x: (self.sum_x / self.count) as i32,
            y: (self.sum_y / self.count) as i32,
            weight: self.count as i32,
        })
    }
}

/// Bounded flood-fill reducer. Holds the search stack so it is allocated once
/// and reused for every seed.
#[derive(Debug)]
pub struct RegionAggregator {
    stack: Vec<Point>,
    capacity: usize,
}

impl RegionAggregator {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stack: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Claims the region containing `seed` and reduces it to a centroid.
    ///
    /// The seed must be an interior pixel of the mask. Every cell the search
    /// reaches is left `VISITED`, including on abort.
    pub fn aggregate(&mut self, mask: &mut Mask, seed: Point) -> Result<RegionSearch> {
        let geometry = mask.geometry();
        if !geometry.is_interior(seed.x, seed.y) {
            return Err(VisionError::OutOfBounds {
                x: seed.x as i64,
                y: seed.y as i64,
            });
        }

        if mask.peek(seed.x, seed.y) != FOREGROUND {
            return Ok(RegionSearch::Skipped);
        }

        self.stack.clear();
        let mut acc = Accumulator::default();
        let mut claimed = 0usize;

        if !self.claim(mask, seed) {
            return Ok(RegionSearch::Aborted { claimed: 1 });
        }
        claimed += 1;

        while let Some(point) = self.stack.pop() {
            acc.push(point);

            // Interior points only, so every neighbour is inside the frame.
            let neighbours = [
                Point::new(point.x - 1, point.y),
                Point::new(point.x + 1, point.y),
                Point::new(point.x, point.y - 1),
                Point::new(point.x, point.y + 1),
            ];
            for next in neighbours {
                if !geometry.is_interior(next.x, next.y) || mask.peek(next.x, next.y) != FOREGROUND {
                    continue;
                }
                if !self.claim(mask, next) {
                    self.stack.clear();
                    return Ok(RegionSearch::Aborted { claimed: claimed + 1 });
                }
                claimed += 1;
            }
        }

        Ok(acc.centroid().map_or(RegionSearch::Skipped, RegionSearch::Found))
    }

    /// List-style form: writes a found centroid at `out[index]` and returns the next free index.
    /// Skipped and aborted searches leave `out` alone and return `index` unchanged.
    pub fn aggregate_into(
        &mut self,
        mask: &mut Mask,
        seed: Point,
        out: &mut [Centroid],
        index: usize,
    ) -> Result<usize> {
        if index >= out.len() {
            return Err(VisionError::CapacityExceeded { capacity: out.len() });
        }
        match self.aggregate(mask, seed)? {
            RegionSearch::Found(centroid) => {
                out[index] = centroid;
                Ok(index + 1)
            }
            RegionSearch::Skipped | RegionSearch::Aborted { .. } => Ok(index),
        }
    }

    /// Marks `point` visited and pushes it. Returns false when the stack is full;
    /// the point is still marked so the abandoned region stays claimed.
    #[inline]
    fn claim(&mut self, mask: &mut Mask, point: Point) -> bool {
        mask.mark(point.x, point.y, VISITED);
        if self.stack.len() >= self.capacity {
            return false;
        }
        self.stack.push(point);
        true
    }
}
