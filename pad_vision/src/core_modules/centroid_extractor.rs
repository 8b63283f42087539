// THEORY:
// The `CentroidExtractor` reduces a whole mask to a bounded list of pads. It
// drives the `RegionAggregator` from a sparse seed grid rather than from every
// pixel:
//
// 1.  **Border normalisation**: the outer ring of the mask is forced to
//     background first. Afterwards no region can touch the frame edge, so a
//     search never has to look past it.
// 2.  **Grid seeding**: seeds sit on a `grid_step` lattice over the interior,
//     columns outer and rows inner. The first seed that lands in a region
//     claims all of it; later seeds in the same region are no-ops. A region
//     that fits between lattice points in both directions is never seen, which
//     is the price of not seeding every pixel.
// 3.  **Bounded output**: the caller's slice is the capacity. When it fills,
//     extraction stops and reports one less than the capacity, matching the
//     count downstream consumers of the list were built against.

use crate::core_modules::geometry::Point;
use crate::core_modules::mask::Mask;
use crate::core_modules::region_aggregator::{Centroid, RegionAggregator, RegionSearch};
use crate::error::{Result, VisionError};
use log::{debug, warn};

pub const DEFAULT_GRID_STEP: u32 = 16;
pub const DEFAULT_MAX_NUM_CENTROIDS: usize = 200;

/// Knobs for one extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionConfig {
    pub grid_step: u32,
    pub max_search_buf: usize,
    pub max_num_centroids: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            grid_step: DEFAULT_GRID_STEP,
            max_search_buf: crate::core_modules::region_aggregator::DEFAULT_MAX_SEARCH_BUF,
            max_num_centroids: DEFAULT_MAX_NUM_CENTROIDS,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.grid_step == 0 {
            return Err(VisionError::InvalidConfig("grid step must be at least 1".into()));
        }
        if self.max_search_buf == 0 {
            return Err(VisionError::InvalidConfig("search buffer must hold at least one point".into()));
        }
        if self.max_num_centroids == 0 {
            return Err(VisionError::InvalidConfig("centroid list must hold at least one entry".into()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct CentroidExtractor {
    config: ExtractionConfig,
    aggregator: RegionAggregator,
}

impl CentroidExtractor {
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            aggregator: RegionAggregator::with_capacity(config.max_search_buf),
            config,
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Writes the centroids of `mask` into `out` and returns how many are valid.
    ///
    /// The mask is consumed: its border is cleared and every region reached is
    /// left visited. When `out` fills up, extraction stops and `out.len() - 1`
    /// is returned.
    pub fn extract_into(&mut self, mask: &mut Mask, out: &mut [Centroid]) -> Result<usize> {
        if out.is_empty() {
            return Err(VisionError::CapacityExceeded { capacity: 0 });
        }

        mask.clear_border();

        let geometry = mask.geometry();
        let step = self.config.grid_step as usize;
        let mut count = 0;
        let mut aborted = 0usize;

        for x in (1..geometry.width() - 1).step_by(step) {
            for y in (1..geometry.height() - 1).step_by(step) {
                match self.aggregator.aggregate(mask, Point::new(x, y))? {
                    RegionSearch::Found(centroid) => {
                        out[count] = centroid;
                        count += 1;
                    }
                    RegionSearch::Aborted { claimed } => {
                        aborted += 1;
                        debug!("dropped oversized region at ({x}, {y}) after {claimed} pixels");
                    }
                    RegionSearch::Skipped => {}
                }

                if count >= out.len() {
                    warn!(
                        "centroid list full at {} entries, stopping extraction early",
                        out.len()
                    );
                    return Ok(out.len() - 1);
                }
            }
        }

        if aborted > 0 {
            debug!("{aborted} region(s) exceeded the search buffer of {}", self.aggregator.capacity());
        }
        Ok(count)
    }

    /// Allocating form of [`extract_into`](Self::extract_into) using the configured capacity.
    pub fn extract(&mut self, mask: &mut Mask) -> Result<Vec<Centroid>> {
        let mut out = vec![Centroid::default(); self.config.max_num_centroids];
        let count = self.extract_into(mask, &mut out)?;
        out.truncate(count);
        Ok(out)
    }
}
