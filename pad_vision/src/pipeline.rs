// THEORY:
// The `pipeline` module is the top-level API of the engine. One call to
// `FramePipeline::process` is one camera cycle:
//
// 1.  **Composite & mask**: blend the board and comp frames into the output
//     frame and rebuild both occupancy masks (band-parallel when configured).
// 2.  **Preview**: optionally swap the composite for a mask visualisation.
// 3.  **Pad extraction**: reduce each mask to its list of centroids.
//
// The pipeline owns every buffer a cycle writes (output frame, two masks, two
// search stacks), allocated once in `new`. The caller owns the input frames and
// only lends them for the duration of a cycle.

use crate::core_modules::centroid_extractor::{CentroidExtractor, ExtractionConfig};
use crate::core_modules::compositor::{self, MaskThresholds, PreviewMode};
use crate::core_modules::frame::{FlatFrame, YuvFrame};
use crate::core_modules::geometry::FrameGeometry;
use crate::core_modules::mask::Mask;
use crate::error::{Result, VisionError};
use log::debug;
use std::time::Instant;

// Re-export key data structures for the public API.
pub use crate::core_modules::centroid_extractor::{DEFAULT_GRID_STEP, DEFAULT_MAX_NUM_CENTROIDS};
pub use crate::core_modules::compositor::{LumaRange, DEFAULT_CUT_IN, DEFAULT_CUT_OUT};
pub use crate::core_modules::region_aggregator::{Centroid, DEFAULT_MAX_SEARCH_BUF};

pub const DEFAULT_FRAME_SIZE: u32 = 1024;

/// Every tunable of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    pub thresholds: MaskThresholds,
    /// Capacity of the flood-fill stack; larger regions are dropped.
    pub max_search_buf: usize,
    /// Capacity of each centroid list.
    pub max_num_centroids: usize,
    /// Spacing of the seed grid in pixels.
    pub grid_step: u32,
    /// Number of column bands for compositing. `None` uses one band per CPU.
    pub band_count: Option<usize>,
    pub preview: PreviewMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_width: DEFAULT_FRAME_SIZE,
            frame_height: DEFAULT_FRAME_SIZE,
            thresholds: MaskThresholds::default(),
            max_search_buf: DEFAULT_MAX_SEARCH_BUF,
            max_num_centroids: DEFAULT_MAX_NUM_CENTROIDS,
            grid_step: DEFAULT_GRID_STEP,
            band_count: None,
            preview: PreviewMode::Composite,
        }
    }
}

impl PipelineConfig {
    pub fn geometry(&self) -> Result<FrameGeometry> {
        FrameGeometry::new(self.frame_width, self.frame_height)
    }

    pub fn extraction(&self) -> ExtractionConfig {
        ExtractionConfig {
            grid_step: self.grid_step,
            max_search_buf: self.max_search_buf,
            max_num_centroids: self.max_num_centroids,
        }
    }

    pub fn bands(&self) -> usize {
        self.band_count.unwrap_or_else(num_cpus::get)
    }

    pub fn validate(&self) -> Result<()> {
        self.geometry()?;
        self.thresholds.validate()?;
        self.extraction().validate()?;
        if self.band_count == Some(0) {
            return Err(VisionError::InvalidConfig("band count must be at least 1".into()));
        }
        Ok(())
    }
}

/// The pads found in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// Zero-based index of the cycle that produced this report.
    pub frame_id: u64,
    pub board_pads: Vec<Centroid>,
    pub comp_pads: Vec<Centroid>,
}

/// Synchronous, single-owner pipeline. One instance per camera pair.
pub struct FramePipeline {
    config: PipelineConfig,
    geometry: FrameGeometry,
    output: FlatFrame,
    board_mask: Mask,
    comp_mask: Mask,
    board_extractor: CentroidExtractor,
    comp_extractor: CentroidExtractor,
    frame_counter: u64,
}

impl FramePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let geometry = config.geometry()?;
        Ok(Self {
            output: FlatFrame::new(geometry),
            board_mask: Mask::new(geometry),
            comp_mask: Mask::new(geometry),
            board_extractor: CentroidExtractor::new(config.extraction())?,
            comp_extractor: CentroidExtractor::new(config.extraction())?,
            frame_counter: 0,
            geometry,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Runs one cycle over a board/comp frame pair.
    pub fn process<B, C>(&mut self, board: &B, comp: &C) -> Result<FrameReport>
    where
        B: YuvFrame + ?Sized,
        C: YuvFrame + ?Sized,
    {
        let started = Instant::now();

        compositor::composite_and_mask_banded(
            board,
            comp,
            &mut self.output,
            &mut self.board_mask,
            &mut self.comp_mask,
            &self.config.thresholds,
            self.config.bands(),
        )?;
        compositor::render_preview(self.config.preview, &mut self.output, &self.board_mask, &self.comp_mask)?;
        let composited = started.elapsed();

        let board_pads = self.board_extractor.extract(&mut self.board_mask)?;
        let comp_pads = self.comp_extractor.extract(&mut self.comp_mask)?;

        let frame_id = self.frame_counter;
        self.frame_counter += 1;
        debug!(
            "frame {frame_id}: {} board pads, {} comp pads (composite {:?}, total {:?})",
            board_pads.len(),
            comp_pads.len(),
            composited,
            started.elapsed()
        );

        Ok(FrameReport {
            frame_id,
            board_pads,
            comp_pads,
        })
    }

    /// The output frame written by the last cycle.
    pub fn output(&self) -> &FlatFrame {
        &self.output
    }

    /// Board mask after the last cycle. Regions that were searched are marked visited.
    pub fn board_mask(&self) -> &Mask {
        &self.board_mask
    }

    pub fn comp_mask(&self) -> &Mask {
        &self.comp_mask
    }

    pub fn frames_processed(&self) -> u64 {
        self.frame_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::StructuredFrame;
    use crate::core_modules::geometry::Plane;
    use crate::core_modules::mask::{BACKGROUND, FOREGROUND};

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            frame_width: 64,
            frame_height: 64,
            band_count: Some(2),
            ..PipelineConfig::default()
        }
    }

    /// Dark frame with bright square pads at the given top-left corners.
    fn frame_with_pads(g: FrameGeometry, pads: &[(u32, u32)], side: u32) -> FlatFrame {
        let mut frame = FlatFrame::filled(g, 20, 128, 128);
        for &(px, py) in pads {
            for x in px..px + side {
                for y in py..py + side {
                    frame.set_sample(Plane::Y, x, y, 230);
                }
            }
        }
        frame
    }

    #[test]
    fn default_config_values() {
        let config = PipelineConfig::default();
        assert_eq!((config.frame_width, config.frame_height), (1024, 1024));
        assert_eq!(config.thresholds.board, LumaRange::new(150, 255));
        assert_eq!(config.thresholds.comp, LumaRange::new(150, 255));
        assert_eq!(config.max_search_buf, 5000);
        assert_eq!(config.max_num_centroids, 200);
        assert_eq!(config.grid_step, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let odd = PipelineConfig { frame_width: 63, ..small_config() };
        assert!(matches!(FramePipeline::new(odd), Err(VisionError::InvalidGeometry { .. })));

        let no_bands = PipelineConfig { band_count: Some(0), ..small_config() };
        assert!(matches!(FramePipeline::new(no_bands), Err(VisionError::InvalidConfig(_))));

        let no_grid = PipelineConfig { grid_step: 0, ..small_config() };
        assert!(FramePipeline::new(no_grid).is_err());
    }

    #[test]
    fn finds_pads_in_each_source() {
        let mut pipeline = FramePipeline::new(small_config()).unwrap();
        let g = pipeline.geometry();
        let board = frame_with_pads(g, &[(14, 14), (30, 46)], 6);
        let comp = frame_with_pads(g, &[(47, 15)], 4);

        let report = pipeline.process(&board, &comp).unwrap();

        assert_eq!(report.frame_id, 0);
        let mut board_pads = report.board_pads.clone();
        board_pads.sort_by_key(|c| (c.x, c.y));
        assert_eq!(
            board_pads,
            vec![
                Centroid { x: 16, y: 16, weight: 36 },
                Centroid { x: 32, y: 48, weight: 36 },
            ]
        );
        assert_eq!(report.comp_pads, vec![Centroid { x: 48, y: 16, weight: 16 }]);
    }

    #[test]
    fn output_is_the_blend_by_default() {
        let mut pipeline = FramePipeline::new(small_config()).unwrap();
        let g = pipeline.geometry();
        let board = FlatFrame::filled(g, 200, 100, 50);
        let comp = StructuredFrame::filled(g, 101, 100, 51);

        pipeline.process(&board, &comp).unwrap();

        let planes = pipeline.output().planes();
        assert!(planes.y.iter().all(|&s| s == 150));
        assert!(planes.u.iter().all(|&s| s == 100));
        assert!(planes.v.iter().all(|&s| s == 50));
    }

    #[test]
    fn comp_preview_shows_the_comp_mask() {
        let config = PipelineConfig {
            preview: PreviewMode::CompMask,
            ..small_config()
        };
        let mut pipeline = FramePipeline::new(config).unwrap();
        let g = pipeline.geometry();
        let board = frame_with_pads(g, &[], 4);
        let comp = frame_with_pads(g, &[(17, 17)], 4);

        pipeline.process(&board, &comp).unwrap();

        assert_eq!(pipeline.output().sample(Plane::Y, 18, 18), 255);
        assert_eq!(pipeline.output().sample(Plane::Y, 40, 40), 0);
        assert_eq!(pipeline.output().sample(Plane::U, 40, 40), 128);
    }

    #[test]
    fn masks_are_rebuilt_every_cycle() {
        let mut pipeline = FramePipeline::new(small_config()).unwrap();
        let g = pipeline.geometry();
        let lit = frame_with_pads(g, &[(17, 17)], 4);
        let dark = frame_with_pads(g, &[], 4);

        let first = pipeline.process(&lit, &dark).unwrap();
        let second = pipeline.process(&dark, &lit).unwrap();

        assert_eq!(first.board_pads.len(), 1);
        assert!(first.comp_pads.is_empty());
        assert!(second.board_pads.is_empty());
        assert_eq!(second.comp_pads.len(), 1);
        assert_eq!(second.frame_id, 1);
        assert_eq!(pipeline.frames_processed(), 2);
        assert_eq!(pipeline.board_mask().count(FOREGROUND), 0);
        assert_eq!(pipeline.board_mask().count(BACKGROUND), g.luma_len());
    }

    #[test]
    fn wrong_input_size_is_rejected() {
        let mut pipeline = FramePipeline::new(small_config()).unwrap();
        let other = FlatFrame::new(FrameGeometry::new(32, 32).unwrap());
        assert!(matches!(
            pipeline.process(&other, &other),
            Err(VisionError::GeometryMismatch { .. })
        ));
    }
}
