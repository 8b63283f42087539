// THEORY:
// `ParallelPipeline` is the async face of the engine, for callers that already
// live on a tokio runtime (capture loops, encoders fed through pipes). It
// produces exactly the same reports as `FramePipeline`, but spreads a cycle
// over the blocking thread pool:
//
// 1.  **Composite**: one blocking task runs the band-parallel compositor.
// 2.  **Extract**: the board mask and the comp mask are handed to two separate
//     blocking tasks. They are disjoint buffers, so the searches cannot race;
//     a single mask is never shared between tasks.
//
// Buffers move into the tasks by value and come back with the results, so no
// locks are needed. Frames are recycled through a small pool: consumed inputs
// go back into it, and `acquire_frame` hands them out again to be refilled.

use crate::core_modules::centroid_extractor::{CentroidExtractor, ExtractionConfig};
use crate::core_modules::compositor;
use crate::core_modules::frame::{FlatFrame, YuvFrame};
use crate::core_modules::geometry::FrameGeometry;
use crate::core_modules::mask::Mask;
use crate::error::{Result, VisionError};
use crate::pipeline::{Centroid, FrameReport, PipelineConfig};
use log::debug;
use std::collections::VecDeque;
use std::time::Instant;

const FRAME_POOL_SIZE: usize = 8;

/// A mask plus the extractor that consumes it; moved into a blocking task as a unit.
struct MaskLane {
    mask: Mask,
    extractor: CentroidExtractor,
}

impl MaskLane {
    fn new(geometry: FrameGeometry, config: ExtractionConfig) -> Result<Self> {
        Ok(Self {
            mask: Mask::new(geometry),
            extractor: CentroidExtractor::new(config)?,
        })
    }

    fn extract(mut self) -> (Self, Result<Vec<Centroid>>) {
        let pads = self.extractor.extract(&mut self.mask);
        (self, pads)
    }
}

pub struct ParallelPipeline {
    config: PipelineConfig,
    geometry: FrameGeometry,
    /// `None` only while a cycle is in flight, or after a worker panicked.
    lanes: Option<(MaskLane, MaskLane)>,
    frame_pool: VecDeque<FlatFrame>,
    frame_counter: u64,
}

impl ParallelPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let geometry = config.geometry()?;

        let mut frame_pool = VecDeque::with_capacity(FRAME_POOL_SIZE);
        for _ in 0..FRAME_POOL_SIZE {
            frame_pool.push_back(FlatFrame::new(geometry));
        }

        Ok(Self {
            lanes: Some(Self::build_lanes(&config, geometry)?),
            config,
            geometry,
            frame_pool,
            frame_counter: 0,
        })
    }

    fn build_lanes(config: &PipelineConfig, geometry: FrameGeometry) -> Result<(MaskLane, MaskLane)> {
        Ok((
            MaskLane::new(geometry, config.extraction())?,
            MaskLane::new(geometry, config.extraction())?,
        ))
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Takes a frame buffer from the pool (or allocates one) for the caller to fill.
    pub fn acquire_frame(&mut self) -> FlatFrame {
        self.frame_pool
            .pop_front()
            .unwrap_or_else(|| FlatFrame::new(self.geometry))
    }

    /// Gives a frame back to the pool. Frames of another geometry, or beyond the pool size, are dropped.
    pub fn return_frame(&mut self, frame: FlatFrame) {
        if frame.geometry() == self.geometry && self.frame_pool.len() < FRAME_POOL_SIZE {
            self.frame_pool.push_back(frame);
        }
    }

    pub fn pooled_frames(&self) -> usize {
        self.frame_pool.len()
    }

    /// Runs one cycle. The inputs are consumed and recycled; the returned frame is the output.
    pub async fn process(&mut self, board: FlatFrame, comp: FlatFrame) -> Result<(FrameReport, FlatFrame)> {
        let started = Instant::now();
        let (mut board_lane, mut comp_lane) = match self.lanes.take() {
            Some(lanes) => lanes,
            None => Self::build_lanes(&self.config, self.geometry)?,
        };
        let mut output = self.acquire_frame();
        let thresholds = self.config.thresholds;
        let preview = self.config.preview;
        let bands = self.config.bands();

        let composite = tokio::task::spawn_blocking(move || {
            let result = compositor::composite_and_mask_banded(
                &board,
                &comp,
                &mut output,
                &mut board_lane.mask,
                &mut comp_lane.mask,
                &thresholds,
                bands,
            )
            .and_then(|()| compositor::render_preview(preview, &mut output, &board_lane.mask, &comp_lane.mask));
            (board, comp, output, board_lane, comp_lane, result)
        });
        let (board, comp, output, board_lane, comp_lane, result) = composite.await.map_err(worker_error)?;
        self.return_frame(board);
        self.return_frame(comp);
        if let Err(err) = result {
            self.lanes = Some((board_lane, comp_lane));
            self.return_frame(output);
            return Err(err);
        }
        let composited = started.elapsed();

        let board_task = tokio::task::spawn_blocking(move || board_lane.extract());
        let comp_task = tokio::task::spawn_blocking(move || comp_lane.extract());
        let ((board_lane, board_pads), (comp_lane, comp_pads)) =
            futures::try_join!(board_task, comp_task).map_err(worker_error)?;
        self.lanes = Some((board_lane, comp_lane));

        let report = FrameReport {
            frame_id: self.frame_counter,
            board_pads: board_pads?,
            comp_pads: comp_pads?,
        };
        self.frame_counter += 1;
        debug!(
            "frame {}: {} board pads, {} comp pads (composite {:?}, total {:?})",
            report.frame_id,
            report.board_pads.len(),
            report.comp_pads.len(),
            composited,
            started.elapsed()
        );

        Ok((report, output))
    }
}

fn worker_error(err: tokio::task::JoinError) -> VisionError {
    VisionError::Worker(err.to_string())
}
