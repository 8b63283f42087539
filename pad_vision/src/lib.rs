// THEORY:
// `pad_vision` turns a pair of synchronised yuv420p camera frames ("board" and
// "comp") into one composited frame and two lists of pad centroids. The public
// surface is the pipeline layer (`pipeline::FramePipeline` for synchronous
// callers, `parallel_pipeline::ParallelPipeline` for tokio callers) plus the
// frame and mask types needed to feed it. The algorithms live in
// `core_modules` and are public for callers that want to drive a single stage
// (e.g. run the centroid search on a mask they built themselves).

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::compositor::{LumaRange, MaskThresholds, PreviewMode};
pub use core_modules::frame::{FlatFrame, StructuredFrame, YuvFrame};
pub use core_modules::geometry::{FrameGeometry, Plane, Point};
pub use core_modules::mask::Mask;
pub use core_modules::region_aggregator::Centroid;
pub use error::{Result, VisionError};
pub use parallel_pipeline::ParallelPipeline;
pub use pipeline::{FramePipeline, FrameReport, PipelineConfig};
