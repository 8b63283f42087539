pub mod centroid_extractor;
pub mod compositor;
pub mod frame;
pub mod geometry;
pub mod mask;
pub mod region_aggregator;
pub mod utils;
