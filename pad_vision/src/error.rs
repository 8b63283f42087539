// THEORY:
// Every failure the engine can report lives in this one enum. The algorithms
// themselves never fail on well-formed input: an oversized region or a full
// centroid list are policies, not errors. What *is* an error is malformed
// input (odd dimensions, wrong buffer lengths, coordinates off the frame),
// which the engine rejects up front instead of reading or writing past a
// buffer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VisionError>;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("invalid frame geometry {width}x{height}: {reason}")]
    InvalidGeometry {
        width: u32,
        height: u32,
        reason: &'static str,
    },

    #[error("geometry mismatch: expected {expected}, found {found}")]
    GeometryMismatch { expected: String, found: String },

    #[error("buffer has {found} bytes, expected {expected}")]
    BufferSize { expected: usize, found: usize },

    #[error("coordinate ({x}, {y}) is outside the usable frame area")]
    OutOfBounds { x: i64, y: i64 },

    #[error("centroid list is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}
