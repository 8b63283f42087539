// THEORY:
// `FrameGeometry` is the single source of truth for where a sample lives in
// memory. Every frame, every mask and every search in the engine asks it for
// offsets instead of doing its own index math.
//
// Storage convention (shared by all buffers in the engine):
// - Planar YUV 4:2:0, plane order Y, U, V.
// - Column-major: a plane's row stride equals the plane's *height*, so `y`
//   varies fastest and one column `x` is a contiguous run of `height` bytes.
//   Raw frames coming off the cameras use this order, so it must not be
//   "fixed" to row-major without also transposing the inputs.
// - Chroma is addressed with *luma* coordinates; the geometry halves them.
//
// A flat frame stores the three planes back to back; a structured frame stores
// them as three buffers. Both use the same in-plane index, which is what makes
// the two layouts interchangeable.

use crate::error::{Result, VisionError};
use std::fmt;

/// The three planes of a YUV 4:2:0 frame, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    Y,
    U,
    V,
}

impl Plane {
    pub const ALL: [Plane; 3] = [Plane::Y, Plane::U, Plane::V];
}

/// A 2D pixel coordinate in luma space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Validated dimensions of a frame or mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    width: u32,
    height: u32,
}

impl FrameGeometry {
    /// Smallest side that still leaves an interior once the border is cleared.
    pub const MIN_SIDE: u32 = 4;

    pub fn new(width: u32, height: u32) -> Result<Self> {
        let reason = if width % 2 != 0 || height % 2 != 0 {
            Some("dimensions must be even")
        } else if width != height {
            Some("frames must be square")
        } else if width < Self::MIN_SIDE {
            Some("frame is too small to have an interior")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(VisionError::InvalidGeometry {
                width,
                height,
                reason,
            }),
            None => Ok(Self { width, height }),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn chroma_width(&self) -> u32 {
        self.width / 2
    }

    pub fn chroma_height(&self) -> u32 {
        self.height / 2
    }

    /// Bytes in the luma plane (and in a mask).
    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes in one chroma plane.
    pub fn chroma_len(&self) -> usize {
        self.luma_len() / 4
    }

    /// Bytes in a contiguous Y+U+V frame.
    pub fn flat_len(&self) -> usize {
        self.luma_len() * 3 / 2
    }

    pub fn plane_len(&self, plane: Plane) -> usize {
        match plane {
            Plane::Y => self.luma_len(),
            Plane::U | Plane::V => self.chroma_len(),
        }
    }

    /// Offset of the start of `plane` inside a flat frame buffer.
    pub fn plane_offset(&self, plane: Plane) -> usize {
        match plane {
            Plane::Y => 0,
            Plane::U => self.luma_len(),
            Plane::V => self.luma_len() + self.chroma_len(),
        }
    }

    #[inline]
    pub fn luma_index(&self, x: u32, y: u32) -> usize {
        x as usize * self.height as usize + y as usize
    }

    /// Index of the chroma sample covering luma pixel (x, y).
    #[inline]
    pub fn chroma_index(&self, x: u32, y: u32) -> usize {
        (x / 2) as usize * self.chroma_height() as usize + (y / 2) as usize
    }

    #[inline]
    pub fn plane_index(&self, plane: Plane, x: u32, y: u32) -> usize {
        match plane {
            Plane::Y => self.luma_index(x, y),
            Plane::U | Plane::V => self.chroma_index(x, y),
        }
    }

    #[inline]
    pub fn flat_index(&self, plane: Plane, x: u32, y: u32) -> usize {
        self.plane_offset(plane) + self.plane_index(plane, x, y)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// True for pixels that are not on the outermost ring of the frame.
    pub fn is_interior(&self, x: u32, y: u32) -> bool {
        x >= 1 && y >= 1 && x < self.width - 1 && y < self.height - 1
    }

    pub fn is_border(&self, x: u32, y: u32) -> bool {
        self.contains(x, y) && !self.is_interior(x, y)
    }

    pub fn check_contains(&self, x: u32, y: u32) -> Result<()> {
        if self.contains(x, y) {
            Ok(())
        } else {
            Err(VisionError::OutOfBounds {
                x: x as i64,
                y: y as i64,
            })
        }
    }

    pub fn ensure_same(&self, other: &FrameGeometry) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(VisionError::GeometryMismatch {
                expected: self.to_string(),
                found: other.to_string(),
            })
        }
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_dimensions() {
        assert!(FrameGeometry::new(1023, 1024).is_err());
        assert!(FrameGeometry::new(1024, 512).is_err());
        assert!(FrameGeometry::new(2, 2).is_err());
        assert!(FrameGeometry::new(0, 0).is_err());
        assert!(FrameGeometry::new(1024, 1024).is_ok());
    }

    #[test]
    fn smallest_frame_has_an_interior() {
        let g = FrameGeometry::new(FrameGeometry::MIN_SIDE, FrameGeometry::MIN_SIDE).unwrap();
        assert!(g.is_interior(1, 1));
        assert!(g.is_interior(2, 2));
        assert!(g.is_border(3, 2));
    }

    #[test]
    fn plane_sizes_match_yuv420() {
        let g = FrameGeometry::new(1024, 1024).unwrap();
        assert_eq!(g.luma_len(), 1024 * 1024);
        assert_eq!(g.chroma_len(), 512 * 512);
        assert_eq!(g.flat_len(), 1024 * 1024 * 3 / 2);
        assert_eq!(g.plane_offset(Plane::Y), 0);
        assert_eq!(g.plane_offset(Plane::U), 1024 * 1024);
        assert_eq!(g.plane_offset(Plane::V), 1024 * 1024 + 512 * 512);
    }

    #[test]
    fn indexing_is_column_major() {
        let g = FrameGeometry::new(8, 8).unwrap();
        assert_eq!(g.luma_index(0, 1), 1);
        assert_eq!(g.luma_index(1, 0), 8);
        assert_eq!(g.luma_index(7, 7), 63);
        // all four pixels of a 2x2 block share one chroma sample
        let c = g.chroma_index(2, 4);
        assert_eq!(c, 4 + 2);
        assert_eq!(g.chroma_index(3, 5), c);
        assert_eq!(g.flat_index(Plane::V, 7, 7), 64 + 16 + 15);
    }

    #[test]
    fn border_and_interior_partition_the_frame() {
        let g = FrameGeometry::new(6, 6).unwrap();
        let border = (0..6)
            .flat_map(|x| (0..6).map(move |y| (x, y)))
            .filter(|&(x, y)| g.is_border(x, y))
            .count();
        assert_eq!(border, 20);
        assert!(g.is_interior(1, 1));
        assert!(g.is_interior(4, 4));
        assert!(!g.is_interior(5, 3));
        assert!(!g.is_border(6, 0));
    }
}
