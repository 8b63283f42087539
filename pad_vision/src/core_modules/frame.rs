// THEORY:
// A frame is a "dumb" data container: three planes of bytes and the geometry
// that says how to address them. Two memory layouts are supported:
//
// 1.  **StructuredFrame**: the Y, U and V planes are three separate buffers.
//     Handy when a capture API hands planes over individually.
// 2.  **FlatFrame**: one contiguous `W*H*3/2` buffer, Y then U then V. This is
//     the raw yuv420p wire format that gets piped to an encoder or player.
//
// Both implement `YuvFrame`, which exposes the planes as borrowed slices.
// Everything above this module (compositing, visualisation, PNG export) works
// on those slices, so it never needs to know which layout it was given.

use crate::core_modules::geometry::{FrameGeometry, Plane};
use crate::core_modules::mask::Mask;
use crate::error::{Result, VisionError};

/// Neutral chroma value (no colour).
pub const NEUTRAL_CHROMA: u8 = 128;

/// Read-only view over the three planes of a frame.
#[derive(Debug, Clone, Copy)]
pub struct Planes<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
}

impl<'a> Planes<'a> {
    pub fn get(&self, plane: Plane) -> &'a [u8] {
        match plane {
            Plane::Y => self.y,
            Plane::U => self.u,
            Plane::V => self.v,
        }
    }
}

/// Mutable view over the three planes of a frame.
#[derive(Debug)]
pub struct PlanesMut<'a> {
    pub y: &'a mut [u8],
    pub u: &'a mut [u8],
    pub v: &'a mut [u8],
}

impl PlanesMut<'_> {
    pub fn get_mut(&mut self, plane: Plane) -> &mut [u8] {
        match plane {
            Plane::Y => &mut *self.y,
            Plane::U => &mut *self.u,
            Plane::V => &mut *self.v,
        }
    }
}

/// Layout-agnostic access to a planar YUV 4:2:0 frame.
pub trait YuvFrame {
    fn geometry(&self) -> FrameGeometry;

    fn planes(&self) -> Planes<'_>;

    fn planes_mut(&mut self) -> PlanesMut<'_>;

    /// Sample of `plane` at luma coordinate (x, y). Panics when (x, y) is off the frame.
    fn sample(&self, plane: Plane, x: u32, y: u32) -> u8 {
        let index = checked_index(self.geometry(), plane, x, y);
        self.planes().get(plane)[index]
    }

    fn try_sample(&self, plane: Plane, x: u32, y: u32) -> Result<u8> {
        self.geometry().check_contains(x, y)?;
        Ok(self.sample(plane, x, y))
    }

    /// Panics when (x, y) is off the frame.
    fn set_sample(&mut self, plane: Plane, x: u32, y: u32, value: u8) {
        let index = checked_index(self.geometry(), plane, x, y);
        self.planes_mut().get_mut(plane)[index] = value;
    }

    fn try_set_sample(&mut self, plane: Plane, x: u32, y: u32, value: u8) -> Result<()> {
        self.geometry().check_contains(x, y)?;
        self.set_sample(plane, x, y, value);
        Ok(())
    }

    fn fill(&mut self, plane: Plane, value: u8) {
        self.planes_mut().get_mut(plane).fill(value);
    }
}

fn checked_index(geometry: FrameGeometry, plane: Plane, x: u32, y: u32) -> usize {
    assert!(
        geometry.contains(x, y),
        "frame coordinate ({x}, {y}) is outside {geometry}"
    );
    geometry.plane_index(plane, x, y)
}

/// Frame stored as three independent plane buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredFrame {
    geometry: FrameGeometry,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

impl StructuredFrame {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self::filled(geometry, 0, NEUTRAL_CHROMA, NEUTRAL_CHROMA)
    }

    pub fn filled(geometry: FrameGeometry, y: u8, u: u8, v: u8) -> Self {
        Self {
            geometry,
            y: vec![y; geometry.luma_len()],
            u: vec![u; geometry.chroma_len()],
            v: vec![v; geometry.chroma_len()],
        }
    }

    pub fn from_planes(geometry: FrameGeometry, y: Vec<u8>, u: Vec<u8>, v: Vec<u8>) -> Result<Self> {
        check_len(geometry.luma_len(), y.len())?;
        check_len(geometry.chroma_len(), u.len())?;
        check_len(geometry.chroma_len(), v.len())?;
        Ok(Self { geometry, y, u, v })
    }
}

impl YuvFrame for StructuredFrame {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn planes(&self) -> Planes<'_> {
        Planes {
            y: &self.y,
            u: &self.u,
            v: &self.v,
        }
    }

    fn planes_mut(&mut self) -> PlanesMut<'_> {
        PlanesMut {
            y: &mut self.y,
            u: &mut self.u,
            v: &mut self.v,
        }
    }
}

/// Frame stored as a single contiguous yuv420p buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatFrame {
    geometry: FrameGeometry,
    data: Vec<u8>,
}

impl FlatFrame {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self::filled(geometry, 0, NEUTRAL_CHROMA, NEUTRAL_CHROMA)
    }

    pub fn filled(geometry: FrameGeometry, y: u8, u: u8, v: u8) -> Self {
        let mut data = Vec::with_capacity(geometry.flat_len());
        data.resize(geometry.luma_len(), y);
        data.resize(geometry.luma_len() + geometry.chroma_len(), u);
        data.resize(geometry.flat_len(), v);
        Self { geometry, data }
    }

    /// Wraps a raw yuv420p buffer. The length must be exactly `flat_len`.
    pub fn from_bytes(geometry: FrameGeometry, data: Vec<u8>) -> Result<Self> {
        check_len(geometry.flat_len(), data.len())?;
        Ok(Self { geometry, data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the raw buffer, e.g. to read the next frame into it in place.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl YuvFrame for FlatFrame {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn planes(&self) -> Planes<'_> {
        let (y, chroma) = self.data.split_at(self.geometry.luma_len());
        let (u, v) = chroma.split_at(self.geometry.chroma_len());
        Planes { y, u, v }
    }

    fn planes_mut(&mut self) -> PlanesMut<'_> {
        let (y, chroma) = self.data.split_at_mut(self.geometry.luma_len());
        let (u, v) = chroma.split_at_mut(self.geometry.chroma_len());
        PlanesMut { y, u, v }
    }
}

impl From<&StructuredFrame> for FlatFrame {
    fn from(frame: &StructuredFrame) -> Self {
        let mut data = Vec::with_capacity(frame.geometry.flat_len());
        data.extend_from_slice(&frame.y);
        data.extend_from_slice(&frame.u);
        data.extend_from_slice(&frame.v);
        Self {
            geometry: frame.geometry,
            data,
        }
    }
}

impl From<&FlatFrame> for StructuredFrame {
    fn from(frame: &FlatFrame) -> Self {
        let planes = frame.planes();
        Self {
            geometry: frame.geometry,
            y: planes.y.to_vec(),
            u: planes.u.to_vec(),
            v: planes.v.to_vec(),
        }
    }
}

fn check_len(expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(VisionError::BufferSize { expected, found })
    }
}

/// Renders a mask as a black-and-white frame for inspection.
/// Foreground (visited or not) becomes white, background black, chroma neutral.
pub fn mask_to_frame<F: YuvFrame + ?Sized>(mask: &Mask, out: &mut F) -> Result<()> {
    mask.geometry().ensure_same(&out.geometry())?;

    let PlanesMut { y, u, v } = out.planes_mut();
    for (luma, &cell) in y.iter_mut().zip(mask.cells()) {
        *luma = if cell != 0 { 255 } else { 0 };
    }
    // Every chroma sample is neutral, so the per-block [x/2][y/2] write collapses to a fill.
    u.fill(NEUTRAL_CHROMA);
    v.fill(NEUTRAL_CHROMA);
    Ok(())
}
