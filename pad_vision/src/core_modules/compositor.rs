// THEORY:
// The compositor is the per-pixel half of the engine. In a single sweep over
// the two camera frames it produces:
//
// 1.  **The composite**: every luma and chroma sample of the output is the
//     truncating mean of the board and comp samples at the same position.
// 2.  **Two masks**: a luma sample inside the (inclusive) cut-in/cut-out range
//     of its source marks the corresponding mask cell as `FOREGROUND`,
//     otherwise `BACKGROUND`. The board mask reads the board frame, the comp
//     mask reads the comp frame.
//
// No output sample depends on any other sample, so the frame can be cut into
// bands and the bands processed on separate threads with identical results.
// Because storage is column-major, a band of whole columns is a contiguous run
// of every plane and of both masks; splitting at even columns keeps each 2x2
// chroma block inside a single band.

use crate::core_modules::frame::{mask_to_frame, Planes, PlanesMut, YuvFrame};
use crate::core_modules::mask::{Cell, Mask, BACKGROUND, FOREGROUND};
use crate::error::{Result, VisionError};
use rayon::prelude::*;

pub const DEFAULT_CUT_IN: u8 = 150;
pub const DEFAULT_CUT_OUT: u8 = 255;

/// Inclusive luma window that counts as foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LumaRange {
    pub cut_in: u8,
    pub cut_out: u8,
}

impl LumaRange {
    pub const fn new(cut_in: u8, cut_out: u8) -> Self {
        Self { cut_in, cut_out }
    }

    #[inline]
    pub fn contains(&self, luma: u8) -> bool {
        luma >= self.cut_in && luma <= self.cut_out
    }

    #[inline]
    fn classify(&self, luma: u8) -> Cell {
        if self.contains(luma) { FOREGROUND } else { BACKGROUND }
    }
}

impl Default for LumaRange {
    fn default() -> Self {
        Self::new(DEFAULT_CUT_IN, DEFAULT_CUT_OUT)
    }
}

/// Thresholds for both sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaskThresholds {
    pub board: LumaRange,
    pub comp: LumaRange,
}

impl MaskThresholds {
    pub fn validate(&self) -> Result<()> {
        for (name, range) in [("board", self.board), ("comp", self.comp)] {
            if range.cut_in > range.cut_out {
                return Err(VisionError::InvalidConfig(format!(
                    "{name} mask cut-in {} is above cut-out {}",
                    range.cut_in, range.cut_out
                )));
            }
        }
        Ok(())
    }
}

/// What ends up in the output frame after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewMode {
    /// The blended board/comp image.
    #[default]
    Composite,
    /// The board mask rendered black-and-white.
    BoardMask,
    /// The comp mask rendered black-and-white.
    CompMask,
}

/// One contiguous slab of columns and everything the kernel touches inside it.
struct Band<'a> {
    board: Planes<'a>,
    comp: Planes<'a>,
    out: PlanesMut<'a>,
    board_mask: &'a mut [Cell],
    comp_mask: &'a mut [Cell],
}

impl Band<'_> {
    fn run(self, thresholds: &MaskThresholds) {
        let Band {
            board,
            comp,
            out,
            board_mask,
            comp_mask,
        } = self;

        let luma = out
            .y
            .iter_mut()
            .zip(board.y.iter().zip(comp.y))
            .zip(board_mask.iter_mut().zip(comp_mask.iter_mut()));
        for ((out_y, (&board_y, &comp_y)), (board_cell, comp_cell)) in luma {
            *out_y = mean(board_y, comp_y);
            *board_cell = thresholds.board.classify(board_y);
            *comp_cell = thresholds.comp.classify(comp_y);
        }

        blend(out.u, board.u, comp.u);
        blend(out.v, board.v, comp.v);
    }
}

#[inline]
fn mean(a: u8, b: u8) -> u8 {
    ((a as u16 + b as u16) / 2) as u8
}

#[inline]
fn blend(out: &mut [u8], a: &[u8], b: &[u8]) {
    for (o, (&a, &b)) in out.iter_mut().zip(a.iter().zip(b)) {
        *o = mean(a, b);
    }
}

/// Composites `board` and `comp` into `out` and rebuilds both masks, on the calling thread.
pub fn composite_and_mask<B, C, O>(
    board: &B,
    comp: &C,
    out: &mut O,
    board_mask: &mut Mask,
    comp_mask: &mut Mask,
    thresholds: &MaskThresholds,
) -> Result<()>
where
    B: YuvFrame + ?Sized,
    C: YuvFrame + ?Sized,
    O: YuvFrame + ?Sized,
{
    composite_and_mask_banded(board, comp, out, board_mask, comp_mask, thresholds, 1)
}

/// Same as [`composite_and_mask`], split into `bands` column bands processed on the rayon pool.
pub fn composite_and_mask_banded<B, C, O>(
    board: &B,
    comp: &C,
    out: &mut O,
    board_mask: &mut Mask,
    comp_mask: &mut Mask,
    thresholds: &MaskThresholds,
    bands: usize,
) -> Result<()>
where
    B: YuvFrame + ?Sized,
    C: YuvFrame + ?Sized,
    O: YuvFrame + ?Sized,
{
    let geometry = out.geometry();
    geometry.ensure_same(&board.geometry())?;
    geometry.ensure_same(&comp.geometry())?;
    geometry.ensure_same(&board_mask.geometry())?;
    geometry.ensure_same(&comp_mask.geometry())?;
    if bands == 0 {
        return Err(VisionError::InvalidConfig("band count must be at least 1".into()));
    }

    let (board, comp) = (board.planes(), comp.planes());
    let out = out.planes_mut();

    if bands == 1 {
        Band {
            board,
            comp,
            out,
            board_mask: board_mask.cells_mut(),
            comp_mask: comp_mask.cells_mut(),
        }
        .run(thresholds);
        return Ok(());
    }

    // Whole, even column counts so chroma blocks never straddle two bands.
    let width = geometry.width() as usize;
    let columns = width.div_ceil(bands).next_multiple_of(2);
    let luma_chunk = columns * geometry.height() as usize;
    let chroma_chunk = (columns / 2) * geometry.chroma_height() as usize;

    let PlanesMut {
        y: out_y,
        u: out_u,
        v: out_v,
    } = out;
    let out_planes = out_y
        .chunks_mut(luma_chunk)
        .zip(out_u.chunks_mut(chroma_chunk))
        .zip(out_v.chunks_mut(chroma_chunk))
        .map(|((y, u), v)| PlanesMut { y, u, v });
    let board_planes = split_planes(board, luma_chunk, chroma_chunk);
    let comp_planes = split_planes(comp, luma_chunk, chroma_chunk);
    let masks = board_mask
        .cells_mut()
        .chunks_mut(luma_chunk)
        .zip(comp_mask.cells_mut().chunks_mut(luma_chunk));

    let work: Vec<Band<'_>> = out_planes
        .zip(board_planes.zip(comp_planes))
        .zip(masks)
        .map(|((out, (board, comp)), (board_mask, comp_mask))| Band {
            board,
            comp,
            out,
            board_mask,
            comp_mask,
        })
        .collect();

    work.into_par_iter().for_each(|band| band.run(thresholds));
    Ok(())
}

fn split_planes(
    planes: Planes<'_>,
    luma_chunk: usize,
    chroma_chunk: usize,
) -> impl Iterator<Item = Planes<'_>> {
    planes
        .y
        .chunks(luma_chunk)
        .zip(planes.u.chunks(chroma_chunk))
        .zip(planes.v.chunks(chroma_chunk))
        .map(|((y, u), v)| Planes { y, u, v })
}

/// Replaces the output with a mask visualisation when a preview mode asks for one.
pub fn render_preview<O: YuvFrame + ?Sized>(
    mode: PreviewMode,
    out: &mut O,
    board_mask: &Mask,
    comp_mask: &Mask,
) -> Result<()> {
    match mode {
        PreviewMode::Composite => Ok(()),
        PreviewMode::BoardMask => mask_to_frame(board_mask, out),
        PreviewMode::CompMask => mask_to_frame(comp_mask, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::{FlatFrame, StructuredFrame};
    use crate::core_modules::geometry::{FrameGeometry, Plane};

    fn geometry() -> FrameGeometry {
        FrameGeometry::new(16, 16).unwrap()
    }

    fn gradient(g: FrameGeometry, seed: u32) -> FlatFrame {
        let mut frame = FlatFrame::new(g);
        for x in 0..g.width() {
            for y in 0..g.height() {
                frame.set_sample(Plane::Y, x, y, ((x * 13 + y * 7 + seed) % 256) as u8);
                frame.set_sample(Plane::U, x, y, ((x * 3 + seed) % 256) as u8);
                frame.set_sample(Plane::V, x, y, ((y * 5 + seed) % 256) as u8);
            }
        }
        frame
    }

    #[test]
    fn constant_frames_blend_to_truncated_mean() {
        let g = geometry();
        let board = FlatFrame::filled(g, 201, 10, 255);
        let comp = FlatFrame::filled(g, 100, 11, 254);
        let mut out = FlatFrame::new(g);
        let (mut bm, mut cm) = (Mask::new(g), Mask::new(g));

        composite_and_mask(&board, &comp, &mut out, &mut bm, &mut cm, &MaskThresholds::default()).unwrap();

        let planes = out.planes();
        assert!(planes.y.iter().all(|&s| s == 150));
        assert!(planes.u.iter().all(|&s| s == 10));
        assert!(planes.v.iter().all(|&s| s == 254));
        assert_eq!(bm.count(FOREGROUND), g.luma_len());
        assert_eq!(cm.count(BACKGROUND), g.luma_len());
    }

    #[test]
    fn thresholds_are_inclusive() {
        let g = geometry();
        let thresholds = MaskThresholds {
            board: LumaRange::new(150, 200),
            comp: LumaRange::new(150, 200),
        };
        let mut out = FlatFrame::new(g);

        for (luma, expected) in [(149, BACKGROUND), (150, FOREGROUND), (200, FOREGROUND), (201, BACKGROUND)] {
            let board = FlatFrame::filled(g, luma, 128, 128);
            let comp = FlatFrame::filled(g, 0, 128, 128);
            let (mut bm, mut cm) = (Mask::new(g), Mask::new(g));
            composite_and_mask(&board, &comp, &mut out, &mut bm, &mut cm, &thresholds).unwrap();
            assert_eq!(bm.get(5, 9), expected, "board luma {luma}");
            assert_eq!(cm.get(5, 9), BACKGROUND);
        }
    }

    #[test]
    fn upper_default_cut_out_includes_full_white() {
        assert!(LumaRange::default().contains(255));
        assert!(LumaRange::default().contains(150));
        assert!(!LumaRange::default().contains(149));
    }

    #[test]
    fn sources_are_left_untouched() {
        let g = geometry();
        let board = gradient(g, 1);
        let comp = gradient(g, 90);
        let (board_before, comp_before) = (board.clone(), comp.clone());
        let mut out = FlatFrame::new(g);
        let (mut bm, mut cm) = (Mask::new(g), Mask::new(g));

        composite_and_mask(&board, &comp, &mut out, &mut bm, &mut cm, &MaskThresholds::default()).unwrap();

        assert_eq!(board, board_before);
        assert_eq!(comp, comp_before);
    }

    #[test]
    fn banded_matches_sequential() {
        let g = geometry();
        let board = gradient(g, 3);
        let comp = gradient(g, 171);
        let thresholds = MaskThresholds::default();

        let mut expected = FlatFrame::new(g);
        let (mut bm, mut cm) = (Mask::new(g), Mask::new(g));
        composite_and_mask(&board, &comp, &mut expected, &mut bm, &mut cm, &thresholds).unwrap();

        for bands in [2, 3, 5, 16, 40] {
            let mut out = FlatFrame::new(g);
            let (mut bm2, mut cm2) = (Mask::new(g), Mask::new(g));
            composite_and_mask_banded(&board, &comp, &mut out, &mut bm2, &mut cm2, &thresholds, bands).unwrap();
            assert_eq!(out, expected, "{bands} bands");
            assert_eq!(bm2, bm);
            assert_eq!(cm2, cm);
        }
    }

    #[test]
    fn layouts_can_be_mixed() {
        let g = geometry();
        let board = gradient(g, 7);
        let comp = StructuredFrame::from(&gradient(g, 60));
        let thresholds = MaskThresholds::default();

        let mut flat_out = FlatFrame::new(g);
        let mut structured_out = StructuredFrame::new(g);
        let (mut bm, mut cm) = (Mask::new(g), Mask::new(g));
        composite_and_mask(&board, &comp, &mut flat_out, &mut bm, &mut cm, &thresholds).unwrap();
        composite_and_mask(&board, &comp, &mut structured_out, &mut bm, &mut cm, &thresholds).unwrap();

        assert_eq!(FlatFrame::from(&structured_out), flat_out);
    }

    #[test]
    fn mismatched_geometry_is_rejected() {
        let g = geometry();
        let board = FlatFrame::new(g);
        let comp = FlatFrame::new(FrameGeometry::new(8, 8).unwrap());
        let mut out = FlatFrame::new(g);
        let (mut bm, mut cm) = (Mask::new(g), Mask::new(g));
        let err = composite_and_mask(&board, &comp, &mut out, &mut bm, &mut cm, &MaskThresholds::default());
        assert!(matches!(err, Err(VisionError::GeometryMismatch { .. })));
    }

    #[test]
    fn zero_bands_is_rejected() {
        let g = geometry();
        let frame = FlatFrame::new(g);
        let mut out = FlatFrame::new(g);
        let (mut bm, mut cm) = (Mask::new(g), Mask::new(g));
        let err = composite_and_mask_banded(&frame, &frame, &mut out, &mut bm, &mut cm, &MaskThresholds::default(), 0);
        assert!(matches!(err, Err(VisionError::InvalidConfig(_))));
    }

    #[test]
    fn inverted_thresholds_fail_validation() {
        let thresholds = MaskThresholds {
            board: LumaRange::new(200, 100),
            comp: LumaRange::default(),
        };
        assert!(thresholds.validate().is_err());
        assert!(MaskThresholds::default().validate().is_ok());
    }

    #[test]
    fn preview_replaces_output_with_selected_mask() {
        let g = geometry();
        let mut board_mask = Mask::new(g);
        board_mask.set(4, 4, FOREGROUND);
        let comp_mask = Mask::new(g);
        let mut out = FlatFrame::filled(g, 77, 77, 77);

        render_preview(PreviewMode::Composite, &mut out, &board_mask, &comp_mask).unwrap();
        assert_eq!(out.sample(Plane::Y, 4, 4), 77);

        render_preview(PreviewMode::BoardMask, &mut out, &board_mask, &comp_mask).unwrap();
        assert_eq!(out.sample(Plane::Y, 4, 4), 255);
        assert_eq!(out.sample(Plane::Y, 4, 5), 0);

        render_preview(PreviewMode::CompMask, &mut out, &board_mask, &comp_mask).unwrap();
        assert_eq!(out.sample(Plane::Y, 4, 4), 0);
    }
}
