// Debug snapshots: writes a luma plane or a mask as a greyscale PNG. Buffers in
// the engine are column-major, so both helpers transpose into the row-major
// order image viewers expect.

use crate::core_modules::frame::YuvFrame;
use crate::core_modules::geometry::FrameGeometry;
use crate::core_modules::mask::{Mask, BACKGROUND};
use crate::error::Result;
use image::ImageEncoder;
use std::path::Path;

fn to_row_major(geometry: FrameGeometry, column_major: &[u8], map: impl Fn(u8) -> u8) -> Vec<u8> {
    let (width, height) = (geometry.width(), geometry.height());
    let mut rows = Vec::with_capacity(geometry.luma_len());
    for y in 0..height {
        for x in 0..width {
            rows.push(map(column_major[geometry.luma_index(x, y)]));
        }
    }
    rows
}

fn save_gray(path: &Path, geometry: FrameGeometry, rows: &[u8]) -> Result<()> {
    let output = std::io::BufWriter::new(std::fs::File::create(path)?);
    let encoder = image::codecs::png::PngEncoder::new(output);
    encoder.write_image(rows, geometry.width(), geometry.height(), image::ExtendedColorType::L8)?;
    Ok(())
}

/// Writes the luma plane of `frame` to `path` as an 8-bit greyscale PNG.
pub fn save_luma_png<F: YuvFrame + ?Sized>(frame: &F, path: impl AsRef<Path>) -> Result<()> {
    let geometry = frame.geometry();
    let rows = to_row_major(geometry, frame.planes().y, |luma| luma);
    save_gray(path.as_ref(), geometry, &rows)
}

/// Writes `mask` to `path` as a black-and-white PNG (any foreground state is white).
pub fn save_mask_png(mask: &Mask, path: impl AsRef<Path>) -> Result<()> {
    let geometry = mask.geometry();
    let rows = to_row_major(geometry, mask.cells(), |cell| if cell == BACKGROUND { 0 } else { 255 });
    save_gray(path.as_ref(), geometry, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::FlatFrame;
    use crate::core_modules::geometry::Plane;
    use crate::core_modules::mask::{FOREGROUND, VISITED};

    #[test]
    fn luma_png_is_row_major() {
        let dir = tempfile::tempdir().expect("Error creating temp dir.");
        let path = dir.path().join("luma.png");
        let g = FrameGeometry::new(8, 8).unwrap();
        let mut frame = FlatFrame::new(g);
        frame.set_sample(Plane::Y, 6, 1, 200);

        save_luma_png(&frame, &path).expect("Error Saving File.");

        let image = image::open(&path).unwrap().to_luma8();
        assert_eq!(image.dimensions(), (8, 8));
        assert_eq!(image.get_pixel(6, 1).0[0], 200);
        assert_eq!(image.get_pixel(1, 6).0[0], 0);
    }

    #[test]
    fn mask_png_is_black_and_white() {
        let dir = tempfile::tempdir().expect("Error creating temp dir.");
        let path = dir.path().join("mask.png");
        let g = FrameGeometry::new(8, 8).unwrap();
        let mut mask = Mask::new(g);
        mask.set(2, 5, FOREGROUND);
        mask.set(3, 5, VISITED);

        save_mask_png(&mask, &path).expect("Error Saving File.");

        let image = image::open(&path).unwrap().to_luma8();
        assert_eq!(image.get_pixel(2, 5).0[0], 255);
        assert_eq!(image.get_pixel(3, 5).0[0], 255);
        assert_eq!(image.get_pixel(5, 2).0[0], 0);
    }

    #[test]
    fn unwritable_path_is_an_io_error() {
        let g = FrameGeometry::new(8, 8).unwrap();
        let err = save_mask_png(&Mask::new(g), "/nonexistent-dir/mask.png").unwrap_err();
        assert!(matches!(err, crate::error::VisionError::Io(_)));
    }
}
