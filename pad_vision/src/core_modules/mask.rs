// THEORY:
// A `Mask` is the occupancy grid produced by the masking pass and consumed by
// the centroid search. It has one byte per luma pixel, stored with the same
// column-major index as the luma plane, and every cell is in one of three
// states:
//
// - `BACKGROUND` (0): not part of any pad.
// - `FOREGROUND` (1): part of a pad, not yet claimed by a search.
// - `VISITED`    (2): part of a pad, already claimed by a search.
//
// The third state is what keeps a pixel from being counted twice: a search
// only ever expands into cells that are still `FOREGROUND`, and flips them to
// `VISITED` as it claims them. The mask is therefore scratch space that the
// search consumes; it is reset by the next masking pass.

use crate::core_modules::geometry::FrameGeometry;
use crate::error::{Result, VisionError};

pub type Cell = u8;

pub const BACKGROUND: Cell = 0;
pub const FOREGROUND: Cell = 1;
pub const VISITED: Cell = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    geometry: FrameGeometry,
    cells: Vec<Cell>,
}

impl Mask {
    /// An all-background mask.
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            cells: vec![BACKGROUND; geometry.luma_len()],
        }
    }

    pub fn from_cells(geometry: FrameGeometry, cells: Vec<Cell>) -> Result<Self> {
        if cells.len() != geometry.luma_len() {
            return Err(VisionError::BufferSize {
                expected: geometry.luma_len(),
                found: cells.len(),
            });
        }
        Ok(Self { geometry, cells })
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Cell at (x, y). Panics when (x, y) is off the mask.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Cell {
        self.assert_contains(x, y);
        self.peek(x, y)
    }

    /// Panics when (x, y) is off the mask.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, cell: Cell) {
        self.assert_contains(x, y);
        self.mark(x, y, cell);
    }

    pub fn try_get(&self, x: u32, y: u32) -> Result<Cell> {
        self.geometry.check_contains(x, y)?;
        Ok(self.peek(x, y))
    }

    pub fn try_set(&mut self, x: u32, y: u32, cell: Cell) -> Result<()> {
        self.geometry.check_contains(x, y)?;
        self.mark(x, y, cell);
        Ok(())
    }

    /// Unchecked read for callers that already hold an in-frame coordinate.
    #[inline]
    pub(crate) fn peek(&self, x: u32, y: u32) -> Cell {
        self.cells[self.geometry.luma_index(x, y)]
    }

    #[inline]
    pub(crate) fn mark(&mut self, x: u32, y: u32, cell: Cell) {
        let index = self.geometry.luma_index(x, y);
        self.cells[index] = cell;
    }

    #[inline]
    fn assert_contains(&self, x: u32, y: u32) {
        assert!(
            self.geometry.contains(x, y),
            "mask coordinate ({x}, {y}) is outside {}",
            self.geometry
        );
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Marks every pixel of the axis-aligned rectangle `[x0, x1) x [y0, y1)` with `cell`.
    pub fn fill_rect(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, cell: Cell) -> Result<()> {
        if x1 > self.geometry.width() || y1 > self.geometry.height() {
            return Err(VisionError::OutOfBounds {
                x: x1 as i64,
                y: y1 as i64,
            });
        }
        for x in x0..x1 {
            let start = self.geometry.luma_index(x, y0);
            let end = self.geometry.luma_index(x, y1.max(y0));
            self.cells[start..end].fill(cell);
        }
        Ok(())
    }

    /// Forces the outermost ring of cells to background.
    pub fn clear_border(&mut self) {
        let (width, height) = (self.geometry.width(), self.geometry.height());

        // First and last columns are contiguous runs in column-major order.
        let column = height as usize;
        self.cells[..column].fill(BACKGROUND);
        let last = self.geometry.luma_index(width - 1, 0);
        self.cells[last..last + column].fill(BACKGROUND);

        for x in 1..width - 1 {
            self.mark(x, 0, BACKGROUND);
            self.mark(x, height - 1, BACKGROUND);
        }
    }

    pub fn is_border_clear(&self) -> bool {
        let g = self.geometry;
        (0..g.width())
            .flat_map(|x| (0..g.height()).map(move |y| (x, y)))
            .filter(|&(x, y)| g.is_border(x, y))
            .all(|(x, y)| self.get(x, y) == BACKGROUND)
    }

    pub fn count(&self, cell: Cell) -> usize {
        self.cells.iter().filter(|&&c| c == cell).count()
    }
}
