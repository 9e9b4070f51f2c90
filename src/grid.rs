//! Padded 2D tile buffer: one process's rectangular portion of the field.
//!
//! A grid owns `width * height` interior cells plus a `padding`-wide halo
//! border (0 or 1 in this design), stored row-major in one contiguous
//! buffer with a fixed padded-row stride. Cells are addressed with signed,
//! padding-relative coordinates: `(-1, -1)` is the bottom-left halo corner
//! of a padding-1 grid, `(0, 0)` the bottom-left interior cell.

use crate::error::{HeatsimError, Result};

/// One tile of the decomposed field, with optional halo border.
///
/// The buffer holds `(width + 2*padding) * (height + 2*padding)` values;
/// cell `(x, y)` lives at offset `(y + padding) * padded_width + (x + padding)`.
/// Exclusively owned by one process; never shared.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub padding: usize,
    pub data: Vec<f64>,
}

impl Grid {
    /// Allocate a zero-initialized grid.
    ///
    /// Fails with `AllocationError` when a dimension is zero or the buffer
    /// size overflows. The dimensions may come off the wire (a received
    /// tile header), so this validates rather than asserts.
    pub fn new(width: usize, height: usize, padding: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(HeatsimError::Allocation(format!(
                "grid dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let padded_width = width
            .checked_add(2 * padding)
            .ok_or_else(|| HeatsimError::Allocation("grid width overflow".into()))?;
        let padded_height = height
            .checked_add(2 * padding)
            .ok_or_else(|| HeatsimError::Allocation("grid height overflow".into()))?;
        let len = padded_width
            .checked_mul(padded_height)
            .ok_or_else(|| HeatsimError::Allocation("grid buffer size overflow".into()))?;
        Ok(Grid {
            width,
            height,
            padding,
            data: vec![0.0; len],
        })
    }

    /// Row stride of the buffer: `width + 2 * padding`.
    pub fn padded_width(&self) -> usize {
        self.width + 2 * self.padding
    }

    /// Buffer offset of cell `(x, y)` in padding-relative coordinates.
    ///
    /// Valid domain is `[-padding, width+padding) x [-padding, height+padding)`;
    /// anything outside is a caller bug.
    pub fn offset_of(&self, x: isize, y: isize) -> usize {
        let p = self.padding as isize;
        debug_assert!(
            x >= -p && x < self.width as isize + p,
            "x={x} outside [-{p}, {}+{p})",
            self.width
        );
        debug_assert!(
            y >= -p && y < self.height as isize + p,
            "y={y} outside [-{p}, {}+{p})",
            self.height
        );
        (y + p) as usize * self.padded_width() + (x + p) as usize
    }

    pub fn cell(&self, x: isize, y: isize) -> f64 {
        self.data[self.offset_of(x, y)]
    }

    pub fn cell_mut(&mut self, x: isize, y: isize) -> &mut f64 {
        let offset = self.offset_of(x, y);
        &mut self.data[offset]
    }

    /// Copy the interior into a new grid with the given padding.
    ///
    /// Used by the leader to re-pad its own tile for exchange without a
    /// network round-trip. Halo cells are not carried over.
    pub fn with_padding(&self, padding: usize) -> Result<Grid> {
        let mut out = Grid::new(self.width, self.height, padding)?;
        for y in 0..self.height {
            let src = self.offset_of(0, y as isize);
            let dst = out.offset_of(0, y as isize);
            out.data[dst..dst + self.width].copy_from_slice(&self.data[src..src + self.width]);
        }
        Ok(out)
    }

    /// Copy the interior into a padding-0 grid, dropping the halo.
    ///
    /// The result is what gets sent back to the leader at gather time.
    pub fn strip_padding(&self) -> Grid {
        if self.padding == 0 {
            return self.clone();
        }
        // Strictly smaller buffer than self, so allocation cannot fail.
        let mut data = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            let src = self.offset_of(0, y as isize);
            data.extend_from_slice(&self.data[src..src + self.width]);
        }
        Grid {
            width: self.width,
            height: self.height,
            padding: 0,
            data,
        }
    }
}
