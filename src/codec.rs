//! Wire-format descriptors for moving grid data between processes.
//!
//! Two descriptors cover every transfer in the protocol:
//!
//! - [`TileHeader`]: fixed-size record of `{width, height, padding}`, sent
//!   ahead of tile data so the receiver can allocate before the payload
//!   arrives. Three unsigned 32-bit fields in that order on the wire.
//! - [`DataLayout`]: describes where a payload's elements live inside a
//!   grid buffer, either as one contiguous run or as a strided series of
//!   blocks. Borders and padded interiors are described in place; nothing
//!   here copies data.

use crate::grid::Grid;

#[cfg(feature = "distributed")]
use mpi::traits::Equivalence;

/// Size of an encoded [`TileHeader`] in bytes.
pub const HEADER_BYTES: usize = 12;

/// Tile dimensions sent ahead of the data so the receiver can size its
/// allocation. Carries the *sender's* padding; the receiver chooses its
/// own (workers allocate with padding 1 regardless).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "distributed", derive(Equivalence))]
pub struct TileHeader {
    pub width: u32,
    pub height: u32,
    pub padding: u32,
}

impl TileHeader {
    pub fn for_grid(grid: &Grid) -> Self {
        TileHeader {
            width: grid.width as u32,
            height: grid.height as u32,
            padding: grid.padding as u32,
        }
    }

    /// Encode as width, height, padding: three little-endian u32s.
    pub fn to_bytes(&self) -> [u8; HEADER_BYTES] {
        let mut out = [0u8; HEADER_BYTES];
        out[0..4].copy_from_slice(&self.width.to_le_bytes());
        out[4..8].copy_from_slice(&self.height.to_le_bytes());
        out[8..12].copy_from_slice(&self.padding.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; HEADER_BYTES]) -> Self {
        let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        TileHeader {
            width: u32_at(0),
            height: u32_at(4),
            padding: u32_at(8),
        }
    }
}

/// Placement of a payload's elements within a grid buffer.
///
/// `Contiguous` covers a full padding-0 tile and the north/south row
/// borders (one physical row each). `Strided` covers everything that
/// crosses rows: the east/west column borders (`block = 1`) and the
/// interior of a padded tile (`block = width`). The stride is always the
/// *padded* row length, not the logical width.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataLayout {
    Contiguous {
        offset: usize,
        len: usize,
    },
    Strided {
        offset: usize,
        count: usize,
        block: usize,
        stride: usize,
    },
}

impl DataLayout {
    /// The whole buffer of a padding-0 tile.
    pub fn full_tile(grid: &Grid) -> Self {
        debug_assert_eq!(grid.padding, 0, "full tile layout requires padding 0");
        DataLayout::Contiguous {
            offset: 0,
            len: grid.width * grid.height,
        }
    }

    /// The interior cells of a grid, excluding any halo.
    ///
    /// For a padded grid the interior rows are separated by the halo
    /// columns, so this is strided; a contiguous `width * height` payload
    /// received through it lands in the right cells of the padded buffer.
    pub fn interior(grid: &Grid) -> Self {
        if grid.padding == 0 {
            return Self::full_tile(grid);
        }
        DataLayout::Strided {
            offset: grid.offset_of(0, 0),
            count: grid.height,
            block: grid.width,
            stride: grid.padded_width(),
        }
    }

    /// One interior-width row at height `y`: the north/south border shape.
    pub fn row(grid: &Grid, y: isize) -> Self {
        DataLayout::Contiguous {
            offset: grid.offset_of(0, y),
            len: grid.width,
        }
    }

    /// One interior-height column at `x`: the east/west border shape.
    /// `height` single elements spaced a padded row apart.
    pub fn column(grid: &Grid, x: isize) -> Self {
        DataLayout::Strided {
            offset: grid.offset_of(x, 0),
            count: grid.height,
            block: 1,
            stride: grid.padded_width(),
        }
    }

    /// Number of `f64` elements the layout describes.
    pub fn element_count(&self) -> usize {
        match *self {
            DataLayout::Contiguous { len, .. } => len,
            DataLayout::Strided { count, block, .. } => count * block,
        }
    }

    /// Buffer offset of every element the layout touches, in wire order.
    pub fn element_offsets(&self) -> Vec<usize> {
        match *self {
            DataLayout::Contiguous { offset, len } => (offset..offset + len).collect(),
            DataLayout::Strided {
                offset,
                count,
                block,
                stride,
            } => (0..count)
                .flat_map(|i| {
                    let start = offset + i * stride;
                    start..start + block
                })
                .collect(),
        }
    }

    /// Start offset within the grid buffer.
    pub fn offset(&self) -> usize {
        match *self {
            DataLayout::Contiguous { offset, .. } => offset,
            DataLayout::Strided { offset, .. } => offset,
        }
    }

    /// Read the described elements out of `buf` in wire order.
    pub fn pack(&self, buf: &[f64]) -> Vec<f64> {
        match *self {
            DataLayout::Contiguous { offset, len } => buf[offset..offset + len].to_vec(),
            DataLayout::Strided {
                offset,
                count,
                block,
                stride,
            } => {
                let mut out = Vec::with_capacity(count * block);
                for i in 0..count {
                    let start = offset + i * stride;
                    out.extend_from_slice(&buf[start..start + block]);
                }
                out
            }
        }
    }

    /// Write `values` (wire order) into `buf` at the described positions.
    pub fn unpack(&self, buf: &mut [f64], values: &[f64]) {
        debug_assert_eq!(values.len(), self.element_count());
        match *self {
            DataLayout::Contiguous { offset, len } => {
                buf[offset..offset + len].copy_from_slice(values);
            }
            DataLayout::Strided {
                offset,
                count,
                block,
                stride,
            } => {
                for i in 0..count {
                    let start = offset + i * stride;
                    buf[start..start + block].copy_from_slice(&values[i * block..(i + 1) * block]);
                }
            }
        }
    }
}
