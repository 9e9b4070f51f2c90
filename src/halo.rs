//! Steady-state four-neighbor border exchange.
//!
//! Every simulation step, each rank sends its four interior edges and
//! receives its four neighbors' edges into its own halo border:
//!
//! ```text
//!     +-------------+            +-------------+
//!     | x x x x x x |            | x m n o p x |
//!     | x A B C D x |            | d A B C D a |
//!     | x E F G H x |    -->     | h E F G H e |
//!     | x I J K L x |            | l I J K L i |
//!     | x M N O P x |            | p M N O P m |
//!     | x x x x x x |            | x a b c d x |
//!     +-------------+            +-------------+
//! ```
//!
//! (lowercase: the same edge of the respective neighbor; corners are never
//! written, only orthogonal neighbors contribute). All eight transfers are
//! issued before a single bulk wait, so the transport can overlap them.

use crate::codec::DataLayout;
use crate::error::{HeatsimError, Result};
use crate::grid::Grid;
use crate::topology::Topology;
use crate::transport::{HaloOp, OpKind, Tag, Transport};

// Tags name the direction a border message travels, which keeps matching
// unambiguous when neighbors alias (1-wide torus axes, where a rank's
// north and south neighbor are the same process, or itself).
pub const TAG_NORTHBOUND: Tag = 1;
pub const TAG_SOUTHBOUND: Tag = 2;
pub const TAG_EASTBOUND: Tag = 3;
pub const TAG_WESTBOUND: Tag = 4;

/// Exchange `grid`'s borders with the four torus neighbors.
///
/// Requires `padding == 1`: the halo rows and columns are the receive
/// targets. Rows travel as contiguous runs, columns strided by the padded
/// width. Any failure in the batch is fatal to the step; there is no
/// partial-halo continuation.
pub fn exchange_borders(
    transport: &dyn Transport,
    topology: &Topology,
    grid: &mut Grid,
    step: usize,
) -> Result<()> {
    if grid.padding != 1 {
        return Err(HeatsimError::Exchange {
            step,
            detail: format!("exchange requires a padding-1 grid, got padding {}", grid.padding),
        });
    }

    let ops = border_ops(grid, topology);

    tracing::trace!(
        step,
        rank = topology.rank,
        north = topology.north,
        south = topology.south,
        east = topology.east,
        west = topology.west,
        "exchanging borders"
    );
    transport
        .exchange(&mut grid.data, &ops)
        .map_err(|e| HeatsimError::Exchange {
            step,
            detail: e.to_string(),
        })
}

/// The eight operations of one border exchange. Sends address interior
/// edge cells, receives the halo; the two sets never share a cell.
fn border_ops(grid: &Grid, topology: &Topology) -> [HaloOp; 8] {
    let w = grid.width as isize;
    let h = grid.height as isize;
    [
        // Interior edges out to the neighbors.
        HaloOp {
            kind: OpKind::Send,
            peer: topology.north,
            tag: TAG_NORTHBOUND,
            layout: DataLayout::row(grid, h - 1),
        },
        HaloOp {
            kind: OpKind::Send,
            peer: topology.south,
            tag: TAG_SOUTHBOUND,
            layout: DataLayout::row(grid, 0),
        },
        HaloOp {
            kind: OpKind::Send,
            peer: topology.west,
            tag: TAG_WESTBOUND,
            layout: DataLayout::column(grid, 0),
        },
        HaloOp {
            kind: OpKind::Send,
            peer: topology.east,
            tag: TAG_EASTBOUND,
            layout: DataLayout::column(grid, w - 1),
        },
        // Neighbor edges into our halo. What arrives from the north
        // neighbor is its southbound message, and so on around.
        HaloOp {
            kind: OpKind::Recv,
            peer: topology.north,
            tag: TAG_SOUTHBOUND,
            layout: DataLayout::row(grid, h),
        },
        HaloOp {
            kind: OpKind::Recv,
            peer: topology.south,
            tag: TAG_NORTHBOUND,
            layout: DataLayout::row(grid, -1),
        },
        HaloOp {
            kind: OpKind::Recv,
            peer: topology.west,
            tag: TAG_EASTBOUND,
            layout: DataLayout::column(grid, -1),
        },
        HaloOp {
            kind: OpKind::Recv,
            peer: topology.east,
            tag: TAG_WESTBOUND,
            layout: DataLayout::column(grid, w),
        },
    ]
}
