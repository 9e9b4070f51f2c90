//! Per-process torus topology context.
//!
//! Each of the `dim_x * dim_y` processes gets a unique coordinate on a
//! periodic 2D virtual grid and four neighbor ranks with wraparound
//! adjacency on both axes. Built once at startup, immutable afterwards,
//! and passed by reference to all protocol code instead of living as
//! ambient global state.

use crate::error::{HeatsimError, Result};

/// Identity of one process in the virtual 2D torus.
///
/// The rank-to-coordinate rule is row-major with the y index fastest:
/// `cx = rank / dim_y`, `cy = rank % dim_y`. Axis 0 (x) wraps
/// horizontally between west and east, axis 1 (y) vertically between
/// south and north.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    pub rank: usize,
    pub rank_count: usize,
    pub dim_x: usize,
    pub dim_y: usize,
    pub coords: (usize, usize),
    pub north: usize,
    pub south: usize,
    pub east: usize,
    pub west: usize,
}

impl Topology {
    /// Establish the virtual process grid and this process's place in it.
    ///
    /// `dim_x * dim_y` must equal `rank_count`, or the run cannot proceed.
    /// No data moves here; this only derives coordinates and neighbors.
    pub fn build(dim_x: usize, dim_y: usize, rank: usize, rank_count: usize) -> Result<Self> {
        if dim_x == 0 || dim_y == 0 {
            return Err(HeatsimError::Topology(format!(
                "process grid dimensions must be non-zero, got {dim_x}x{dim_y}"
            )));
        }
        if dim_x * dim_y != rank_count {
            return Err(HeatsimError::Topology(format!(
                "process grid {dim_x}x{dim_y} needs {} processes, have {rank_count}",
                dim_x * dim_y
            )));
        }
        if rank >= rank_count {
            return Err(HeatsimError::Topology(format!(
                "rank {rank} out of range for {rank_count} processes"
            )));
        }

        let (cx, cy) = (rank / dim_y, rank % dim_y);
        let wrap = |c: usize, delta: isize, dim: usize| -> usize {
            (c as isize + delta).rem_euclid(dim as isize) as usize
        };
        let rank_of = |cx: usize, cy: usize| cx * dim_y + cy;

        Ok(Topology {
            rank,
            rank_count,
            dim_x,
            dim_y,
            coords: (cx, cy),
            north: rank_of(cx, wrap(cy, 1, dim_y)),
            south: rank_of(cx, wrap(cy, -1, dim_y)),
            east: rank_of(wrap(cx, 1, dim_x), cy),
            west: rank_of(wrap(cx, -1, dim_x), cy),
        })
    }

    /// Coordinate of an arbitrary rank, the leader's scatter addressing.
    pub fn coords_of(&self, rank: usize) -> (usize, usize) {
        debug_assert!(rank < self.rank_count);
        (rank / self.dim_y, rank % self.dim_y)
    }

    /// Rank owning coordinate `(cx, cy)`.
    pub fn rank_of(&self, cx: usize, cy: usize) -> usize {
        debug_assert!(cx < self.dim_x && cy < self.dim_y);
        cx * self.dim_y + cy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn rank_coordinate_mapping_is_a_bijection() {
        for (dim_x, dim_y) in [(1, 1), (1, 4), (4, 1), (2, 3), (3, 3)] {
            let n = dim_x * dim_y;
            let mut seen = HashSet::new();
            for rank in 0..n {
                let topo = Topology::build(dim_x, dim_y, rank, n).unwrap();
                let (cx, cy) = topo.coords;
                assert!(cx < dim_x && cy < dim_y);
                assert!(seen.insert((cx, cy)), "duplicate coordinate ({cx}, {cy})");
                assert_eq!(topo.rank_of(cx, cy), rank);
                assert_eq!(topo.coords_of(rank), (cx, cy));
            }
            assert_eq!(seen.len(), n);
        }
    }

    #[test]
    fn wraparound_symmetry() {
        // Every rank's north neighbor must name it as its south neighbor,
        // and east/west likewise, including at the grid edges.
        let (dim_x, dim_y) = (3, 2);
        let n = dim_x * dim_y;
        let all: Vec<Topology> = (0..n)
            .map(|r| Topology::build(dim_x, dim_y, r, n).unwrap())
            .collect();
        for topo in &all {
            assert_eq!(all[topo.north].south, topo.rank);
            assert_eq!(all[topo.south].north, topo.rank);
            assert_eq!(all[topo.east].west, topo.rank);
            assert_eq!(all[topo.west].east, topo.rank);
        }
    }

    #[test]
    fn edge_coordinates_wrap_to_opposite_edge() {
        let n = 3 * 2;
        let topo = Topology::build(3, 2, 0, n).unwrap();
        assert_eq!(topo.coords, (0, 0));
        assert_eq!(topo.coords_of(topo.west), (2, 0));
        assert_eq!(topo.coords_of(topo.south), (0, 1));
    }

    #[test]
    fn single_process_is_its_own_four_neighbors() {
        let topo = Topology::build(1, 1, 0, 1).unwrap();
        assert_eq!(topo.north, 0);
        assert_eq!(topo.south, 0);
        assert_eq!(topo.east, 0);
        assert_eq!(topo.west, 0);
    }

    #[test]
    fn shape_mismatch_is_topology_error() {
        assert!(matches!(
            Topology::build(2, 2, 0, 3),
            Err(HeatsimError::Topology(_))
        ));
        assert!(matches!(
            Topology::build(0, 2, 0, 0),
            Err(HeatsimError::Topology(_))
        ));
        assert!(matches!(
            Topology::build(2, 2, 4, 4),
            Err(HeatsimError::Topology(_))
        ));
    }
}
