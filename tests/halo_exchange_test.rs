//! Multi-rank halo exchange tests over the in-process mesh, one thread
//! per rank.

use heatsim::grid::Grid;
use heatsim::halo::exchange_borders;
use heatsim::topology::Topology;
use heatsim::transport::MemoryMesh;

/// Run one exchange on every rank of a `dim_x` x `dim_y` torus, with each
/// rank's tile produced by `make_tile`, and return the exchanged tiles.
fn exchange_on_torus(
    dim_x: usize,
    dim_y: usize,
    make_tile: impl Fn(usize) -> Grid + Sync,
) -> Vec<Grid> {
    let rank_count = dim_x * dim_y;
    let mesh = MemoryMesh::new(rank_count);
    let mut out = Vec::new();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..rank_count)
            .map(|rank| {
                let transport = mesh.endpoint(rank);
                let make_tile = &make_tile;
                scope.spawn(move || {
                    let topology = Topology::build(dim_x, dim_y, rank, rank_count).unwrap();
                    let mut tile = make_tile(rank);
                    exchange_borders(&transport, &topology, &mut tile, 0).unwrap();
                    tile
                })
            })
            .collect();
        for handle in handles {
            out.push(handle.join().unwrap());
        }
    });
    out
}

/// A 4x4 tile whose interior is A..P (1..=16) offset by 100 * rank, so
/// every rank's edges are distinguishable.
fn labeled_tile(rank: usize) -> Grid {
    let mut tile = Grid::new(4, 4, 1).unwrap();
    for y in 0..4 {
        for x in 0..4 {
            *tile.cell_mut(x, y) = (rank * 100 + (y as usize * 4 + x as usize) + 1) as f64;
        }
    }
    tile
}

#[test]
fn each_halo_edge_equals_the_neighbor_interior_edge() {
    let (dim_x, dim_y) = (2, 2);
    let tiles = exchange_on_torus(dim_x, dim_y, labeled_tile);
    let topos: Vec<Topology> = (0..4)
        .map(|r| Topology::build(dim_x, dim_y, r, 4).unwrap())
        .collect();

    for (rank, tile) in tiles.iter().enumerate() {
        let topo = &topos[rank];
        // The exchanged tiles all started from labeled_tile(rank), so the
        // neighbor's pre-exchange interior is reconstructable.
        let north = labeled_tile(topo.north);
        let south = labeled_tile(topo.south);
        let east = labeled_tile(topo.east);
        let west = labeled_tile(topo.west);

        for x in 0..4 {
            // Top halo row = north neighbor's bottom interior row.
            assert_eq!(tile.cell(x, 4), north.cell(x, 0), "rank {rank} north halo");
            assert_eq!(tile.cell(x, -1), south.cell(x, 3), "rank {rank} south halo");
        }
        for y in 0..4 {
            assert_eq!(tile.cell(4, y), east.cell(0, y), "rank {rank} east halo");
            assert_eq!(tile.cell(-1, y), west.cell(3, y), "rank {rank} west halo");
        }
    }
}

#[test]
fn corner_padding_cells_are_never_written() {
    let tiles = exchange_on_torus(2, 2, |rank| {
        let mut tile = labeled_tile(rank);
        // Sentinel the corners; only orthogonal neighbors contribute, so
        // diagonal corners must survive the exchange untouched.
        *tile.cell_mut(-1, -1) = -7.0;
        *tile.cell_mut(4, -1) = -7.0;
        *tile.cell_mut(-1, 4) = -7.0;
        *tile.cell_mut(4, 4) = -7.0;
        tile
    });
    for tile in &tiles {
        assert_eq!(tile.cell(-1, -1), -7.0);
        assert_eq!(tile.cell(4, -1), -7.0);
        assert_eq!(tile.cell(-1, 4), -7.0);
        assert_eq!(tile.cell(4, 4), -7.0);
    }
}

#[test]
fn strided_column_transfer_does_not_corrupt_adjacent_cells() {
    // A 2x1 torus with tiles of different widths (5 and 3), so the two
    // sides of each east/west transfer address their buffers with
    // different padded row strides. Fill all interior cells with a
    // sentinel pattern and check that nothing but the halo changed.
    const SENTINEL: f64 = 1000.0;
    let width_of = |rank: usize| if rank == 0 { 5 } else { 3 };
    let fill = |rank: usize, x: isize, y: isize| {
        SENTINEL + (rank * 100 + (y as usize) * width_of(rank) + x as usize) as f64
    };

    let tiles = exchange_on_torus(2, 1, |rank| {
        let mut tile = Grid::new(width_of(rank), 3, 1).unwrap();
        for y in 0..3 {
            for x in 0..width_of(rank) as isize {
                *tile.cell_mut(x, y) = fill(rank, x, y);
            }
        }
        tile
    });

    for (rank, tile) in tiles.iter().enumerate() {
        let w = width_of(rank) as isize;
        let other = 1 - rank;
        let other_w = width_of(other) as isize;

        // Interior survives exactly.
        for y in 0..3 {
            for x in 0..w {
                assert_eq!(
                    tile.cell(x, y),
                    fill(rank, x, y),
                    "rank {rank} interior cell ({x}, {y}) corrupted"
                );
            }
        }
        // West halo = other rank's east interior column, east halo its
        // west column (both neighbors are the other rank on a 2-wide axis).
        for y in 0..3 {
            assert_eq!(tile.cell(-1, y), fill(other, other_w - 1, y));
            assert_eq!(tile.cell(w, y), fill(other, 0, y));
        }
        // On a 1-tall torus each rank is its own north and south neighbor.
        for x in 0..w {
            assert_eq!(tile.cell(x, 3), fill(rank, x, 0));
            assert_eq!(tile.cell(x, -1), fill(rank, x, 2));
        }
    }
}

#[test]
fn wide_torus_exchange_matches_topology() {
    // 3x2 torus with 2x2 tiles; verify one non-trivial wraparound edge:
    // the west halo of a coordinate-(0, cy) tile comes from (2, cy).
    let (dim_x, dim_y) = (3, 2);
    let tiles = exchange_on_torus(dim_x, dim_y, |rank| {
        let mut tile = Grid::new(2, 2, 1).unwrap();
        for y in 0..2 {
            for x in 0..2 {
                *tile.cell_mut(x, y) = (rank * 10 + (y as usize) * 2 + x as usize) as f64;
            }
        }
        tile
    });

    let topo0 = Topology::build(dim_x, dim_y, 0, 6).unwrap();
    assert_eq!(topo0.coords, (0, 0));
    let west_rank = topo0.west;
    assert_eq!(topo0.coords_of(west_rank), (2, 0));
    for y in 0..2 {
        // West neighbor's east interior column (x = 1).
        assert_eq!(
            tiles[0].cell(-1, y),
            (west_rank * 10 + (y as usize) * 2 + 1) as f64
        );
    }
}
