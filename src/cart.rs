//! Leader-side directory of tiles keyed by torus coordinate.
//!
//! Used only before scatter and after gather. Coordinates follow the same
//! rank-to-coordinate rule as [`crate::topology::Topology`], so the tile at
//! a coordinate always belongs to the rank the topology assigns there.

use crate::error::{HeatsimError, Result};
use crate::grid::Grid;

/// 2D map from tile coordinate to grid, one slot per process.
#[derive(Debug)]
pub struct Cart2d {
    pub dim_x: usize,
    pub dim_y: usize,
    grids: Vec<Option<Grid>>,
}

impl Cart2d {
    pub fn new(dim_x: usize, dim_y: usize) -> Result<Self> {
        if dim_x == 0 || dim_y == 0 {
            return Err(HeatsimError::Topology(format!(
                "process grid dimensions must be non-zero, got {dim_x}x{dim_y}"
            )));
        }
        let mut grids = Vec::with_capacity(dim_x * dim_y);
        grids.resize_with(dim_x * dim_y, || None);
        Ok(Cart2d {
            dim_x,
            dim_y,
            grids,
        })
    }

    // Same slot rule as Topology::rank_of, so slot index == owner rank.
    fn slot(&self, cx: usize, cy: usize) -> usize {
        debug_assert!(cx < self.dim_x && cy < self.dim_y);
        cx * self.dim_y + cy
    }

    pub fn grid(&self, cx: usize, cy: usize) -> Option<&Grid> {
        self.grids[self.slot(cx, cy)].as_ref()
    }

    pub fn grid_mut(&mut self, cx: usize, cy: usize) -> Option<&mut Grid> {
        let slot = self.slot(cx, cy);
        self.grids[slot].as_mut()
    }

    pub fn set(&mut self, cx: usize, cy: usize, grid: Grid) {
        let slot = self.slot(cx, cy);
        self.grids[slot] = Some(grid);
    }
}

/// Deterministic sizes for splitting `total` cells over `parts` tiles:
/// `total / parts` each, the first `total % parts` tiles one cell wider.
fn split_sizes(total: usize, parts: usize) -> Vec<usize> {
    let base = total / parts;
    let extra = total % parts;
    (0..parts)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

/// Cut a padding-0 field into `dim_x * dim_y` padding-0 tiles.
///
/// Tile dimensions differ by at most one cell per axis; every field cell
/// lands in exactly one tile. Fails when the field is smaller than the
/// process grid (a tile would be empty).
pub fn decompose(field: &Grid, dim_x: usize, dim_y: usize) -> Result<Cart2d> {
    if field.padding != 0 {
        return Err(HeatsimError::Allocation(
            "decompose expects an unpadded field".into(),
        ));
    }
    let mut cart = Cart2d::new(dim_x, dim_y)?;
    if field.width < dim_x || field.height < dim_y {
        return Err(HeatsimError::Allocation(format!(
            "{}x{} field cannot cover a {dim_x}x{dim_y} process grid",
            field.width, field.height
        )));
    }

    let widths = split_sizes(field.width, dim_x);
    let heights = split_sizes(field.height, dim_y);

    let mut x_off = 0;
    for (cx, &tile_w) in widths.iter().enumerate() {
        let mut y_off = 0;
        for (cy, &tile_h) in heights.iter().enumerate() {
            let mut tile = Grid::new(tile_w, tile_h, 0)?;
            for y in 0..tile_h {
                let src = field.offset_of(x_off as isize, (y_off + y) as isize);
                let dst = tile.offset_of(0, y as isize);
                tile.data[dst..dst + tile_w].copy_from_slice(&field.data[src..src + tile_w]);
            }
            cart.set(cx, cy, tile);
            y_off += tile_h;
        }
        x_off += tile_w;
    }
    Ok(cart)
}

fn tile_at(cart: &Cart2d, cx: usize, cy: usize) -> Result<&Grid> {
    cart.grid(cx, cy)
        .ok_or_else(|| HeatsimError::Transfer(format!("missing tile at coordinate ({cx}, {cy})")))
}

/// Rebuild the full field from a fully populated directory, the inverse
/// of [`decompose`]. Called after gather.
pub fn assemble(cart: &Cart2d) -> Result<Grid> {
    let width: usize = (0..cart.dim_x)
        .map(|cx| tile_at(cart, cx, 0).map(|g| g.width))
        .sum::<Result<usize>>()?;
    let height: usize = (0..cart.dim_y)
        .map(|cy| tile_at(cart, 0, cy).map(|g| g.height))
        .sum::<Result<usize>>()?;
    let mut field = Grid::new(width, height, 0)?;

    let mut x_off = 0;
    for cx in 0..cart.dim_x {
        let mut y_off = 0;
        let mut tile_w = 0;
        for cy in 0..cart.dim_y {
            let tile = tile_at(cart, cx, cy)?;
            if tile.padding != 0 {
                return Err(HeatsimError::Transfer(format!(
                    "tile at ({cx}, {cy}) still padded"
                )));
            }
            for y in 0..tile.height {
                let src = tile.offset_of(0, y as isize);
                let dst = field.offset_of(x_off as isize, (y_off + y) as isize);
                field.data[dst..dst + tile.width]
                    .copy_from_slice(&tile.data[src..src + tile.width]);
            }
            y_off += tile.height;
            tile_w = tile.width;
        }
        x_off += tile_w;
    }
    Ok(field)
}
