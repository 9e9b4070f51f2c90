//! Run driver: role selection and the exchange/compute step loop.
//!
//! The local update rule is an external contract: a pure `&Grid -> Grid`
//! function invoked once per step between exchanges. It must preserve the
//! tile's dimensions and padding. Exchange and compute alternate strictly;
//! a step's exchange never overlaps the previous step's update, because
//! the update may overwrite interior cells that the exchange sends.

use crate::cart;
use crate::error::{HeatsimError, Result};
use crate::grid::Grid;
use crate::protocol::{Leader, Worker};
use crate::stats::Stats;
use crate::topology::Topology;
use crate::transport::Transport;
use std::time::Instant;

fn apply_update<F>(update: &F, tile: &Grid, step: usize) -> Result<Grid>
where
    F: Fn(&Grid) -> Grid,
{
    let next = update(tile);
    if next.width != tile.width || next.height != tile.height || next.padding != tile.padding {
        return Err(HeatsimError::Allocation(format!(
            "local update at step {step} returned a {}x{} padding-{} tile, expected {}x{} padding-{}",
            next.width, next.height, next.padding, tile.width, tile.height, tile.padding
        )));
    }
    Ok(next)
}

/// Rank 0: decompose and scatter `field`, run `steps` exchange/update
/// rounds on the leader's own tile, gather everything back and return the
/// reassembled field. With `steps == 0` the result is the input field,
/// bit for bit.
pub fn run_leader<F>(
    transport: &dyn Transport,
    topology: &Topology,
    field: &Grid,
    steps: usize,
    update: F,
    mut stats: Option<&mut Stats>,
) -> Result<Grid>
where
    F: Fn(&Grid) -> Grid,
{
    let _span = tracing::info_span!("run_leader", steps, ranks = topology.rank_count).entered();
    let leader = Leader::new(transport, topology)?;

    let t = Instant::now();
    let mut cart = cart::decompose(field, topology.dim_x, topology.dim_y)?;
    if let Some(s) = stats.as_deref_mut() {
        s.add_phase("decompose", t.elapsed());
    }

    let t = Instant::now();
    let mut tile = leader.scatter(&cart)?;
    if let Some(s) = stats.as_deref_mut() {
        s.add_phase("scatter", t.elapsed());
    }

    for step in 0..steps {
        let t = Instant::now();
        crate::halo::exchange_borders(transport, topology, &mut tile, step)?;
        if let Some(s) = stats.as_deref_mut() {
            s.exchange += t.elapsed();
        }

        let t = Instant::now();
        tile = apply_update(&update, &tile, step)?;
        if let Some(s) = stats.as_deref_mut() {
            s.compute += t.elapsed();
            s.steps += 1;
        }
    }

    let t = Instant::now();
    leader.gather(&tile, &mut cart)?;
    let field = cart::assemble(&cart)?;
    if let Some(s) = stats.as_deref_mut() {
        s.add_phase("gather", t.elapsed());
    }
    Ok(field)
}

/// Any non-zero rank: receive a tile, run the step loop, send the result
/// back to the leader.
pub fn run_worker<F>(
    transport: &dyn Transport,
    topology: &Topology,
    steps: usize,
    update: F,
) -> Result<()>
where
    F: Fn(&Grid) -> Grid,
{
    let _span =
        tracing::info_span!("run_worker", rank = topology.rank, steps).entered();
    let worker = Worker::new(transport, topology)?;
    let mut tile = worker.receive_tile()?;
    for step in 0..steps {
        worker.exchange(&mut tile, step)?;
        tile = apply_update(&update, &tile, step)?;
    }
    worker.send_result(&tile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryMesh;

    #[test]
    fn update_changing_shape_is_rejected() {
        let tile = Grid::new(3, 3, 1).unwrap();
        let shrink = |_: &Grid| Grid::new(2, 2, 1).unwrap();
        assert!(matches!(
            apply_update(&shrink, &tile, 5),
            Err(HeatsimError::Allocation(_))
        ));
    }

    #[test]
    fn single_rank_run_applies_update_per_step() {
        let mesh = MemoryMesh::new(1);
        let transport = mesh.endpoint(0);
        let topology = Topology::build(1, 1, 0, 1).unwrap();

        let mut field = Grid::new(2, 2, 0).unwrap();
        field.data.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);

        let add_one = |g: &Grid| {
            let mut next = g.clone();
            for y in 0..g.height as isize {
                for x in 0..g.width as isize {
                    *next.cell_mut(x, y) = g.cell(x, y) + 1.0;
                }
            }
            next
        };
        let result = run_leader(&transport, &topology, &field, 3, add_one, None).unwrap();
        assert_eq!(result.data, vec![4.0, 5.0, 6.0, 7.0]);
    }
}
