//! Leader/worker roles for initial tile distribution and final collection.
//!
//! Rank 0 is the leader: it owns the full field, cuts it into tiles, and
//! scatters one to each worker; at shutdown it gathers the finished tiles
//! back into the directory. Every other rank is a worker. The asymmetry is
//! modeled as two explicit roles selected once from the resolved rank, so
//! protocol code never branches on rank.

use crate::cart::Cart2d;
use crate::codec::{DataLayout, TileHeader};
use crate::error::{HeatsimError, Result};
use crate::grid::Grid;
use crate::halo;
use crate::topology::Topology;
use crate::transport::{Tag, Transport};

/// Tag for scatter and gather tile payloads. Halo traffic uses its own
/// tag range, so a step never matches a stray tile message.
pub const TAG_TILE: Tag = 0;

/// Rank 0's side of the protocol: decompose + scatter + gather.
pub struct Leader<'a> {
    transport: &'a dyn Transport,
    topology: &'a Topology,
}

impl<'a> Leader<'a> {
    pub fn new(transport: &'a dyn Transport, topology: &'a Topology) -> Result<Self> {
        if topology.rank != 0 {
            return Err(HeatsimError::Topology(format!(
                "leader role requires rank 0, this process is rank {}",
                topology.rank
            )));
        }
        Ok(Leader {
            transport,
            topology,
        })
    }

    /// Send every non-leader rank its tile: header first, then data, so
    /// the receiver can allocate before the payload arrives. Strictly
    /// sequential per destination; destinations are independent.
    ///
    /// Returns the leader's own tile re-padded for exchange, taken from
    /// the directory without a network round-trip.
    pub fn scatter(&self, cart: &Cart2d) -> Result<Grid> {
        let _span = tracing::info_span!("scatter", ranks = self.topology.rank_count).entered();
        for dest in 1..self.topology.rank_count {
            let (cx, cy) = self.topology.coords_of(dest);
            let tile = cart.grid(cx, cy).ok_or_else(|| {
                HeatsimError::Transfer(format!("no tile at ({cx}, {cy}) for rank {dest}"))
            })?;
            self.transport
                .send_header(dest, &TileHeader::for_grid(tile))?;
            self.transport
                .send_data(dest, TAG_TILE, &tile.data, &DataLayout::full_tile(tile))?;
            tracing::debug!(
                dest,
                cx,
                cy,
                width = tile.width,
                height = tile.height,
                "tile sent"
            );
        }

        let (cx, cy) = self.topology.coords;
        let own = cart
            .grid(cx, cy)
            .ok_or_else(|| HeatsimError::Transfer(format!("no tile at leader coordinate ({cx}, {cy})")))?;
        own.with_padding(1)
    }

    /// Collect every rank's finished padding-0 tile into its directory
    /// slot, one rank at a time. `own` is the leader's finished tile.
    pub fn gather(&self, own: &Grid, cart: &mut Cart2d) -> Result<()> {
        let _span = tracing::info_span!("gather", ranks = self.topology.rank_count).entered();
        let (cx, cy) = self.topology.coords;
        cart.set(cx, cy, own.strip_padding());

        for src in 1..self.topology.rank_count {
            let (cx, cy) = self.topology.coords_of(src);
            let tile = cart.grid_mut(cx, cy).ok_or_else(|| {
                HeatsimError::Transfer(format!("no tile slot at ({cx}, {cy}) for rank {src}"))
            })?;
            let layout = DataLayout::full_tile(tile);
            self.transport
                .recv_data(src, TAG_TILE, &mut tile.data, &layout)?;
            tracing::debug!(src, cx, cy, "tile collected");
        }
        Ok(())
    }
}

/// A non-leader rank's side: receive a tile, exchange halos, send the
/// result back.
pub struct Worker<'a> {
    transport: &'a dyn Transport,
    topology: &'a Topology,
}

impl<'a> Worker<'a> {
    pub fn new(transport: &'a dyn Transport, topology: &'a Topology) -> Result<Self> {
        if topology.rank == 0 {
            return Err(HeatsimError::Topology(
                "rank 0 is the leader, not a worker".into(),
            ));
        }
        Ok(Worker {
            transport,
            topology,
        })
    }

    /// Blocking receive of this rank's tile from the leader.
    ///
    /// The header arrives first and sizes the allocation; the grid is
    /// created with padding 1 (gaining the halo border needed for
    /// exchange) and the contiguous payload lands in its interior.
    pub fn receive_tile(&self) -> Result<Grid> {
        let header = self.transport.recv_header(0)?;
        let mut grid = Grid::new(header.width as usize, header.height as usize, 1)?;
        let interior = DataLayout::interior(&grid);
        self.transport
            .recv_data(0, TAG_TILE, &mut grid.data, &interior)?;
        tracing::debug!(
            rank = self.topology.rank,
            width = grid.width,
            height = grid.height,
            "tile received"
        );
        Ok(grid)
    }

    /// One step's border exchange with the four neighbors.
    pub fn exchange(&self, grid: &mut Grid, step: usize) -> Result<()> {
        halo::exchange_borders(self.transport, self.topology, grid, step)
    }

    /// Strip the halo and send the finished interior back to the leader.
    pub fn send_result(&self, grid: &Grid) -> Result<()> {
        let flat = grid.strip_padding();
        self.transport
            .send_data(0, TAG_TILE, &flat.data, &DataLayout::full_tile(&flat))
    }
}
