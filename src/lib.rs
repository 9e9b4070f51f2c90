//! Distributed domain-decomposition and halo-exchange core for 2D stencil
//! simulations.
//!
//! A 2D field of `f64` cells is partitioned across a fixed set of ranks
//! arranged in a periodic 2D torus. Rank 0 (the leader) cuts the field
//! into tiles and scatters them; every rank then alternates a four-neighbor
//! border exchange with a local update, and the leader gathers the result
//! at the end. The numerical update rule is not part of this crate: it is
//! an external `&Grid -> Grid` contract passed into [`sim::run_leader`] /
//! [`sim::run_worker`].
//!
//! Transports: an in-process mailbox mesh by default, MPI behind the
//! `distributed` feature.

pub mod cart;
pub mod codec;
pub mod error;
pub mod grid;
pub mod halo;
pub mod output;
pub mod protocol;
pub mod sim;
pub mod stats;
pub mod topology;
pub mod transport;
#[cfg(feature = "distributed")]
pub mod transport_mpi;
