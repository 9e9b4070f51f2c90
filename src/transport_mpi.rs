//! MPI transport for multi-process runs.
//!
//! Requires the `distributed` feature flag and an MPI installation.
//! Implements [`Transport`] over the world communicator using the `mpi`
//! crate. The caller must initialize MPI before constructing
//! [`MpiTransport`]:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let transport = MpiTransport::new();
//! ```
//!
//! Data layouts map directly onto MPI derived datatypes: contiguous runs
//! become `MPI_Type_contiguous`, strided borders `MPI_Type_vector`, so
//! border columns travel without staging copies on either side. The halo
//! batch is issued as immediate sends/receives and completed with a bulk
//! wait.

use crate::codec::{DataLayout, TileHeader};
use crate::error::Result;
use crate::transport::{HaloOp, OpKind, Tag, Transport};
use mpi::datatype::{DynBuffer, DynBufferMut, MutView, UserDatatype, View};
use mpi::request::RequestCollection;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

/// MPI-backed transport over the world communicator.
///
/// Wraps no state of its own; MPI holds the process group. Requires
/// `mpi::initialize()` to have been called before construction.
pub struct MpiTransport;

impl MpiTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MpiTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn datatype_of(layout: &DataLayout) -> UserDatatype {
    match *layout {
        DataLayout::Contiguous { len, .. } => {
            UserDatatype::contiguous(len as Count, &f64::equivalent_datatype())
        }
        DataLayout::Strided {
            count,
            block,
            stride,
            ..
        } => UserDatatype::vector(
            count as Count,
            block as Count,
            stride as Count,
            &f64::equivalent_datatype(),
        ),
    }
}

impl Transport for MpiTransport {
    fn rank(&self) -> usize {
        SimpleCommunicator::world().rank() as usize
    }

    fn rank_count(&self) -> usize {
        SimpleCommunicator::world().size() as usize
    }

    fn send_header(&self, dest: usize, header: &TileHeader) -> Result<()> {
        let world = SimpleCommunicator::world();
        world.process_at_rank(dest as i32).send(header);
        Ok(())
    }

    fn recv_header(&self, src: usize) -> Result<TileHeader> {
        let world = SimpleCommunicator::world();
        let (header, _status) = world.process_at_rank(src as i32).receive::<TileHeader>();
        Ok(header)
    }

    fn send_data(&self, dest: usize, tag: Tag, buf: &[f64], layout: &DataLayout) -> Result<()> {
        let world = SimpleCommunicator::world();
        let datatype = datatype_of(layout);
        let view =
            unsafe { View::with_count_and_datatype(&buf[layout.offset()..], 1, &datatype) };
        world.process_at_rank(dest as i32).send_with_tag(&view, tag);
        Ok(())
    }

    fn recv_data(&self, src: usize, tag: Tag, buf: &mut [f64], layout: &DataLayout) -> Result<()> {
        let world = SimpleCommunicator::world();
        let datatype = datatype_of(layout);
        let offset = layout.offset();
        let mut view =
            unsafe { MutView::with_count_and_datatype(&mut buf[offset..], 1, &datatype) };
        world
            .process_at_rank(src as i32)
            .receive_into_with_tag(&mut view, tag);
        Ok(())
    }

    fn exchange(&self, buf: &mut [f64], ops: &[HaloOp]) -> Result<()> {
        let world = SimpleCommunicator::world();
        debug_assert!(
            footprints_disjoint(ops),
            "send and receive layouts must address disjoint cells"
        );

        let send_ops: Vec<&HaloOp> = ops.iter().filter(|op| op.kind == OpKind::Send).collect();
        let recv_ops: Vec<&HaloOp> = ops.iter().filter(|op| op.kind == OpKind::Recv).collect();

        let send_types: Vec<UserDatatype> =
            send_ops.iter().map(|op| datatype_of(&op.layout)).collect();
        let recv_types: Vec<UserDatatype> =
            recv_ops.iter().map(|op| datatype_of(&op.layout)).collect();

        // One type-erased buffer per operation, built from the op's start
        // pointer with count 1 of its derived datatype. No Rust reference
        // to the grid buffer exists while the batch is in flight; the only
        // aliasing is between the datatype footprints, which are disjoint.
        let base = buf.as_mut_ptr();

        let send_bufs: Vec<DynBuffer> = send_ops
            .iter()
            .zip(&send_types)
            .map(|(op, datatype)| unsafe {
                let start = base.add(op.layout.offset()) as *const f64;
                DynBuffer::from_raw(start, 1, datatype.as_ref())
            })
            .collect();
        let mut recv_bufs: Vec<DynBufferMut> = recv_ops
            .iter()
            .zip(&recv_types)
            .map(|(op, datatype)| unsafe {
                DynBufferMut::from_raw(base.add(op.layout.offset()), 1, datatype.as_ref())
            })
            .collect();

        // All eight operations go out before either bulk wait, so the
        // transport is free to overlap them.
        mpi::request::multiple_scope(
            send_bufs.len(),
            |scope, sends: &mut RequestCollection<DynBuffer>| {
                for (dyn_buf, op) in send_bufs.iter().zip(&send_ops) {
                    let request = world
                        .process_at_rank(op.peer as i32)
                        .immediate_send_with_tag(scope, dyn_buf, op.tag);
                    sends.add(request);
                }

                mpi::request::multiple_scope(
                    recv_bufs.len(),
                    |scope, recvs: &mut RequestCollection<DynBufferMut>| {
                        for (dyn_buf, op) in recv_bufs.iter_mut().zip(&recv_ops) {
                            let request = world
                                .process_at_rank(op.peer as i32)
                                .immediate_receive_into_with_tag(scope, dyn_buf, op.tag);
                            recvs.add(request);
                        }
                        let mut statuses = Vec::new();
                        recvs.wait_all(&mut statuses);
                    },
                );

                let mut statuses = Vec::new();
                sends.wait_all(&mut statuses);
            },
        );
        Ok(())
    }
}

// Receive targets must not overlap each other or any send source while
// the whole batch shares one buffer.
fn footprints_disjoint(ops: &[HaloOp]) -> bool {
    let mut cells = std::collections::HashSet::new();
    for op in ops.iter().filter(|op| op.kind == OpKind::Recv) {
        for offset in op.layout.element_offsets() {
            if !cells.insert(offset) {
                return false;
            }
        }
    }
    ops.iter()
        .filter(|op| op.kind == OpKind::Send)
        .all(|op| {
            op.layout
                .element_offsets()
                .iter()
                .all(|offset| !cells.contains(offset))
        })
}
