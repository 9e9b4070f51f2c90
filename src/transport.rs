//! Point-to-point transport abstraction between ranks.
//!
//! Protocol code talks to a [`Transport`] rather than to MPI directly, so
//! the scatter/gather and halo protocols can run unchanged over an
//! in-process mesh (tests, the default binary) or over MPI (the
//! `distributed` feature, see `transport_mpi`).
//!
//! Matching semantics mirror MPI point-to-point: messages are addressed by
//! rank, carry an integer tag, and are delivered FIFO per (source, tag)
//! pair.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use crate::codec::{DataLayout, TileHeader, HEADER_BYTES};
use crate::error::{HeatsimError, Result};

pub type Tag = i32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Send,
    Recv,
}

/// One element of a halo-exchange batch: send the described border to
/// `peer`, or receive `peer`'s border into the described halo slot.
#[derive(Clone, Debug)]
pub struct HaloOp {
    pub kind: OpKind,
    pub peer: usize,
    pub tag: Tag,
    pub layout: DataLayout,
}

/// Reliable point-to-point messaging between the fixed set of ranks.
///
/// All single transfers block until complete. [`Transport::exchange`]
/// issues a whole batch before waiting so the implementation can overlap
/// the transfers.
pub trait Transport: Send + Sync {
    fn rank(&self) -> usize;

    fn rank_count(&self) -> usize;

    /// Send a tile header; the receiver sizes its allocation from it.
    fn send_header(&self, dest: usize, header: &TileHeader) -> Result<()>;

    /// Blocking receive of a tile header from `src`.
    fn recv_header(&self, src: usize) -> Result<TileHeader>;

    /// Send the elements `layout` describes within `buf`, blocking.
    fn send_data(&self, dest: usize, tag: Tag, buf: &[f64], layout: &DataLayout) -> Result<()>;

    /// Receive into the positions `layout` describes within `buf`, blocking.
    fn recv_data(&self, src: usize, tag: Tag, buf: &mut [f64], layout: &DataLayout) -> Result<()>;

    /// Run a batch of border transfers against one grid buffer.
    ///
    /// All operations are issued before any wait; the call returns only
    /// once every one of them has completed. Send layouts and receive
    /// layouts must address disjoint cells of `buf`.
    fn exchange(&self, buf: &mut [f64], ops: &[HaloOp]) -> Result<()>;
}

enum Payload {
    Header([u8; HEADER_BYTES]),
    Data(Vec<f64>),
}

struct Envelope {
    src: usize,
    tag: Tag,
    payload: Payload,
}

#[derive(Default)]
struct Mailbox {
    queue: Mutex<VecDeque<Envelope>>,
    ready: Condvar,
}

/// In-process mesh of mailboxes, one per rank.
///
/// The test harness and the default (single-process) binary build one mesh
/// and hand each rank its [`MemoryTransport`] endpoint. Delivery is FIFO
/// per (source, tag); receives block on a condvar until a matching message
/// arrives. No timeouts: a stalled peer stalls the run, same as the real
/// transport.
#[derive(Clone)]
pub struct MemoryMesh {
    boxes: Arc<Vec<Mailbox>>,
}

impl MemoryMesh {
    pub fn new(rank_count: usize) -> Self {
        let mut boxes = Vec::with_capacity(rank_count);
        boxes.resize_with(rank_count, Mailbox::default);
        MemoryMesh {
            boxes: Arc::new(boxes),
        }
    }

    /// The endpoint owned by `rank`. Endpoints are cheap clones of the
    /// shared mesh and can move to other threads.
    pub fn endpoint(&self, rank: usize) -> MemoryTransport {
        assert!(rank < self.boxes.len(), "rank {rank} outside mesh");
        MemoryTransport {
            rank,
            boxes: Arc::clone(&self.boxes),
        }
    }
}

/// One rank's view of a [`MemoryMesh`].
#[derive(Clone)]
pub struct MemoryTransport {
    rank: usize,
    boxes: Arc<Vec<Mailbox>>,
}

impl MemoryTransport {
    fn post(&self, dest: usize, tag: Tag, payload: Payload) -> Result<()> {
        let mailbox = self.boxes.get(dest).ok_or_else(|| {
            HeatsimError::Transfer(format!(
                "destination rank {dest} outside mesh of {}",
                self.boxes.len()
            ))
        })?;
        let mut queue = mailbox
            .queue
            .lock()
            .map_err(|_| HeatsimError::Transfer("mailbox poisoned by a peer panic".into()))?;
        queue.push_back(Envelope {
            src: self.rank,
            tag,
            payload,
        });
        mailbox.ready.notify_all();
        Ok(())
    }

    /// Take the first queued message matching `src`, `tag` and `want_header`,
    /// blocking until one arrives.
    fn take(&self, src: usize, tag: Tag, want_header: bool) -> Result<Envelope> {
        let mailbox = &self.boxes[self.rank];
        let mut queue = mailbox
            .queue
            .lock()
            .map_err(|_| HeatsimError::Transfer("mailbox poisoned by a peer panic".into()))?;
        loop {
            let found = queue.iter().position(|env| {
                env.src == src
                    && env.tag == tag
                    && matches!(env.payload, Payload::Header(_)) == want_header
            });
            if let Some(at) = found {
                // position() guarantees the index is valid.
                return Ok(queue.remove(at).unwrap());
            }
            queue = mailbox
                .ready
                .wait(queue)
                .map_err(|_| HeatsimError::Transfer("mailbox poisoned by a peer panic".into()))?;
        }
    }
}

const TAG_HEADER: Tag = 0;

impl Transport for MemoryTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn rank_count(&self) -> usize {
        self.boxes.len()
    }

    fn send_header(&self, dest: usize, header: &TileHeader) -> Result<()> {
        self.post(dest, TAG_HEADER, Payload::Header(header.to_bytes()))
    }

    fn recv_header(&self, src: usize) -> Result<TileHeader> {
        match self.take(src, TAG_HEADER, true)?.payload {
            Payload::Header(bytes) => Ok(TileHeader::from_bytes(&bytes)),
            Payload::Data(_) => unreachable!("take() matched on payload kind"),
        }
    }

    fn send_data(&self, dest: usize, tag: Tag, buf: &[f64], layout: &DataLayout) -> Result<()> {
        self.post(dest, tag, Payload::Data(layout.pack(buf)))
    }

    fn recv_data(&self, src: usize, tag: Tag, buf: &mut [f64], layout: &DataLayout) -> Result<()> {
        match self.take(src, tag, false)?.payload {
            Payload::Data(values) => {
                if values.len() != layout.element_count() {
                    return Err(HeatsimError::Transfer(format!(
                        "payload from rank {src} has {} elements, expected {}",
                        values.len(),
                        layout.element_count()
                    )));
                }
                layout.unpack(buf, &values);
                Ok(())
            }
            Payload::Header(_) => unreachable!("take() matched on payload kind"),
        }
    }

    fn exchange(&self, buf: &mut [f64], ops: &[HaloOp]) -> Result<()> {
        // Issue every send before waiting on any receive; mailbox sends
        // complete immediately, so the batch cannot deadlock even when a
        // peer is this rank itself (wraparound on a 1-wide torus).
        for op in ops.iter().filter(|op| op.kind == OpKind::Send) {
            self.send_data(op.peer, op.tag, buf, &op.layout)?;
        }
        for op in ops.iter().filter(|op| op.kind == OpKind::Recv) {
            self.recv_data(op.peer, op.tag, buf, &op.layout)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    #[test]
    fn header_roundtrip_between_ranks() {
        let mesh = MemoryMesh::new(2);
        let a = mesh.endpoint(0);
        let b = mesh.endpoint(1);
        let header = TileHeader {
            width: 5,
            height: 3,
            padding: 0,
        };
        a.send_header(1, &header).unwrap();
        assert_eq!(b.recv_header(0).unwrap(), header);
    }

    #[test]
    fn data_respects_layout_on_both_sides() {
        let mesh = MemoryMesh::new(2);
        let a = mesh.endpoint(0);
        let b = mesh.endpoint(1);

        let mut src = Grid::new(3, 2, 0).unwrap();
        src.data.copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        a.send_data(1, 7, &src.data, &DataLayout::full_tile(&src))
            .unwrap();

        let mut dst = Grid::new(3, 2, 1).unwrap();
        let interior = DataLayout::interior(&dst);
        b.recv_data(0, 7, &mut dst.data, &interior).unwrap();
        assert_eq!(dst.cell(0, 0), 1.0);
        assert_eq!(dst.cell(2, 1), 6.0);
        assert_eq!(dst.cell(-1, 0), 0.0);
    }

    #[test]
    fn delivery_is_fifo_per_source_and_tag() {
        let mesh = MemoryMesh::new(1);
        let t = mesh.endpoint(0);
        let one = [1.0];
        let two = [2.0];
        let all = DataLayout::Contiguous { offset: 0, len: 1 };
        t.send_data(0, 3, &one, &all).unwrap();
        t.send_data(0, 3, &two, &all).unwrap();

        let mut out = [0.0];
        t.recv_data(0, 3, &mut out, &all).unwrap();
        assert_eq!(out, [1.0]);
        t.recv_data(0, 3, &mut out, &all).unwrap();
        assert_eq!(out, [2.0]);
    }

    #[test]
    fn tags_keep_concurrent_streams_apart() {
        let mesh = MemoryMesh::new(1);
        let t = mesh.endpoint(0);
        let all = DataLayout::Contiguous { offset: 0, len: 1 };
        t.send_data(0, 1, &[10.0], &all).unwrap();
        t.send_data(0, 0, &[20.0], &all).unwrap();

        // Receive in the opposite order of sending.
        let mut out = [0.0];
        t.recv_data(0, 0, &mut out, &all).unwrap();
        assert_eq!(out, [20.0]);
        t.recv_data(0, 1, &mut out, &all).unwrap();
        assert_eq!(out, [10.0]);
    }

    #[test]
    fn size_mismatch_is_transfer_error() {
        let mesh = MemoryMesh::new(1);
        let t = mesh.endpoint(0);
        let all = DataLayout::Contiguous { offset: 0, len: 2 };
        t.send_data(0, 0, &[1.0, 2.0], &all).unwrap();

        let mut out = [0.0];
        let short = DataLayout::Contiguous { offset: 0, len: 1 };
        assert!(matches!(
            t.recv_data(0, 0, &mut out, &short),
            Err(HeatsimError::Transfer(_))
        ));
    }

    #[test]
    fn send_outside_mesh_is_transfer_error() {
        let mesh = MemoryMesh::new(1);
        let t = mesh.endpoint(0);
        let header = TileHeader {
            width: 1,
            height: 1,
            padding: 0,
        };
        assert!(matches!(
            t.send_header(5, &header),
            Err(HeatsimError::Transfer(_))
        ));
    }
}
