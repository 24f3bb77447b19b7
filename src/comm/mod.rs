//! Thin façade over the process group.
//!
//! The forest never constructs its process group; it receives a handle
//! implementing [`Communicator`] and drives every cross-rank effect
//! through the collective calls below. All collectives are synchronous:
//! every rank must call the same operation in the same order.
//!
//! Backends: [`NoComm`] for single-rank serial runs and unit tests,
//! [`LocalCluster`]/[`LocalComm`] for in-process multi-rank runs (one
//! thread per rank, mailbox rendezvous), and an MPI backend behind the
//! `mpi-support` feature.

pub mod wire;
#[cfg(feature = "mpi-support")]
pub mod mpi;

use std::sync::Barrier;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;

/// Synchronous collective communication over a fixed process group.
pub trait Communicator: Send + Sync {
    /// This process's rank in `[0, size)`.
    fn rank(&self) -> usize;
    /// Number of processes in the group.
    fn size(&self) -> usize;
    /// Block until every rank has entered the barrier.
    fn barrier(&self);
    /// Gather one `u64` from every rank, indexed by rank.
    fn allgather_u64(&self, value: u64) -> Vec<u64>;
    /// Gather a byte blob from every rank, indexed by rank.
    fn allgather_bytes(&self, bytes: &[u8]) -> Vec<Vec<u8>>;
    /// Sparse all-to-all: deliver `outgoing` payloads to their target
    /// ranks and return the payloads addressed to this rank, sorted by
    /// source rank. Self-sends are not allowed.
    fn exchange(&self, outgoing: Vec<(usize, Vec<u8>)>) -> Vec<(usize, Vec<u8>)>;
}

/// Compile-time no-op communicator for pure serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn allgather_u64(&self, value: u64) -> Vec<u64> {
        vec![value]
    }

    fn allgather_bytes(&self, bytes: &[u8]) -> Vec<Vec<u8>> {
        vec![bytes.to_vec()]
    }

    fn exchange(&self, outgoing: Vec<(usize, Vec<u8>)>) -> Vec<(usize, Vec<u8>)> {
        debug_assert!(outgoing.is_empty(), "no peers to exchange with");
        Vec::new()
    }
}

// (sequence, source, destination) -> payload
type MailboxKey = (u64, usize, usize);

struct ClusterShared {
    nranks: usize,
    mailbox: DashMap<MailboxKey, Bytes>,
    barrier: Barrier,
}

/// In-process process group: one rank per thread, mailbox rendezvous.
///
/// Collectives are matched by a per-handle sequence number, so every rank
/// must issue the same collective calls in the same order — the same
/// contract a real process group imposes.
pub struct LocalCluster {
    shared: Arc<ClusterShared>,
}

impl LocalCluster {
    pub fn new(nranks: usize) -> Self {
        assert!(nranks >= 1);
        Self {
            shared: Arc::new(ClusterShared {
                nranks,
                mailbox: DashMap::new(),
                barrier: Barrier::new(nranks),
            }),
        }
    }

    /// The communicator handle for `rank`; hand one to each rank thread.
    pub fn comm(&self, rank: usize) -> LocalComm {
        assert!(rank < self.shared.nranks);
        LocalComm {
            shared: Arc::clone(&self.shared),
            rank,
            seq: AtomicU64::new(0),
        }
    }
}

/// One rank's handle into a [`LocalCluster`].
pub struct LocalComm {
    shared: Arc<ClusterShared>,
    rank: usize,
    seq: AtomicU64,
}

impl LocalComm {
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, AtomicOrdering::Relaxed)
    }

    /// Deposit one payload per peer, wait for the group, then drain this
    /// rank's inbox for the same collective.
    fn all_to_all(&self, mut payload_for: impl FnMut(usize) -> Bytes) -> Vec<Bytes> {
        let seq = self.next_seq();
        for dst in 0..self.shared.nranks {
            self.shared.mailbox.insert((seq, self.rank, dst), payload_for(dst));
        }
        self.shared.barrier.wait();
        (0..self.shared.nranks)
            .map(|src| {
                self.shared
                    .mailbox
                    .remove(&(seq, src, self.rank))
                    .map(|(_, v)| v)
                    .expect("collective mismatch across ranks")
            })
            .collect()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.nranks
    }

    fn barrier(&self) {
        self.next_seq();
        self.shared.barrier.wait();
    }

    fn allgather_u64(&self, value: u64) -> Vec<u64> {
        let bytes = Bytes::copy_from_slice(&value.to_le_bytes());
        self.all_to_all(|_| bytes.clone())
            .into_iter()
            .map(|b| u64::from_le_bytes(b.as_ref().try_into().expect("u64 payload")))
            .collect()
    }

    fn allgather_bytes(&self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let blob = Bytes::copy_from_slice(bytes);
        self.all_to_all(|_| blob.clone())
            .into_iter()
            .map(|b| b.to_vec())
            .collect()
    }

    fn exchange(&self, outgoing: Vec<(usize, Vec<u8>)>) -> Vec<(usize, Vec<u8>)> {
        let mut per_dst: Vec<Bytes> = vec![Bytes::new(); self.shared.nranks];
        for (dst, payload) in outgoing {
            assert!(dst < self.shared.nranks && dst != self.rank);
            per_dst[dst] = Bytes::from(payload);
        }
        let received = self.all_to_all(|dst| per_dst[dst].clone());
        received
            .into_iter()
            .enumerate()
            .filter(|(src, b)| *src != self.rank && !b.is_empty())
            .map(|(src, b)| (src, b.to_vec()))
            .collect()
    }
}
