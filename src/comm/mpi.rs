//! MPI-backed communicator (feature `mpi-support`).

use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use super::Communicator;

/// Communicator backed by an MPI world/communicator handle.
pub struct MpiComm {
    world: SimpleCommunicator,
}

impl MpiComm {
    pub fn new(world: SimpleCommunicator) -> Self {
        Self { world }
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn barrier(&self) {
        self.world.barrier();
    }

    fn allgather_u64(&self, value: u64) -> Vec<u64> {
        let mut out = vec![0u64; self.size()];
        self.world.all_gather_into(&value, &mut out[..]);
        out
    }

    fn allgather_bytes(&self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let lengths = self.allgather_u64(bytes.len() as u64);
        let size = self.size();
        let mut out = vec![Vec::new(); size];
        // Pairwise rounds keep the exchange deadlock-free without
        // requiring variable-count collectives from the bindings.
        for round in 0..size {
            let peer = round;
            if peer == self.rank() {
                out[peer] = bytes.to_vec();
                continue;
            }
            let peer_proc = self.world.process_at_rank(peer as i32);
            let mut buf = vec![0u8; lengths[peer] as usize];
            if self.rank() < peer {
                peer_proc.send(bytes);
                peer_proc.receive_into(&mut buf[..]);
            } else {
                peer_proc.receive_into(&mut buf[..]);
                peer_proc.send(bytes);
            }
            out[peer] = buf;
        }
        out
    }

    fn exchange(&self, outgoing: Vec<(usize, Vec<u8>)>) -> Vec<(usize, Vec<u8>)> {
        let size = self.size();
        let mut per_dst: Vec<Vec<u8>> = vec![Vec::new(); size];
        for (dst, payload) in outgoing {
            per_dst[dst] = payload;
        }
        // Publish per-destination sizes, then run the same pairwise rounds.
        let mut counts = vec![0u64; size * size];
        let my_counts: Vec<u64> = per_dst.iter().map(|p| p.len() as u64).collect();
        for (r, c) in self.allgather_bytes(bytemuck::cast_slice(&my_counts)).into_iter().enumerate() {
            let row: &[u64] = bytemuck::cast_slice(&c);
            counts[r * size..(r + 1) * size].copy_from_slice(row);
        }
        let mut received = Vec::new();
        for peer in 0..size {
            if peer == self.rank() {
                continue;
            }
            let inbound = counts[peer * size + self.rank()] as usize;
            let outbound = &per_dst[peer];
            let peer_proc = self.world.process_at_rank(peer as i32);
            let mut buf = vec![0u8; inbound];
            if self.rank() < peer {
                if !outbound.is_empty() {
                    peer_proc.send(&outbound[..]);
                }
                if inbound > 0 {
                    peer_proc.receive_into(&mut buf[..]);
                }
            } else {
                if inbound > 0 {
                    peer_proc.receive_into(&mut buf[..]);
                }
                if !outbound.is_empty() {
                    peer_proc.send(&outbound[..]);
                }
            }
            if inbound > 0 {
                received.push((peer, buf));
            }
        }
        received.sort_by_key(|(src, _)| *src);
        received
    }
}
