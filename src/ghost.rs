//! Ghost layer: remotely owned octants adjacent to the local slice.
//!
//! Built collectively from a balanced, partitioned forest. Each rank
//! computes its *mirrors* — local octants adjacent to another rank's
//! range — purely from ownership queries, then a single sparse exchange
//! delivers every mirror to the rank it neighbors. Because both sides
//! derive adjacency from the same geometry, the received octants are
//! exactly this rank's ghosts.
//!
//! The forest must be balanced at least as strongly as the requested
//! connectivity pattern; candidate scanning relies on adjacent leaves
//! being within one level of their neighbors.

use hashbrown::HashMap;

use crate::comm::wire::{self, WireOctant};
use crate::comm::Communicator;
use crate::forest::Forest;
use crate::octant::{transverse_axes, Connectivity, Octant};

/// Foreign octants adjacent to the local slice, grouped by owning rank,
/// plus the mirror bookkeeping for the reverse direction.
#[derive(Debug, Clone)]
pub struct GhostLayer<const D: usize> {
    pattern: Connectivity,
    /// Ghost octants, sorted by (owning rank, Morton order); since ranks
    /// own contiguous Morton ranges this is globally Morton-sorted too.
    octants: Vec<Octant<D>>,
    /// Owner-local index of each ghost (the "piggy" field).
    owner_local: Vec<u32>,
    /// Per-rank runs into `octants`; length `nranks + 1`.
    proc_offsets: Vec<usize>,
    /// Local indices of octants that are ghosts to other ranks, grouped by
    /// peer rank, Morton-sorted within each run.
    mirrors: Vec<usize>,
    /// Per-rank runs into `mirrors`; length `nranks + 1`.
    mirror_proc_offsets: Vec<usize>,
}

impl<const D: usize> GhostLayer<D> {
    /// Collectively build the ghost layer for `forest` under `pattern`.
    pub fn build<C: Communicator>(forest: &Forest<D>, pattern: Connectivity, comm: &C) -> Self {
        let my_rank = comm.rank();
        let nranks = comm.size();

        // Mirror discovery: which peers own leaves adjacent to each local octant.
        let mut mirror_sets: Vec<Vec<usize>> = vec![Vec::new(); nranks];
        let mut scratch = Vec::new();
        for (li, q) in forest.octants().iter().enumerate() {
            scratch.clear();
            push_adjacent_candidates(q, pattern, &mut scratch);
            for candidate in &scratch {
                let owner = forest.find_owner(candidate);
                if owner != my_rank {
                    mirror_sets[owner].push(li);
                }
            }
        }
        for set in mirror_sets.iter_mut() {
            set.sort_unstable();
            set.dedup();
        }

        // One sparse exchange: mirrors out, ghosts in.
        let outgoing: Vec<(usize, Vec<u8>)> = mirror_sets
            .iter()
            .enumerate()
            .filter(|(peer, set)| *peer != my_rank && !set.is_empty())
            .map(|(peer, set)| {
                let records: Vec<WireOctant> = set
                    .iter()
                    .map(|&li| WireOctant::encode(&forest.octants()[li], forest.flags()[li], li))
                    .collect();
                (peer, wire::to_bytes(&records))
            })
            .collect();
        let received = comm.exchange(outgoing);

        let mut per_rank: HashMap<usize, Vec<WireOctant>> = HashMap::new();
        for (src, bytes) in received {
            per_rank.insert(src, wire::from_bytes(&bytes));
        }

        let mut octants = Vec::new();
        let mut owner_local = Vec::new();
        let mut proc_offsets = vec![0usize; nranks + 1];
        for rank in 0..nranks {
            if let Some(records) = per_rank.get(&rank) {
                for record in records {
                    let (oct, _flag, piggy) = record.decode::<D>();
                    octants.push(oct);
                    owner_local.push(piggy as u32);
                }
            }
            proc_offsets[rank + 1] = octants.len();
        }

        let mut mirror_proc_offsets = vec![0usize; nranks + 1];
        let mut mirrors = Vec::new();
        for (rank, set) in mirror_sets.into_iter().enumerate() {
            if rank != my_rank {
                mirrors.extend(set);
            }
            mirror_proc_offsets[rank + 1] = mirrors.len();
        }

        log::debug!(
            "ghost layer on rank {}: {} ghosts, {} mirrors ({:?})",
            my_rank,
            octants.len(),
            mirrors.len(),
            pattern
        );
        Self { pattern, octants, owner_local, proc_offsets, mirrors, mirror_proc_offsets }
    }

    /// An empty layer for a single-rank forest.
    pub fn empty(pattern: Connectivity, nranks: usize) -> Self {
        Self {
            pattern,
            octants: Vec::new(),
            owner_local: Vec::new(),
            proc_offsets: vec![0; nranks + 1],
            mirrors: Vec::new(),
            mirror_proc_offsets: vec![0; nranks + 1],
        }
    }

    /// Connectivity pattern this layer was built with.
    pub fn pattern(&self) -> Connectivity {
        self.pattern
    }

    /// Ghost octants, sorted by (owner rank, Morton).
    pub fn octants(&self) -> &[Octant<D>] {
        &self.octants
    }

    /// Number of ghost octants.
    pub fn num_ghosts(&self) -> usize {
        self.octants.len()
    }

    /// Per-rank runs into the ghost array (length `nranks + 1`).
    pub fn proc_offsets(&self) -> &[usize] {
        &self.proc_offsets
    }

    /// Owner-local index of ghost `gi`.
    pub fn owner_local(&self, gi: usize) -> usize {
        self.owner_local[gi] as usize
    }

    /// Owning rank of ghost `gi`.
    pub fn owner_rank(&self, gi: usize) -> usize {
        debug_assert!(gi < self.octants.len());
        self.proc_offsets.partition_point(|&o| o <= gi) - 1
    }

    /// Local indices mirrored to other ranks, grouped by peer rank.
    pub fn mirrors(&self) -> &[usize] {
        &self.mirrors
    }

    /// Per-rank runs into [`GhostLayer::mirrors`] (length `nranks + 1`).
    pub fn mirror_proc_offsets(&self) -> &[usize] {
        &self.mirror_proc_offsets
    }

    /// Binary search for an exact octant among the ghosts.
    pub fn bsearch(&self, oct: &Octant<D>) -> Option<usize> {
        self.octants.binary_search_by(|probe| probe.cmp_morton(oct)).ok()
    }

    /// Owning rank per ghost, 1-based for the host boundary.
    pub fn owner_ranks_report(&self) -> Vec<i32> {
        (0..self.octants.len()).map(|gi| self.owner_rank(gi) as i32 + 1).collect()
    }

    /// Owner-local index per ghost, 1-based.
    pub fn owner_local_report(&self) -> Vec<i32> {
        self.owner_local.iter().map(|&p| p as i32 + 1).collect()
    }

    /// Global octant id per ghost, 1-based:
    /// `global_first[owner] + owner_local + 1`.
    pub fn global_ids_report(&self, forest: &Forest<D>) -> Vec<i64> {
        (0..self.octants.len())
            .map(|gi| {
                let owner = self.owner_rank(gi);
                forest.global_first()[owner] as i64 + self.owner_local[gi] as i64 + 1
            })
            .collect()
    }

    /// Per-rank ghost runs, 1-based.
    pub fn proc_offsets_report(&self) -> Vec<i32> {
        self.proc_offsets.iter().map(|&o| o as i32 + 1).collect()
    }

    /// The raw import/export summary used by the host's halo exchange.
    pub fn cell_import(&self, forest: &Forest<D>) -> CellImport {
        let nranks = self.proc_offsets.len() - 1;
        let involved: Vec<usize> = (0..nranks)
            .filter(|&r| {
                self.proc_offsets[r + 1] > self.proc_offsets[r]
                    || self.mirror_proc_offsets[r + 1] > self.mirror_proc_offsets[r]
            })
            .collect();

        let mut rcv_ptrs = Vec::with_capacity(involved.len() + 1);
        let mut snd_ptrs = Vec::with_capacity(involved.len() + 1);
        for &r in &involved {
            rcv_ptrs.push(self.proc_offsets[r] as i32 + 1);
            snd_ptrs.push(self.mirror_proc_offsets[r] as i32 + 1);
        }
        rcv_ptrs.push(self.proc_offsets[nranks] as i32 + 1);
        snd_ptrs.push(self.mirror_proc_offsets[nranks] as i32 + 1);

        CellImport {
            neighbour_ranks: involved.iter().map(|&r| r as i32 + 1).collect(),
            rcv_ptrs,
            rcv_indices: (0..self.octants.len())
                .map(|j| (forest.local_num() + j) as i32 + 1)
                .collect(),
            snd_ptrs,
            snd_indices: self.mirrors.iter().map(|&li| li as i32 + 1).collect(),
        }
    }
}

/// 1-based halo-exchange summary reported across the host boundary.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CellImport {
    /// Ranks with a non-empty ghost or mirror run, 1-based.
    pub neighbour_ranks: Vec<i32>,
    /// CSR pointers into the ghost array per involved rank, 1-based.
    pub rcv_ptrs: Vec<i32>,
    /// Local element id of each ghost (`local_num + j + 1`).
    pub rcv_indices: Vec<i32>,
    /// CSR pointers into the mirror list per involved rank, 1-based.
    pub snd_ptrs: Vec<i32>,
    /// Local element id of each mirror, 1-based.
    pub snd_indices: Vec<i32>,
}

/// Candidate regions whose owning leaves are exactly the octants adjacent
/// to `q` under `pattern`.
///
/// Candidates are one level finer than `q` (clamped at the deepest level);
/// the leaf containing a candidate's first descendant is the adjacent
/// leaf on that side.
pub(crate) fn push_adjacent_candidates<const D: usize>(
    q: &Octant<D>,
    pattern: Connectivity,
    out: &mut Vec<Octant<D>>,
) {
    let refined = q.level < Octant::<D>::MAX_REFINE_LEVEL;

    for face in 0..Octant::<D>::NUM_FACES {
        let n = q.face_neighbor(face);
        if !n.is_inside_root() {
            continue;
        }
        if !refined {
            out.push(n);
            continue;
        }
        let axis = face / 2;
        let touching_bit = 1 - face % 2;
        for (id, child) in n.children().into_iter().enumerate() {
            if (id >> axis) & 1 == touching_bit {
                out.push(child);
            }
        }
    }

    if D == 3 && pattern.includes_edges() {
        for edge in 0..12 {
            let n = q.edge_neighbor(edge);
            if !n.is_inside_root() {
                continue;
            }
            if !refined {
                out.push(n);
                continue;
            }
            let axis = edge / 4;
            let (t0, t1) = transverse_axes(axis);
            let b0 = 1 - (edge & 1);
            let b1 = 1 - ((edge >> 1) & 1);
            for (id, child) in n.children().into_iter().enumerate() {
                if (id >> t0) & 1 == b0 && (id >> t1) & 1 == b1 {
                    out.push(child);
                }
            }
        }
    }

    if pattern.includes_corners() {
        let opposite = Octant::<D>::NUM_CORNERS - 1;
        for corner in 0..Octant::<D>::NUM_CORNERS {
            let n = q.corner_neighbor(corner);
            if !n.is_inside_root() {
                continue;
            }
            if !refined {
                out.push(n);
                continue;
            }
            out.push(n.children()[corner ^ opposite]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::octant::Quadrant;

    #[test]
    fn single_rank_layer_is_empty() {
        let cells: Vec<_> = (0..4).map(|i| Quadrant::from_morton(1, i)).collect();
        let forest = Forest::from_global_sequence(&cells, &[0, 4], 0);
        let ghosts = GhostLayer::build(&forest, Connectivity::Full, &NoComm);
        assert_eq!(ghosts.num_ghosts(), 0);
        assert!(ghosts.mirrors().is_empty());
        assert_eq!(ghosts.proc_offsets(), &[0, 0]);
    }

    #[test]
    fn face_candidates_cover_both_halves() {
        let q = Quadrant::from_morton(1, 0);
        let mut out = Vec::new();
        push_adjacent_candidates(&q, Connectivity::Face, &mut out);
        // Two interior faces, two candidates each.
        assert_eq!(out.len(), 4);
        for c in &out {
            assert_eq!(c.level, 2);
            let back = c.ancestor(1);
            assert!(back == q.face_neighbor(1) || back == q.face_neighbor(3));
        }
    }

    #[test]
    fn corner_candidate_touches_corner() {
        let q = Quadrant::from_morton(1, 0);
        let mut out = Vec::new();
        push_adjacent_candidates(&q, Connectivity::Full, &mut out);
        // Faces +x and +y (2 each) plus the +x+y corner candidate.
        assert_eq!(out.len(), 5);
        let corner_cell = out.last().unwrap();
        assert_eq!(corner_cell.coords, [q.len(), q.len()]);
    }
}
