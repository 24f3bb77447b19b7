//! The distributed forest: a per-process shard of the global Morton-ordered
//! octant sequence, plus the partition bookkeeping needed to answer
//! ownership queries without communication.
//!
//! All transitions (`refine`, `coarsen`, `balance`, `partition`) are bulk,
//! collective operations: every rank calls the same method in the same
//! order, and each produces a brand-new [`Forest`]. Structures derived from
//! a forest snapshot (ghost layers, connectivity) must be rebuilt once the
//! snapshot is replaced.

pub mod balance;
pub mod partition;
pub mod reconcile;

use crate::comm::Communicator;
use crate::context::ForestContext;
use crate::error::ForestError;
use crate::octant::{Octant, RefineFlag};

/// Per-process view of the global forest.
#[derive(Debug, Clone)]
pub struct Forest<const D: usize> {
    /// Locally owned octants, strictly increasing in Morton order.
    octants: Vec<Octant<D>>,
    /// Refinement-state tag per local octant.
    flags: Vec<RefineFlag>,
    /// Global index of each rank's first octant; length `nranks + 1`,
    /// last entry equals the global octant count.
    global_first: Vec<u64>,
    /// Morton owner key of each rank's first octant (empty ranks
    /// back-filled from the right); length `nranks + 1`.
    first_key: Vec<u64>,
    rank: usize,
    nranks: usize,
}

impl<const D: usize> Forest<D> {
    /// Create the initial forest: the root octant, owned by rank 0.
    pub fn root<C: Communicator>(ctx: &ForestContext, comm: &C) -> Self {
        debug_assert_eq!(ctx.num_trees(), 1);
        let octants = if comm.rank() == 0 { vec![Octant::root()] } else { Vec::new() };
        let flags = vec![RefineFlag::Keep; octants.len()];
        let (global_first, first_key) = gather_partition(&octants, comm);
        log::debug!("forest root created on {} ranks", comm.size());
        Self { octants, flags, global_first, first_key, rank: comm.rank(), nranks: comm.size() }
    }

    /// Build one rank's view of a fully known global sequence.
    ///
    /// Single-process utility (fixtures, deterministic drivers): `all` is
    /// the whole Morton-sorted global sequence and `global_first` the
    /// partition to impose.
    ///
    /// # Panics
    /// Panics if `all` is not strictly Morton-increasing or the partition
    /// array is not a monotone cover of `all`.
    pub fn from_global_sequence(all: &[Octant<D>], global_first: &[u64], rank: usize) -> Self {
        let nranks = global_first.len() - 1;
        assert!(rank < nranks);
        assert_eq!(global_first[0], 0);
        assert_eq!(global_first[nranks], all.len() as u64);
        assert!(global_first.windows(2).all(|w| w[0] <= w[1]));
        assert!(all.windows(2).all(|w| w[0].cmp_morton(&w[1]).is_lt()));

        let lo = global_first[rank] as usize;
        let hi = global_first[rank + 1] as usize;
        let octants: Vec<_> = all[lo..hi].to_vec();
        let flags = vec![RefineFlag::Keep; octants.len()];

        let mut first_key = vec![0u64; nranks + 1];
        first_key[nranks] = Octant::<D>::END_KEY;
        for p in (0..nranks).rev() {
            first_key[p] = if global_first[p] == global_first[p + 1] {
                first_key[p + 1]
            } else {
                all[global_first[p] as usize].owner_key()
            };
        }
        first_key[0] = 0;

        Self {
            octants,
            flags,
            global_first: global_first.to_vec(),
            first_key,
            rank,
            nranks,
        }
    }

    /// Locally owned octants in Morton order.
    pub fn octants(&self) -> &[Octant<D>] {
        &self.octants
    }

    /// Refinement tags, parallel to [`Forest::octants`].
    pub fn flags(&self) -> &[RefineFlag] {
        &self.flags
    }

    /// Number of locally owned octants.
    pub fn local_num(&self) -> usize {
        self.octants.len()
    }

    /// Global octant count across all ranks.
    pub fn global_num(&self) -> u64 {
        self.global_first[self.nranks]
    }

    /// Global index of each rank's first octant (length `nranks + 1`).
    pub fn global_first(&self) -> &[u64] {
        &self.global_first
    }

    /// This process's rank.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks sharing the forest.
    pub fn num_ranks(&self) -> usize {
        self.nranks
    }

    /// Replay a caller-supplied flag array onto the local octants, one
    /// octant at a time in Morton order (the payload-initialization hook).
    pub fn set_flags(&mut self, flags: &[RefineFlag]) -> Result<(), ForestError> {
        if flags.len() != self.octants.len() {
            return Err(ForestError::FlagLengthMismatch {
                got: flags.len(),
                expected: self.octants.len(),
            });
        }
        self.flags.copy_from_slice(flags);
        Ok(())
    }

    /// Tag a single local octant.
    pub fn set_flag(&mut self, local_index: usize, flag: RefineFlag) {
        self.flags[local_index] = flag;
    }

    /// Binary search for an exact octant in the local slice.
    ///
    /// Absence is an expected outcome, not an error.
    pub fn bsearch(&self, oct: &Octant<D>) -> Option<usize> {
        self.octants.binary_search_by(|probe| probe.cmp_morton(oct)).ok()
    }

    /// The rank owning `oct` under the current partition.
    ///
    /// Monotonic binary search over the per-rank first-octant markers;
    /// consistent with [`crate::octant::Octant::cmp_morton`] by
    /// construction of the owner keys.
    pub fn find_owner(&self, oct: &Octant<D>) -> usize {
        debug_assert!(oct.is_inside_root());
        let key = oct.owner_key();
        self.first_key[1..self.nranks].partition_point(|&k| k <= key)
    }

    /// Replace every `Refine`-tagged octant by its `2^D` children.
    ///
    /// Children are inserted in Morton order at the parent's position and
    /// tagged `Keep`; all other octants pass through unchanged. Octants
    /// already at the deepest level are left untouched.
    pub fn refine<C: Communicator>(&self, comm: &C) -> Forest<D> {
        let mut octants = Vec::with_capacity(self.octants.len());
        let mut flags = Vec::with_capacity(self.flags.len());
        for (oct, &flag) in self.octants.iter().zip(&self.flags) {
            if flag == RefineFlag::Refine {
                if oct.level >= Octant::<D>::MAX_REFINE_LEVEL {
                    log::warn!("refinement past level {} ignored", oct.level);
                    octants.push(*oct);
                    flags.push(flag);
                    continue;
                }
                octants.extend(oct.children());
                flags.extend(std::iter::repeat_n(RefineFlag::Keep, Octant::<D>::NUM_CHILDREN));
            } else {
                octants.push(*oct);
                flags.push(flag);
            }
        }
        log::debug!(
            "refine: {} -> {} local octants on rank {}",
            self.octants.len(),
            octants.len(),
            self.rank
        );
        self.succeed(octants, flags, comm)
    }

    /// Merge each complete, Morton-contiguous family whose members are all
    /// tagged `Coarsen` into its parent.
    ///
    /// A family that is incomplete, split, or not unanimously tagged is
    /// left untouched. Parents come out tagged `Keep`.
    pub fn coarsen<C: Communicator>(&self, comm: &C) -> Forest<D> {
        let fam = Octant::<D>::NUM_CHILDREN;
        let n = self.octants.len();
        let mut octants = Vec::with_capacity(n);
        let mut flags = Vec::with_capacity(n);
        let mut i = 0;
        while i < n {
            let q = &self.octants[i];
            let family_parent = (q.level > 0 && q.child_id() == 0 && i + fam <= n)
                .then(|| q.ancestor(q.level - 1))
                .filter(|parent| {
                    (0..fam).all(|j| {
                        let s = &self.octants[i + j];
                        self.flags[i + j] == RefineFlag::Coarsen
                            && s.level == q.level
                            && parent.is_ancestor_of(s)
                    })
                });
            if let Some(parent) = family_parent {
                octants.push(parent);
                flags.push(RefineFlag::Keep);
                i += fam;
            } else {
                octants.push(*q);
                flags.push(self.flags[i]);
                i += 1;
            }
        }
        log::debug!(
            "coarsen: {} -> {} local octants on rank {}",
            n,
            octants.len(),
            self.rank
        );
        self.succeed(octants, flags, comm)
    }

    /// Finish a transition: rebuild the collective partition bookkeeping
    /// around a new local slice.
    pub(crate) fn succeed<C: Communicator>(
        &self,
        octants: Vec<Octant<D>>,
        flags: Vec<RefineFlag>,
        comm: &C,
    ) -> Forest<D> {
        debug_assert!(octants.windows(2).all(|w| w[0].cmp_morton(&w[1]).is_lt()));
        debug_assert_eq!(octants.len(), flags.len());
        let (global_first, first_key) = gather_partition(&octants, comm);
        Forest {
            octants,
            flags,
            global_first,
            first_key,
            rank: self.rank,
            nranks: self.nranks,
        }
    }
}

/// Collectively compute `global_first` and per-rank first-octant keys.
fn gather_partition<const D: usize, C: Communicator>(
    octants: &[Octant<D>],
    comm: &C,
) -> (Vec<u64>, Vec<u64>) {
    let nranks = comm.size();
    let counts = comm.allgather_u64(octants.len() as u64);
    let mut global_first = vec![0u64; nranks + 1];
    for p in 0..nranks {
        global_first[p + 1] = global_first[p] + counts[p];
    }

    let my_key = octants.first().map_or(u64::MAX, |o| o.owner_key());
    let keys = comm.allgather_u64(my_key);
    let mut first_key = vec![0u64; nranks + 1];
    first_key[nranks] = Octant::<D>::END_KEY;
    for p in (0..nranks).rev() {
        first_key[p] = if counts[p] == 0 { first_key[p + 1] } else { keys[p] };
    }
    first_key[0] = 0;
    (global_first, first_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::octant::Quadrant;

    fn serial_root() -> Forest<2> {
        let ctx = ForestContext::new(1).unwrap();
        Forest::root(&ctx, &NoComm)
    }

    #[test]
    fn root_forest_shape() {
        let f = serial_root();
        assert_eq!(f.local_num(), 1);
        assert_eq!(f.global_num(), 1);
        assert_eq!(f.global_first(), &[0, 1]);
        assert_eq!(f.octants()[0], Quadrant::root());
    }

    #[test]
    fn refine_root_yields_children_tagged_keep() {
        let mut f = serial_root();
        f.set_flags(&[RefineFlag::Refine]).unwrap();
        let fine = f.refine(&NoComm);
        assert_eq!(fine.local_num(), 4);
        assert!(fine.flags().iter().all(|&fl| fl == RefineFlag::Keep));
        for (i, oct) in fine.octants().iter().enumerate() {
            assert_eq!(oct.morton_index(), i as u64);
            assert_eq!(oct.level, 1);
        }
    }

    #[test]
    fn second_refine_of_one_child_gives_seven() {
        let mut f = serial_root();
        f.set_flags(&[RefineFlag::Refine]).unwrap();
        let mut fine = f.refine(&NoComm);
        fine.set_flag(0, RefineFlag::Refine);
        let finer = fine.refine(&NoComm);
        assert_eq!(finer.local_num(), 7);
        assert_eq!(finer.global_num(), 7);
    }

    #[test]
    fn coarsen_requires_unanimous_family() {
        let mut f = serial_root();
        f.set_flags(&[RefineFlag::Refine]).unwrap();
        let mut fine = f.refine(&NoComm);

        // Three of four children tagged: nothing happens.
        fine.set_flags(&[
            RefineFlag::Coarsen,
            RefineFlag::Coarsen,
            RefineFlag::Coarsen,
            RefineFlag::Keep,
        ])
        .unwrap();
        assert_eq!(fine.coarsen(&NoComm).local_num(), 4);

        // Unanimous family collapses to the parent.
        fine.set_flags(&[RefineFlag::Coarsen; 4]).unwrap();
        let coarse = fine.coarsen(&NoComm);
        assert_eq!(coarse.local_num(), 1);
        assert_eq!(coarse.octants()[0], Quadrant::root());
        assert_eq!(coarse.flags()[0], RefineFlag::Keep);
    }

    #[test]
    fn refine_then_coarsen_roundtrip() {
        let mut f = serial_root();
        f.set_flags(&[RefineFlag::Refine]).unwrap();
        let mut fine = f.refine(&NoComm);
        fine.set_flags(&vec![RefineFlag::Coarsen; fine.local_num()]).unwrap();
        let back = fine.coarsen(&NoComm);
        assert_eq!(back.octants(), f.octants());
    }

    #[test]
    fn bsearch_hits_and_misses() {
        let mut f = serial_root();
        f.set_flags(&[RefineFlag::Refine]).unwrap();
        let fine = f.refine(&NoComm);
        let c2 = Quadrant::from_morton(1, 2);
        assert_eq!(fine.bsearch(&c2), Some(2));
        let deep = Quadrant::from_morton(2, 11);
        assert_eq!(fine.bsearch(&deep), None);
    }

    #[test]
    fn find_owner_respects_partition() {
        let cells: Vec<_> = (0..4).map(|i| Quadrant::from_morton(1, i)).collect();
        let f0 = Forest::from_global_sequence(&cells, &[0, 2, 4], 0);
        assert_eq!(f0.find_owner(&cells[0]), 0);
        assert_eq!(f0.find_owner(&cells[1]), 0);
        assert_eq!(f0.find_owner(&cells[2]), 1);
        assert_eq!(f0.find_owner(&cells[3]), 1);
        // A descendant is owned by whoever owns its containing leaf.
        let deep = cells[3].children()[1].children()[0];
        assert_eq!(f0.find_owner(&deep), 1);
    }

    #[test]
    fn empty_rank_backfill() {
        let cells: Vec<_> = (0..4).map(|i| Quadrant::from_morton(1, i)).collect();
        let f = Forest::from_global_sequence(&cells, &[0, 4, 4, 4], 0);
        assert_eq!(f.find_owner(&cells[3]), 0);
        assert_eq!(f.global_first(), &[0, 4, 4, 4]);
    }
}
