//! 2:1 balance enforcement.
//!
//! After arbitrary refinement, two octants adjacent under a connectivity
//! pattern may differ by more than one level. Balancing refines the
//! coarse side until every adjacent pair is within one level; it never
//! coarsens. The fixpoint runs collectively: each round rebuilds the
//! ghost layer, marks local octants with a strictly finer-than-allowed
//! neighbor (local or ghost), refines them, and stops once no rank
//! changed anything.

use crate::comm::Communicator;
use crate::forest::Forest;
use crate::ghost::{push_adjacent_candidates, GhostLayer};
use crate::octant::{Connectivity, Octant, RefineFlag};

impl<const D: usize> Forest<D> {
    /// Collectively enforce the 2:1 invariant under `pattern`.
    ///
    /// User flags on surviving octants are preserved; refinement children
    /// introduced by balancing come out tagged `Keep`.
    pub fn balance<C: Communicator>(&self, pattern: Connectivity, comm: &C) -> Forest<D> {
        let mut current = self.clone();
        let mut round = 0u32;
        loop {
            let ghosts = GhostLayer::build(&current, pattern, comm);
            let mut marks = vec![false; current.local_num()];
            let mut changed = 0u64;
            let mut scratch = Vec::new();
            for (li, q) in current.octants().iter().enumerate() {
                scratch.clear();
                push_adjacent_candidates(q, pattern, &mut scratch);
                // A candidate one level below q with a proper descendant
                // among the leaves means some adjacent leaf is at least
                // two levels finer than q.
                let violated = scratch.iter().any(|c| {
                    has_proper_descendant(current.octants(), c)
                        || has_proper_descendant(ghosts.octants(), c)
                });
                if violated {
                    marks[li] = true;
                    changed += 1;
                }
            }

            let total: u64 = comm.allgather_u64(changed).iter().sum();
            if total == 0 {
                log::debug!("balance converged after {round} rounds");
                return current;
            }

            let mut octants = Vec::with_capacity(current.local_num() + changed as usize * 3);
            let mut flags = Vec::with_capacity(octants.capacity());
            for (i, (q, &flag)) in current.octants().iter().zip(current.flags()).enumerate() {
                if marks[i] {
                    octants.extend(q.children());
                    flags.extend(std::iter::repeat_n(RefineFlag::Keep, Octant::<D>::NUM_CHILDREN));
                } else {
                    octants.push(*q);
                    flags.push(flag);
                }
            }
            current = current.succeed(octants, flags, comm);
            round += 1;
        }
    }
}

/// Whether the Morton-sorted `leaves` contain a strict descendant of `c`.
fn has_proper_descendant<const D: usize>(leaves: &[Octant<D>], c: &Octant<D>) -> bool {
    let lo = leaves.partition_point(|o| o.cmp_morton(c).is_lt());
    leaves.get(lo).is_some_and(|o| c.is_ancestor_of(o))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::context::ForestContext;
    use crate::octant::Quadrant;

    fn violates_face_balance(octants: &[Quadrant]) -> bool {
        octants.iter().any(|a| {
            octants.iter().any(|b| {
                a.level + 1 < b.level && {
                    // Face adjacency: touching along exactly one axis,
                    // overlapping along the other.
                    let (al, bl) = (a.len(), b.len());
                    let touching = (0..2).filter(|&ax| {
                        a.coords[ax] + al == b.coords[ax] || b.coords[ax] + bl == a.coords[ax]
                    });
                    let overlap = (0..2).filter(|&ax| {
                        a.coords[ax] < b.coords[ax] + bl && b.coords[ax] < a.coords[ax] + al
                    });
                    touching.count() == 1 && overlap.count() == 1
                }
            })
        })
    }

    #[test]
    fn balance_restores_two_to_one() {
        let ctx = ForestContext::new(1).unwrap();
        let mut f: Forest<2> = Forest::root(&ctx, &NoComm);
        f.set_flags(&[RefineFlag::Refine]).unwrap();
        let mut f = f.refine(&NoComm);
        // Refine the first child, then its diagonal child: the level-3
        // cells end up face-adjacent to untouched level-1 cells.
        f.set_flag(0, RefineFlag::Refine);
        f = f.refine(&NoComm);
        f.set_flag(3, RefineFlag::Refine);
        f = f.refine(&NoComm);
        assert!(violates_face_balance(f.octants()));

        let balanced = f.balance(Connectivity::Face, &NoComm);
        assert!(!violates_face_balance(balanced.octants()));
        // Balance only refines.
        assert!(balanced.local_num() > f.local_num());
        for w in balanced.octants().windows(2) {
            assert!(w[0].cmp_morton(&w[1]).is_lt());
        }
    }

    #[test]
    fn balanced_forest_is_untouched() {
        let ctx = ForestContext::new(1).unwrap();
        let mut f: Forest<2> = Forest::root(&ctx, &NoComm);
        f.set_flags(&[RefineFlag::Refine]).unwrap();
        let f = f.refine(&NoComm);
        let balanced = f.balance(Connectivity::Full, &NoComm);
        assert_eq!(balanced.octants(), f.octants());
    }
}
