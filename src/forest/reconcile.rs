//! Flag reconciliation between two forest snapshots.
//!
//! After an adaptation step the caller often needs to know, per *old*
//! octant, what actually happened: kept, refined, or coarsened (balance
//! may refine octants the caller never tagged). This walks both local
//! Morton-ordered sequences in lock-step and recomputes the outcome.

use crate::error::ForestError;
use crate::forest::Forest;
use crate::octant::{Octant, RefineFlag};

/// Recompute, for every old local octant, which of `Keep`/`Refine`/
/// `Coarsen` transformed it into the new snapshot.
///
/// The two snapshots must belong to the same process group and be related
/// by exactly one refine/coarsen step; any other relation between the
/// sequences is a consistency violation.
pub fn reconcile_flags<const D: usize>(
    old: &Forest<D>,
    new: &Forest<D>,
) -> Result<Vec<RefineFlag>, ForestError> {
    if old.num_ranks() != new.num_ranks() {
        return Err(ForestError::ProcessGroupMismatch(old.num_ranks(), new.num_ranks()));
    }

    let fam = Octant::<D>::NUM_CHILDREN;
    let old_octs = old.octants();
    let new_octs = new.octants();
    let mut flags = vec![RefineFlag::Keep; old_octs.len()];

    let mut oi = 0;
    let mut ni = 0;
    while oi < old_octs.len() {
        let q_old = &old_octs[oi];
        let q_new = match new_octs.get(ni) {
            Some(q) => q,
            None => return Err(ForestError::InconsistentSnapshots { old_index: oi }),
        };
        if q_old == q_new {
            flags[oi] = RefineFlag::Keep;
            oi += 1;
            ni += 1;
        } else if q_old.is_ancestor_of(q_new) && q_old.level + 1 == q_new.level {
            // q_old was replaced by its children.
            flags[oi] = RefineFlag::Refine;
            oi += 1;
            ni += fam;
        } else if q_new.is_ancestor_of(q_old) && q_new.level + 1 == q_old.level {
            // q_old and its siblings were merged into q_new.
            if oi + fam > old_octs.len() {
                return Err(ForestError::InconsistentSnapshots { old_index: oi });
            }
            for j in 0..fam {
                flags[oi + j] = RefineFlag::Coarsen;
            }
            oi += fam;
            ni += 1;
        } else {
            return Err(ForestError::InconsistentSnapshots { old_index: oi });
        }
    }
    log::trace!("reconciled {} old octants against {} new", old_octs.len(), new_octs.len());
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::context::ForestContext;

    fn root2d() -> Forest<2> {
        let ctx = ForestContext::new(1).unwrap();
        Forest::root(&ctx, &NoComm)
    }

    #[test]
    fn detects_refinement() {
        let mut f = root2d();
        f.set_flags(&[RefineFlag::Refine]).unwrap();
        let fine = f.refine(&NoComm);
        let flags = reconcile_flags(&f, &fine).unwrap();
        assert_eq!(flags, vec![RefineFlag::Refine]);
    }

    #[test]
    fn detects_coarsening() {
        let mut f = root2d();
        f.set_flags(&[RefineFlag::Refine]).unwrap();
        let mut fine = f.refine(&NoComm);
        fine.set_flags(&[RefineFlag::Coarsen; 4]).unwrap();
        let coarse = fine.coarsen(&NoComm);
        let flags = reconcile_flags(&fine, &coarse).unwrap();
        assert_eq!(flags, vec![RefineFlag::Coarsen; 4]);
    }

    #[test]
    fn detects_unchanged_mixture() {
        let mut f = root2d();
        f.set_flags(&[RefineFlag::Refine]).unwrap();
        let mut fine = f.refine(&NoComm);
        fine.set_flag(2, RefineFlag::Refine);
        let finer = fine.refine(&NoComm);
        let flags = reconcile_flags(&fine, &finer).unwrap();
        assert_eq!(
            flags,
            vec![RefineFlag::Keep, RefineFlag::Keep, RefineFlag::Refine, RefineFlag::Keep]
        );
    }

    #[test]
    fn rejects_unrelated_snapshots() {
        let mut f = root2d();
        f.set_flags(&[RefineFlag::Refine]).unwrap();
        let mut fine = f.refine(&NoComm);
        fine.set_flag(0, RefineFlag::Refine);
        let finer = fine.refine(&NoComm);
        // Two refine steps apart: the walk must fail.
        assert!(matches!(
            reconcile_flags(&f, &finer),
            Err(ForestError::InconsistentSnapshots { .. })
        ));
    }
}
