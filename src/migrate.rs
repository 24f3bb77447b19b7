//! Migration control data: how octants move between ranks when the forest
//! is repartitioned.
//!
//! Given this rank's old slice and the repartitioned forest, the plan
//! records, per old octant, either its position in the new local slice or
//! the destination rank it migrates to. The payload-redistribution step
//! that consumes the plan is outside the core.

use hashbrown::HashMap;

use crate::error::ForestError;
use crate::forest::Forest;

/// Rank-grouped migration control data for one repartition event.
///
/// Index arrays follow the host convention: 1-based, with 0 reserved.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MigrationPlan {
    /// Destination ranks actually receiving octants, 1-based, in order of
    /// first encounter along the old slice.
    pub ranks: Vec<i32>,
    /// `[start, end)` pointers into `local_indices` per destination rank,
    /// 1-based; length `ranks.len() + 1`.
    pub rank_ptrs: Vec<i32>,
    /// Old local indices of migrating octants, 1-based, grouped by
    /// destination rank.
    pub local_indices: Vec<i32>,
    /// Per old octant: 1-based position in the new local slice, or 0 for
    /// octants that migrate away.
    pub old_to_new: Vec<i64>,
}

impl MigrationPlan {
    /// Compute the migration control data between two snapshots of the
    /// same global sequence under different partitions.
    pub fn compute<const D: usize>(
        old: &Forest<D>,
        new: &Forest<D>,
    ) -> Result<Self, ForestError> {
        if old.num_ranks() != new.num_ranks() {
            return Err(ForestError::ProcessGroupMismatch(old.num_ranks(), new.num_ranks()));
        }
        let my_rank = old.rank();

        let mut ranks_visited: Vec<usize> = Vec::new();
        let mut groups: HashMap<usize, Vec<i32>> = HashMap::new();
        let mut old_to_new = vec![0i64; old.local_num()];

        let new_octs = new.octants();
        let mut new_idx = 0usize;
        for (old_idx, q_old) in old.octants().iter().enumerate() {
            let dest = new.find_owner(q_old);
            if dest != my_rank {
                if !groups.contains_key(&dest) {
                    ranks_visited.push(dest);
                }
                groups.entry(dest).or_default().push(old_idx as i32 + 1);
                old_to_new[old_idx] = 0;
            } else {
                // Stayers appear in the new local slice in the same order.
                while new_octs.get(new_idx).is_some_and(|q_new| q_new != q_old) {
                    new_idx += 1;
                }
                if new_idx >= new_octs.len() {
                    return Err(ForestError::InconsistentSnapshots { old_index: old_idx });
                }
                old_to_new[old_idx] = new_idx as i64 + 1;
                new_idx += 1;
            }
        }

        let mut ranks = Vec::with_capacity(ranks_visited.len());
        let mut rank_ptrs = Vec::with_capacity(ranks_visited.len() + 1);
        let mut local_indices = Vec::new();
        rank_ptrs.push(1i32);
        for &dest in &ranks_visited {
            let group = &groups[&dest];
            ranks.push(dest as i32 + 1);
            rank_ptrs.push(*rank_ptrs.last().unwrap() + group.len() as i32);
            local_indices.extend_from_slice(group);
        }

        log::debug!(
            "migration plan on rank {}: {} movers to {} ranks, {} stayers",
            my_rank,
            local_indices.len(),
            ranks.len(),
            old.local_num() - local_indices.len()
        );
        Ok(Self { ranks, rank_ptrs, local_indices, old_to_new })
    }

    /// Number of destination ranks involved.
    pub fn num_ranks(&self) -> usize {
        self.ranks.len()
    }

    /// Number of octants leaving this rank.
    pub fn num_movers(&self) -> usize {
        self.local_indices.len()
    }
}
