//! Weighted repartitioning of the global Morton sequence.
//!
//! The octant sequence never changes under partition; only the cut points
//! between ranks move. Cuts are placed by cumulative weight (uniform
//! weight 1 by default) and optionally snapped so that no complete family
//! of `2^D` siblings is split across two ranks — splitting a family would
//! make it uncoarsenable until the next repartition.

use crate::comm::wire::{self, WireOctant};
use crate::comm::Communicator;
use crate::error::ForestError;
use crate::forest::Forest;
use crate::octant::{Octant, RefineFlag};

/// Options controlling [`Forest::partition`].
#[derive(Debug, Clone, Copy)]
pub struct PartitionOptions {
    /// Keep complete sibling families on a single rank.
    pub family_snapping: bool,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self { family_snapping: true }
    }
}

impl<const D: usize> Forest<D> {
    /// Collectively redistribute the global sequence across ranks.
    ///
    /// `weights` gives one non-negative weight per local octant (uniform
    /// weight 1 when `None`). Each rank ends up with a contiguous Morton
    /// range of roughly equal total weight.
    pub fn partition<C: Communicator>(
        &self,
        weights: Option<&[u64]>,
        options: PartitionOptions,
        comm: &C,
    ) -> Result<Forest<D>, ForestError> {
        if let Some(w) = weights {
            if w.len() != self.local_num() {
                return Err(ForestError::FlagLengthMismatch {
                    got: w.len(),
                    expected: self.local_num(),
                });
            }
        }
        let nranks = comm.size();
        let my_rank = comm.rank();
        let n_global = self.global_num();

        let mut cuts = self.weighted_cuts(weights, comm);
        if options.family_snapping && nranks > 1 {
            self.snap_cuts_to_families(&mut cuts, comm);
        }
        for b in 1..=nranks {
            cuts[b] = cuts[b].max(cuts[b - 1]).min(n_global);
        }
        log::debug!("partition cuts: {:?}", cuts);

        // Ship octants (with their flags) to their new owners.
        let my_first = self.global_first()[my_rank];
        let mut stayers: Vec<(Octant<D>, RefineFlag)> = Vec::new();
        let mut per_dest: Vec<Vec<WireOctant>> = vec![Vec::new(); nranks];
        for (i, (oct, &flag)) in self.octants().iter().zip(self.flags()).enumerate() {
            let g = my_first + i as u64;
            let dest = cuts[1..nranks].partition_point(|&c| c <= g);
            if dest == my_rank {
                stayers.push((*oct, flag));
            } else {
                per_dest[dest].push(WireOctant::encode(oct, flag, i));
            }
        }
        let outgoing: Vec<(usize, Vec<u8>)> = per_dest
            .into_iter()
            .enumerate()
            .filter(|(dest, batch)| *dest != my_rank && !batch.is_empty())
            .map(|(dest, batch)| (dest, wire::to_bytes(&batch)))
            .collect();

        let mut incoming: Vec<(Octant<D>, RefineFlag)> = comm
            .exchange(outgoing)
            .into_iter()
            .flat_map(|(_, bytes)| wire::from_bytes(&bytes))
            .map(|record| {
                let (oct, flag, _) = record.decode::<D>();
                (oct, flag)
            })
            .collect();
        incoming.extend(stayers);
        incoming.sort_by(|a, b| a.0.cmp_morton(&b.0));

        let (octants, flags): (Vec<_>, Vec<_>) = incoming.into_iter().unzip();
        Ok(self.succeed(octants, flags, comm))
    }

    /// Compute raw cut points from cumulative weights.
    fn weighted_cuts<C: Communicator>(&self, weights: Option<&[u64]>, comm: &C) -> Vec<u64> {
        let nranks = comm.size();
        let my_rank = comm.rank();
        let n_global = self.global_num();

        let local_total: u64 = match weights {
            Some(w) => w.iter().sum(),
            None => self.local_num() as u64,
        };
        let totals = comm.allgather_u64(local_total);
        let w_total: u64 = totals.iter().sum();

        let mut cuts = vec![0u64; nranks + 1];
        cuts[nranks] = n_global;
        if w_total == 0 {
            for b in 1..nranks {
                cuts[b] = n_global * b as u64 / nranks as u64;
            }
            return cuts;
        }

        let base: u64 = totals[..my_rank].iter().sum();
        let cum: Vec<u64> = {
            let mut acc = 0u64;
            (0..self.local_num())
                .map(|i| {
                    acc += weights.map_or(1, |w| w[i]);
                    acc
                })
                .collect()
        };

        // Each rank reports the cuts landing inside its weight window.
        let mut mine = Vec::new();
        for b in 1..nranks {
            let target = (w_total as u128 * b as u128 / nranks as u128) as u64;
            if base <= target && target < base + local_total {
                let i = cum.partition_point(|&c| c <= target - base);
                mine.push((b as u64, self.global_first()[my_rank] + i as u64));
            }
        }
        for blob in comm.allgather_bytes(&encode_pairs(&mine)) {
            for (b, idx) in decode_pairs(&blob) {
                cuts[b as usize] = idx;
            }
        }
        cuts
    }

    /// Move each cut down to the start of the complete sibling family it
    /// would otherwise split.
    ///
    /// The few octants around a cut may live on neighboring ranks, so each
    /// rank publishes its head and tail (up to `2^D - 1` octants each);
    /// the old owner of a cut decides the snap and publishes the result.
    fn snap_cuts_to_families<C: Communicator>(&self, cuts: &mut [u64], comm: &C) {
        let nranks = comm.size();
        let my_rank = comm.rank();
        let fam = Octant::<D>::NUM_CHILDREN;
        let margin = fam - 1;

        let pack = |octs: &[Octant<D>]| {
            let records: Vec<WireOctant> = octs
                .iter()
                .map(|o| WireOctant::encode(o, RefineFlag::Keep, 0))
                .collect();
            wire::to_bytes(&records)
        };
        let head_n = self.local_num().min(margin);
        let tail_n = self.local_num().min(margin);
        let heads: Vec<Vec<Octant<D>>> = comm
            .allgather_bytes(&pack(&self.octants()[..head_n]))
            .iter()
            .map(|b| wire::from_bytes(b).iter().map(|r| r.decode::<D>().0).collect())
            .collect();
        let tails: Vec<Vec<Octant<D>>> = comm
            .allgather_bytes(&pack(&self.octants()[self.local_num() - tail_n..]))
            .iter()
            .map(|b| wire::from_bytes(b).iter().map(|r| r.decode::<D>().0).collect())
            .collect();

        let gf = self.global_first();
        let lookup = |g: u64| -> Option<Octant<D>> {
            if g >= gf[my_rank] && g < gf[my_rank + 1] {
                return Some(self.octants()[(g - gf[my_rank]) as usize]);
            }
            for r in 0..nranks {
                if g >= gf[r] && g < gf[r + 1] {
                    let head = &heads[r];
                    if g - gf[r] < head.len() as u64 {
                        return Some(head[(g - gf[r]) as usize]);
                    }
                    let tail = &tails[r];
                    let tail_first = gf[r + 1] - tail.len() as u64;
                    if g >= tail_first {
                        return Some(tail[(g - tail_first) as usize]);
                    }
                    return None;
                }
            }
            None
        };

        let mut snapped = Vec::new();
        for b in 1..nranks {
            let cut = cuts[b];
            if cut < gf[my_rank] || cut >= gf[my_rank + 1] {
                continue;
            }
            let q = self.octants()[(cut - gf[my_rank]) as usize];
            if q.level == 0 {
                continue;
            }
            let id = q.child_id();
            if id == 0 || cut < id as u64 {
                continue;
            }
            let start = cut - id as u64;
            if start + fam as u64 > self.global_num() {
                continue;
            }
            let parent = q.ancestor(q.level - 1);
            let complete = (0..fam as u64).all(|j| {
                lookup(start + j)
                    .is_some_and(|s| s.level == q.level && parent.is_ancestor_of(&s))
            });
            if complete {
                snapped.push((b as u64, start));
            }
        }
        for blob in comm.allgather_bytes(&encode_pairs(&snapped)) {
            for (b, idx) in decode_pairs(&blob) {
                cuts[b as usize] = idx;
            }
        }
    }
}

fn encode_pairs(pairs: &[(u64, u64)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pairs.len() * 16);
    for &(a, b) in pairs {
        out.extend_from_slice(&a.to_le_bytes());
        out.extend_from_slice(&b.to_le_bytes());
    }
    out
}

fn decode_pairs(bytes: &[u8]) -> Vec<(u64, u64)> {
    bytes
        .chunks_exact(16)
        .map(|c| {
            (
                u64::from_le_bytes(c[..8].try_into().unwrap()),
                u64::from_le_bytes(c[8..].try_into().unwrap()),
            )
        })
        .collect()
}
