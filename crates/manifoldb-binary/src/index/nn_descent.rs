//! NN-descent k-NN graph construction.
//!
//! Every node starts with a random neighbor list. Each iteration performs a
//! local join: for every node, pairs drawn from its new and old neighbors
//! (forward and reverse) are compared, and each pair is offered to both
//! members' lists. Entries that entered a list during the previous iteration
//! are "new" and take part in the next join; the rest are "old" and are only
//! joined against new ones.
//!
//! Joins are computed in parallel in fixed batches and merged in a sorted
//! order, so the result depends only on the dataset and the seed.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::debug;

use crate::distance::HammingComputer;
use crate::types::{BinaryCodes, Distance};

use super::graph::Neighbor;

/// New and old candidates sampled per node for each local join.
const JOIN_SAMPLES: usize = 32;

/// Nodes whose joins are computed before merging.
const BATCH_SIZE: usize = 1024;

/// Per-node join candidates of one iteration.
struct Candidates<'a> {
    fresh: &'a [Vec<u32>],
    rev_fresh: &'a [Vec<u32>],
    stale: &'a [Vec<u32>],
    rev_stale: &'a [Vec<u32>],
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    neighbor: Neighbor,
    is_new: bool,
}

/// Build approximate k-NN lists for every code in `dataset`.
///
/// Lists hold `min(degree, n - 1)` neighbors sorted by `(distance, id)`,
/// never containing the node itself. Iteration stops after `niter` rounds or
/// once a round performs at most `termination_threshold * n * degree`
/// updates.
#[must_use]
pub fn build_knn_graph(
    dataset: &BinaryCodes,
    degree: usize,
    niter: usize,
    termination_threshold: f64,
    seed: u64,
) -> Vec<Vec<Neighbor>> {
    let n = dataset.len();
    if n < 2 || degree == 0 {
        return vec![Vec::new(); n];
    }
    let degree = degree.min(n - 1);

    let mut lists = initial_lists(dataset, degree, seed);
    let stop_below = (termination_threshold * (n * degree) as f64).floor() as usize;

    for iteration in 0..niter {
        let (fresh, stale): (Vec<Vec<u32>>, Vec<Vec<u32>>) =
            lists.par_iter_mut().map(|list| sample_candidates(list)).unzip();
        let (rev_fresh, rev_stale) = (reverse(&fresh, n), reverse(&stale, n));
        let candidates = Candidates {
            fresh: &fresh,
            rev_fresh: &rev_fresh,
            stale: &stale,
            rev_stale: &rev_stale,
        };

        let mut updates = 0usize;
        for start in (0..n).step_by(BATCH_SIZE) {
            let end = (start + BATCH_SIZE).min(n);
            let worst: Vec<Distance> = lists
                .iter()
                .map(|list| list.last().map_or(Distance::MAX, |e| e.neighbor.distance))
                .collect();
            let mut proposals: Vec<(u32, Neighbor)> = (start..end)
                .into_par_iter()
                .flat_map_iter(|u| local_join(dataset, &candidates, u, &worst))
                .collect();
            proposals.par_sort_unstable();
            proposals.dedup();

            for (target, neighbor) in proposals {
                if insert(&mut lists[target as usize], neighbor, degree) {
                    updates += 1;
                }
            }
        }

        debug!(iteration, updates, "nn-descent iteration");
        if updates <= stop_below {
            break;
        }
    }

    lists.into_iter().map(|list| list.into_iter().map(|e| e.neighbor).collect()).collect()
}

/// Random distinct neighbors for every node, sorted and all marked new.
fn initial_lists(dataset: &BinaryCodes, degree: usize, seed: u64) -> Vec<Vec<Entry>> {
    let n = dataset.len();
    (0..n)
        .into_par_iter()
        .map(|x| {
            let mut rng =
                StdRng::seed_from_u64(seed ^ (x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            let computer = HammingComputer::new(dataset.row(x));
            let mut list: Vec<Entry> = rand::seq::index::sample(&mut rng, n - 1, degree)
                .into_iter()
                .map(|j| if j >= x { j + 1 } else { j })
                .map(|id| Entry {
                    neighbor: Neighbor::new(id as u32, computer.distance(dataset.row(id))),
                    is_new: true,
                })
                .collect();
            list.sort_unstable_by_key(|e| e.neighbor);
            list
        })
        .collect()
}

/// Pick up to `JOIN_SAMPLES` new and old neighbors. Sampled new entries become old.
fn sample_candidates(list: &mut [Entry]) -> (Vec<u32>, Vec<u32>) {
    let mut fresh = Vec::with_capacity(JOIN_SAMPLES);
    let mut stale = Vec::with_capacity(JOIN_SAMPLES);
    for entry in list.iter_mut() {
        if entry.is_new {
            if fresh.len() < JOIN_SAMPLES {
                fresh.push(entry.neighbor.id);
                entry.is_new = false;
            }
        } else if stale.len() < JOIN_SAMPLES {
            stale.push(entry.neighbor.id);
        }
    }
    (fresh, stale)
}

/// Reverse adjacency, capped at `JOIN_SAMPLES` per node.
fn reverse(forward: &[Vec<u32>], n: usize) -> Vec<Vec<u32>> {
    let mut reversed: Vec<Vec<u32>> = vec![Vec::new(); n];
    for (x, ids) in forward.iter().enumerate() {
        for &y in ids {
            let slot = &mut reversed[y as usize];
            if slot.len() < JOIN_SAMPLES {
                slot.push(x as u32);
            }
        }
    }
    reversed
}

/// Compare new-new and new-old candidate pairs around node `u`.
///
/// A pair is only proposed to a member whose list it could enter.
fn local_join(
    dataset: &BinaryCodes,
    candidates: &Candidates<'_>,
    u: usize,
    worst: &[Distance],
) -> Vec<(u32, Neighbor)> {
    let mut new_ids: Vec<u32> =
        candidates.fresh[u].iter().chain(&candidates.rev_fresh[u]).copied().collect();
    new_ids.sort_unstable();
    new_ids.dedup();

    let mut old_ids: Vec<u32> = candidates.stale[u]
        .iter()
        .chain(&candidates.rev_stale[u])
        .copied()
        .filter(|id| new_ids.binary_search(id).is_err())
        .collect();
    old_ids.sort_unstable();
    old_ids.dedup();

    let mut proposals = Vec::new();
    for (i, &a) in new_ids.iter().enumerate() {
        let computer = HammingComputer::new(dataset.row(a as usize));
        for &b in new_ids[i + 1..].iter().chain(&old_ids) {
            if a == b {
                continue;
            }
            let distance = computer.distance(dataset.row(b as usize));
            if distance <= worst[a as usize] {
                proposals.push((a, Neighbor::new(b, distance)));
            }
            if distance <= worst[b as usize] {
                proposals.push((b, Neighbor::new(a, distance)));
            }
        }
    }
    proposals
}

/// Offer `neighbor` to a sorted list of capacity `degree`.
fn insert(list: &mut Vec<Entry>, neighbor: Neighbor, degree: usize) -> bool {
    if list.len() >= degree && list.last().is_some_and(|worst| neighbor >= worst.neighbor) {
        return false;
    }
    if list.iter().any(|e| e.neighbor.id == neighbor.id) {
        return false;
    }
    let position = list.partition_point(|e| e.neighbor < neighbor);
    list.insert(position, Entry { neighbor, is_new: true });
    list.truncate(degree);
    true
}
