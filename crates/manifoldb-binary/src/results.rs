//! k-NN result buffers.
//!
//! [`KnnHeap`] collects the `k` best candidates of a single query.
//! [`SearchResults`] holds the answers to a batch of queries as two
//! row-major `(nq, k)` arrays, one of distances and one of labels.

use std::collections::BinaryHeap;

use crate::types::{Distance, Label, NO_DISTANCE, NO_LABEL};

/// A candidate in a [`KnnHeap`], ordered by `(distance, label)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    distance: Distance,
    label: Label,
}

/// Bounded max-heap keeping the `k` closest candidates.
///
/// The worst kept candidate sits at the top so it can be replaced in
/// `O(log k)`. At equal distance the smaller label wins, which makes the
/// outcome independent of the order candidates are pushed in.
#[derive(Debug, Clone)]
pub struct KnnHeap {
    k: usize,
    heap: BinaryHeap<HeapEntry>,
}

impl KnnHeap {
    /// Create a heap keeping at most `k` candidates.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self { k, heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)) }
    }

    /// Offer a candidate. Returns `true` if it was kept.
    pub fn push(&mut self, distance: Distance, label: Label) -> bool {
        if self.k == 0 {
            return false;
        }
        let entry = HeapEntry { distance, label };
        if self.heap.len() < self.k {
            self.heap.push(entry);
            return true;
        }
        match self.heap.peek() {
            Some(worst) if entry < *worst => {
                self.heap.pop();
                self.heap.push(entry);
                true
            }
            _ => false,
        }
    }

    /// Distance of the worst kept candidate, or `NO_DISTANCE` while not full.
    #[must_use]
    pub fn threshold(&self) -> Distance {
        if self.heap.len() < self.k {
            NO_DISTANCE
        } else {
            self.heap.peek().map_or(NO_DISTANCE, |e| e.distance)
        }
    }

    /// Number of kept candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Check if no candidate has been kept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Consume into `(distance, label)` pairs, closest first.
    #[must_use]
    pub fn into_sorted(self) -> Vec<(Distance, Label)> {
        self.heap.into_sorted_vec().into_iter().map(|e| (e.distance, e.label)).collect()
    }
}

/// Results of a batched k-NN search.
///
/// Row `i` holds the neighbors of query `i`, closest first. Slots that could
/// not be filled hold [`NO_LABEL`] and [`NO_DISTANCE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResults {
    nq: usize,
    k: usize,
    distances: Vec<Distance>,
    labels: Vec<Label>,
}

impl SearchResults {
    /// Create results for `nq` queries with every slot empty.
    #[must_use]
    pub fn new(nq: usize, k: usize) -> Self {
        Self { nq, k, distances: vec![NO_DISTANCE; nq * k], labels: vec![NO_LABEL; nq * k] }
    }

    /// Assemble results from per-query rows.
    ///
    /// Rows longer than `k` are truncated; shorter rows are padded.
    #[must_use]
    pub fn from_rows(rows: Vec<Vec<(Distance, Label)>>, k: usize) -> Self {
        let mut results = Self::new(rows.len(), k);
        for (i, row) in rows.iter().enumerate() {
            results.set_row(i, row);
        }
        results
    }

    /// Number of queries.
    #[must_use]
    pub fn nq(&self) -> usize {
        self.nq
    }

    /// Number of result slots per query.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// All distances, row-major.
    #[must_use]
    pub fn distances(&self) -> &[Distance] {
        &self.distances
    }

    /// All labels, row-major.
    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Distances for query `i`.
    #[must_use]
    pub fn distances_row(&self, i: usize) -> &[Distance] {
        &self.distances[i * self.k..(i + 1) * self.k]
    }

    /// Labels for query `i`.
    #[must_use]
    pub fn labels_row(&self, i: usize) -> &[Label] {
        &self.labels[i * self.k..(i + 1) * self.k]
    }

    /// Iterate over the filled `(distance, label)` pairs of query `i`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (Distance, Label)> + '_ {
        self.distances_row(i)
            .iter()
            .copied()
            .zip(self.labels_row(i).iter().copied())
            .filter(|&(_, label)| label != NO_LABEL)
    }

    /// Overwrite query `i` with `row`, padding the remainder.
    pub fn set_row(&mut self, i: usize, row: &[(Distance, Label)]) {
        let start = i * self.k;
        for j in 0..self.k {
            let (distance, label) = row.get(j).copied().unwrap_or((NO_DISTANCE, NO_LABEL));
            self.distances[start + j] = distance;
            self.labels[start + j] = label;
        }
    }

    /// Translate every filled label, leaving missing slots untouched.
    pub fn map_labels(&mut self, mut f: impl FnMut(Label) -> Label) {
        for label in &mut self.labels {
            if *label != NO_LABEL {
                *label = f(*label);
            }
        }
    }
}


#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_heap_matches_sort(
            distances in proptest::collection::vec(0i32..64, 0..200),
            k in 1usize..20,
        ) {
            let mut heap = KnnHeap::new(k);
            for (label, &d) in distances.iter().enumerate() {
                heap.push(d, label as Label);
            }

            let mut expected: Vec<(Distance, Label)> =
                distances.iter().enumerate().map(|(l, &d)| (d, l as Label)).collect();
            expected.sort_unstable();
            expected.truncate(k);

            prop_assert_eq!(heap.into_sorted(), expected);
        }
    }
}
