//! Exact brute-force binary index.
//!
//! Computes the Hamming distance from every query to every stored code.
//! This is the ground truth the graph index is validated against, and is
//! also used to seed small graph builds.
//!
//! # Complexity
//!
//! O(nq * n * d / 64). For large datasets use
//! [`BinaryCagraIndex`](super::BinaryCagraIndex) instead.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::distance::HammingComputer;
use crate::error::{BinaryIndexError, Result};
use crate::results::{KnnHeap, SearchResults};
use crate::types::{validate_dimension, BinaryCodes, Distance, Label};

use super::graph::Neighbor;
use super::traits::{check_codes, check_search_args, BinaryIndex};

/// Exact k-NN index over packed binary codes.
///
/// # Example
///
/// ```
/// use manifoldb_binary::index::{BinaryFlatIndex, BinaryIndex};
/// use manifoldb_binary::types::BinaryCodes;
///
/// let mut index = BinaryFlatIndex::new(8).unwrap();
/// index.add(&BinaryCodes::new(vec![0b0000_0000, 0b1111_1111, 0b0000_0011], 8).unwrap()).unwrap();
///
/// let query = BinaryCodes::new(vec![0b0000_0001], 8).unwrap();
/// let results = index.search(&query, 2).unwrap();
///
/// assert_eq!(results.labels_row(0), &[0, 2]);
/// assert_eq!(results.distances_row(0), &[1, 1]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryFlatIndex {
    codes: BinaryCodes,
}

impl BinaryFlatIndex {
    /// Create an empty index for `dimension`-bit vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if `dimension` is not a positive multiple of 8.
    pub fn new(dimension: usize) -> Result<Self> {
        validate_dimension(dimension)?;
        Ok(Self { codes: BinaryCodes::empty(dimension)? })
    }

    /// Create an index holding `codes`, labelled `0..n`.
    #[must_use]
    pub fn from_codes(codes: BinaryCodes) -> Self {
        Self { codes }
    }

    /// The stored codes.
    #[must_use]
    pub fn codes(&self) -> &BinaryCodes {
        &self.codes
    }

    /// Find all stored codes with distance strictly below `radius`.
    ///
    /// A radius of 0 returns nothing; a radius of 1 returns exact duplicates.
    ///
    /// # Errors
    ///
    /// Returns an error if the query dimension doesn't match.
    pub fn range_search(
        &self,
        queries: &BinaryCodes,
        radius: Distance,
    ) -> Result<Vec<Vec<(Label, Distance)>>> {
        check_codes(self.dimension(), queries)?;

        let rows = (0..queries.len())
            .into_par_iter()
            .map(|q| {
                let computer = HammingComputer::new(queries.row(q));
                let mut hits: Vec<(Label, Distance)> = self
                    .codes
                    .rows()
                    .enumerate()
                    .filter_map(|(i, code)| {
                        let d = computer.distance(code);
                        (d < radius).then_some((i as Label, d))
                    })
                    .collect();
                hits.sort_by_key(|&(label, d)| (d, label));
                hits
            })
            .collect();

        Ok(rows)
    }

    /// Exact k-NN lists of every stored code, excluding the code itself.
    ///
    /// Lists are sorted by `(distance, id)` and hold `min(k, n - 1)` entries.
    #[must_use]
    pub fn knn_graph(&self, k: usize) -> Vec<Vec<Neighbor>> {
        let n = self.codes.len();
        let k = k.min(n.saturating_sub(1));

        (0..n)
            .into_par_iter()
            .map(|i| {
                let computer = HammingComputer::new(self.codes.row(i));
                let mut heap = KnnHeap::new(k);
                for (j, code) in self.codes.rows().enumerate() {
                    if j != i {
                        heap.push(computer.distance(code), j as Label);
                    }
                }
                heap.into_sorted()
                    .into_iter()
                    .map(|(distance, id)| Neighbor::new(id as u32, distance))
                    .collect()
            })
            .collect()
    }

    /// Remove the vectors with the given labels and relabel the rest sequentially.
    ///
    /// Returns the number of vectors removed.
    pub fn remove_ids(&mut self, labels: &[Label]) -> usize {
        let doomed: HashSet<Label> = labels.iter().copied().collect();
        let before = self.codes.len();
        self.codes.retain_rows(|i| !doomed.contains(&(i as Label)));
        before - self.codes.len()
    }

    fn search_one(&self, query: &[u8], k: usize) -> Vec<(Distance, Label)> {
        let computer = HammingComputer::new(query);
        let mut heap = KnnHeap::new(k);
        for (i, code) in self.codes.rows().enumerate() {
            let d = computer.distance(code);
            if d <= heap.threshold() {
                heap.push(d, i as Label);
            }
        }
        heap.into_sorted()
    }
}

impl BinaryIndex for BinaryFlatIndex {
    fn dimension(&self) -> usize {
        self.codes.dimension()
    }

    fn ntotal(&self) -> usize {
        self.codes.len()
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn train(&mut self, codes: &BinaryCodes) -> Result<()> {
        check_codes(self.dimension(), codes)
    }

    fn add(&mut self, codes: &BinaryCodes) -> Result<()> {
        check_codes(self.dimension(), codes)?;
        self.codes.extend(codes)
    }

    fn search(&self, queries: &BinaryCodes, k: usize) -> Result<SearchResults> {
        check_search_args(self.dimension(), queries, k)?;

        let rows: Vec<Vec<(Distance, Label)>> =
            (0..queries.len()).into_par_iter().map(|q| self.search_one(queries.row(q), k)).collect();

        Ok(SearchResults::from_rows(rows, k))
    }

    fn reset(&mut self) -> Result<()> {
        self.codes.clear();
        Ok(())
    }

    fn reconstruct(&self, label: Label) -> Result<Vec<u8>> {
        usize::try_from(label)
            .ok()
            .and_then(|i| self.codes.get(i))
            .map(<[u8]>::to_vec)
            .ok_or(BinaryIndexError::UnknownId(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NO_DISTANCE, NO_LABEL};

    fn codes(bytes: &[u8]) -> BinaryCodes {
        BinaryCodes::new(bytes.to_vec(), 8).unwrap()
    }

    fn create_test_index() -> BinaryFlatIndex {
        let mut index = BinaryFlatIndex::new(8).unwrap();
        // Distances from 0x00: 0, 1, 2, 4, 8
        index.add(&codes(&[0x00, 0x01, 0x03, 0x0F, 0xFF])).unwrap();
        index
    }

    #[test]
    fn test_new_invalid_dimension() {
        assert!(matches!(
            BinaryFlatIndex::new(7),
            Err(BinaryIndexError::InvalidDimension { dimension: 7 })
        ));
    }

    #[test]
    fn test_search_empty_index_pads() {
        let index = BinaryFlatIndex::new(8).unwrap();
        let results = index.search(&codes(&[0x00]), 2).unwrap();
        assert_eq!(results.labels_row(0), &[NO_LABEL, NO_LABEL]);
        assert_eq!(results.distances_row(0), &[NO_DISTANCE, NO_DISTANCE]);
    }

    #[test]
    fn test_search_k_smaller_than_n() {
        let index = create_test_index();
        let results = index.search(&codes(&[0x00, 0xFF]), 3).unwrap();

        assert_eq!(results.labels_row(0), &[0, 1, 2]);
        assert_eq!(results.distances_row(0), &[0, 1, 2]);
        assert_eq!(results.labels_row(1), &[4, 3, 2]);
        assert_eq!(results.distances_row(1), &[0, 4, 6]);
    }

    #[test]
    fn test_search_k_larger_than_n() {
        let index = create_test_index();
        let results = index.search(&codes(&[0x00]), 7).unwrap();
        assert_eq!(results.labels_row(0)[..5], [0, 1, 2, 3, 4]);
        assert_eq!(results.labels_row(0)[5..], [NO_LABEL, NO_LABEL]);
    }

    #[test]
    fn test_search_zero_k() {
        let index = create_test_index();
        assert!(matches!(index.search(&codes(&[0x00]), 0), Err(BinaryIndexError::InvalidK { .. })));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = create_test_index();
        let wide = BinaryCodes::new(vec![0, 0], 16).unwrap();
        assert!(matches!(index.search(&wide, 1), Err(BinaryIndexError::DimensionMismatch { .. })));
        assert!(matches!(index.add(&wide), Err(BinaryIndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_ties_broken_by_label() {
        let mut index = BinaryFlatIndex::new(8).unwrap();
        index.add(&codes(&[0x02, 0x01, 0x04, 0x08])).unwrap();
        let results = index.search(&codes(&[0x00]), 2).unwrap();
        assert_eq!(results.labels_row(0), &[0, 1]);
    }

    #[test]
    fn test_range_search() {
        let index = create_test_index();
        let hits = index.range_search(&codes(&[0x00]), 3).unwrap();
        assert_eq!(hits[0], vec![(0, 0), (1, 1), (2, 2)]);

        let none = index.range_search(&codes(&[0x00]), 0).unwrap();
        assert!(none[0].is_empty());
    }

    #[test]
    fn test_knn_graph_excludes_self() {
        let index = create_test_index();
        let graph = index.knn_graph(2);
        assert_eq!(graph.len(), 5);
        assert_eq!(graph[0], vec![Neighbor::new(1, 1), Neighbor::new(2, 2)]);
        for (i, list) in graph.iter().enumerate() {
            assert!(list.iter().all(|n| n.id as usize != i));
        }
    }

    #[test]
    fn test_reconstruct_and_remove() {
        let mut index = create_test_index();
        assert_eq!(index.reconstruct(3).unwrap(), vec![0x0F]);
        assert!(matches!(index.reconstruct(9), Err(BinaryIndexError::UnknownId(9))));
        assert!(matches!(index.reconstruct(-1), Err(BinaryIndexError::UnknownId(-1))));

        assert_eq!(index.remove_ids(&[0, 3, 42]), 2);
        assert_eq!(index.ntotal(), 3);
        assert_eq!(index.reconstruct(2).unwrap(), vec![0xFF]);

        index.reset().unwrap();
        assert!(index.is_empty());
    }
}
