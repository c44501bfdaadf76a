//! Comparing k-NN results.
//!
//! Hamming distances are small integers, so ties ("draws") are common and
//! two correct searches may list tied neighbors in a different order or, at
//! the cut-off rank, pick different members of a tied group. The checks here
//! accept exactly that freedom and nothing more.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::results::SearchResults;
use crate::types::{Distance, Label, NO_LABEL};

/// Why two result sets were judged different.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KnnMismatch {
    /// The result arrays have different shapes.
    #[error("shape mismatch: reference is {ref_nq}x{ref_k}, candidate is {cand_nq}x{cand_k}")]
    Shape {
        /// Reference query count.
        ref_nq: usize,
        /// Reference k.
        ref_k: usize,
        /// Candidate query count.
        cand_nq: usize,
        /// Candidate k.
        cand_k: usize,
    },

    /// A distance differs.
    #[error("distance mismatch at query {query}, rank {rank}: expected {expected}, got {actual}")]
    Distance {
        /// Query row.
        query: usize,
        /// Position within the row.
        rank: usize,
        /// Reference distance.
        expected: Distance,
        /// Candidate distance.
        actual: Distance,
    },

    /// The labels at one distance differ as sets.
    #[error("label mismatch at query {query}, distance {distance}: expected {expected:?}, got {actual:?}")]
    Labels {
        /// Query row.
        query: usize,
        /// The distance group that differs.
        distance: Distance,
        /// Reference labels at that distance.
        expected: Vec<Label>,
        /// Candidate labels at that distance.
        actual: Vec<Label>,
    },
}

/// Check that two k-NN results are identical up to ties.
///
/// Distances must match exactly. For each query whose label rows differ,
/// the labels found at each distance must match as sets, except for the
/// largest distance of the row: the search was truncated inside that group,
/// so its members are arbitrary.
///
/// # Errors
///
/// Returns the first [`KnnMismatch`] found.
pub fn check_knn_with_draws(
    reference: &SearchResults,
    candidate: &SearchResults,
) -> Result<(), KnnMismatch> {
    if reference.nq() != candidate.nq() || reference.k() != candidate.k() {
        return Err(KnnMismatch::Shape {
            ref_nq: reference.nq(),
            ref_k: reference.k(),
            cand_nq: candidate.nq(),
            cand_k: candidate.k(),
        });
    }

    for query in 0..reference.nq() {
        let ref_d = reference.distances_row(query);
        let cand_d = candidate.distances_row(query);
        for (rank, (&expected, &actual)) in ref_d.iter().zip(cand_d).enumerate() {
            if expected != actual {
                return Err(KnnMismatch::Distance { query, rank, expected, actual });
            }
        }
    }

    for query in 0..reference.nq() {
        let ref_l = reference.labels_row(query);
        let cand_l = candidate.labels_row(query);
        if ref_l == cand_l {
            continue;
        }

        let ref_d = reference.distances_row(query);
        let Some(&skip) = ref_d.last() else {
            continue;
        };
        let groups: BTreeSet<Distance> = ref_d.iter().copied().collect();

        for distance in groups {
            if distance == skip {
                continue;
            }
            let expected = labels_at(ref_d, ref_l, distance);
            let actual = labels_at(ref_d, cand_l, distance);
            if expected != actual {
                return Err(KnnMismatch::Labels {
                    query,
                    distance,
                    expected: expected.into_iter().collect(),
                    actual: actual.into_iter().collect(),
                });
            }
        }
    }

    Ok(())
}

fn labels_at(distances: &[Distance], labels: &[Label], distance: Distance) -> BTreeSet<Label> {
    distances.iter().zip(labels).filter(|(&d, _)| d == distance).map(|(_, &l)| l).collect()
}

/// Fraction of reference neighbors also present in the candidate rows.
///
/// Missing reference slots are not counted. Returns 1.0 when the reference
/// holds no labels at all.
#[must_use]
pub fn knn_recall(reference: &SearchResults, candidate: &SearchResults) -> f64 {
    let mut found = 0usize;
    let mut total = 0usize;

    for query in 0..reference.nq().min(candidate.nq()) {
        let cand: BTreeSet<Label> = candidate.labels_row(query).iter().copied().collect();
        for &label in reference.labels_row(query) {
            if label == NO_LABEL {
                continue;
            }
            total += 1;
            if cand.contains(&label) {
                found += 1;
            }
        }
    }

    if total == 0 {
        1.0
    } else {
        found as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(rows: Vec<Vec<(Distance, Label)>>, k: usize) -> SearchResults {
        SearchResults::from_rows(rows, k)
    }

    #[test]
    fn test_identical_results_pass() {
        let a = results(vec![vec![(1, 4), (2, 5), (3, 6)]], 3);
        assert_eq!(check_knn_with_draws(&a, &a.clone()), Ok(()));
    }

    #[test]
    fn test_reordered_ties_pass() {
        let a = results(vec![vec![(1, 4), (1, 5), (3, 6)]], 3);
        let b = results(vec![vec![(1, 5), (1, 4), (3, 6)]], 3);
        assert_eq!(check_knn_with_draws(&a, &b), Ok(()));
    }

    #[test]
    fn test_truncated_last_group_passes() {
        let a = results(vec![vec![(1, 4), (2, 5), (2, 6)]], 3);
        let b = results(vec![vec![(1, 4), (2, 7), (2, 5)]], 3);
        assert_eq!(check_knn_with_draws(&a, &b), Ok(()));
    }

    #[test]
    fn test_different_inner_group_fails() {
        let a = results(vec![vec![(1, 4), (1, 5), (3, 6)]], 3);
        let b = results(vec![vec![(1, 4), (1, 8), (3, 6)]], 3);
        assert!(matches!(
            check_knn_with_draws(&a, &b),
            Err(KnnMismatch::Labels { query: 0, distance: 1, .. })
        ));
    }

    #[test]
    fn test_distance_mismatch_fails() {
        let a = results(vec![vec![(1, 4), (2, 5)]], 2);
        let b = results(vec![vec![(1, 4), (3, 5)]], 2);
        assert_eq!(
            check_knn_with_draws(&a, &b),
            Err(KnnMismatch::Distance { query: 0, rank: 1, expected: 2, actual: 3 })
        );
    }

    #[test]
    fn test_shape_mismatch_fails() {
        let a = results(vec![vec![(1, 4)]], 1);
        let b = results(vec![vec![(1, 4)]], 2);
        assert!(matches!(check_knn_with_draws(&a, &b), Err(KnnMismatch::Shape { .. })));
    }

    #[test]
    fn test_recall() {
        let a = results(vec![vec![(1, 1), (2, 2)], vec![(1, 3), (2, 4)]], 2);
        let b = results(vec![vec![(1, 1), (2, 9)], vec![(1, 4), (2, 3)]], 2);
        assert!((knn_recall(&a, &b) - 0.75).abs() < 1e-12);

        let empty = SearchResults::new(2, 2);
        assert!((knn_recall(&empty, &b) - 1.0).abs() < 1e-12);
    }
}

#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use super::*;

    /// One distance-sorted row labelled `0..len`.
    fn row() -> impl Strategy<Value = Vec<(Distance, Label)>> {
        proptest::collection::vec(0i32..6, 2..16).prop_map(|mut distances| {
            distances.sort_unstable();
            distances.into_iter().enumerate().map(|(l, d)| (d, l as Label)).collect()
        })
    }

    /// Rotate the labels inside every run of equal distances.
    fn rotate_ties(row: &[(Distance, Label)], by: usize) -> Vec<(Distance, Label)> {
        let mut out = Vec::with_capacity(row.len());
        for group in row.chunk_by(|a, b| a.0 == b.0) {
            let mut labels: Vec<Label> = group.iter().map(|&(_, l)| l).collect();
            let len = labels.len();
            labels.rotate_left(by % len);
            out.extend(group.iter().zip(labels).map(|(&(d, _), l)| (d, l)));
        }
        out
    }

    fn single(row: Vec<(Distance, Label)>) -> SearchResults {
        let k = row.len();
        SearchResults::from_rows(vec![row], k)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_reordered_ties_pass(row in row(), by in 0usize..16) {
            let candidate = single(rotate_ties(&row, by));
            prop_assert_eq!(check_knn_with_draws(&single(row), &candidate), Ok(()));
        }

        #[test]
        fn prop_changed_label_before_last_group_fails(row in row(), pos in 0usize..16) {
            let last = row[row.len() - 1].0;
            let pos = pos % row.len();
            prop_assume!(row[pos].0 != last);

            let mut changed = row.clone();
            changed[pos].1 = 1_000;
            let outcome = check_knn_with_draws(&single(row), &single(changed));
            prop_assert!(matches!(outcome, Err(KnnMismatch::Labels { .. })), "{:?}", outcome);
        }

        #[test]
        fn prop_last_group_members_are_free(row in row(), pos in 0usize..16) {
            let last = row[row.len() - 1].0;
            let pos = pos % row.len();
            prop_assume!(row[pos].0 == last);

            let mut changed = row.clone();
            changed[pos].1 = 1_000;
            prop_assert_eq!(check_knn_with_draws(&single(row), &single(changed)), Ok(()));
        }
    }
}
