//! Iterative-search k-NN graph construction.
//!
//! The graph is grown over a doubling prefix of the dataset. A small initial
//! prefix gets exact k-NN lists. After that, every node of the next, larger
//! prefix searches the graph built so far for its candidate list, and the
//! lists are optimized into the next graph. Once the whole dataset is
//! covered, a few refinement rounds repeat the search over the full graph.

use rayon::prelude::*;
use tracing::debug;

use crate::error::Result;
use crate::types::BinaryCodes;

use super::config::SearchParams;
use super::flat::BinaryFlatIndex;
use super::graph::{optimize, search_graph, FixedDegreeGraph, Neighbor};

/// Smallest prefix that gets exact k-NN lists.
const MIN_INITIAL_SIZE: usize = 1024;

/// Search rounds over the complete graph.
const REFINE_ROUNDS: usize = 2;

/// Build approximate k-NN lists of `intermediate_degree` neighbors for every
/// code in `dataset`.
///
/// Lists are sorted by `(distance, id)` and never contain the node itself.
///
/// # Errors
///
/// Returns an error if the dataset cannot be partitioned into prefixes.
pub fn build_knn_graph(
    dataset: &BinaryCodes,
    intermediate_degree: usize,
    graph_degree: usize,
    seed: u64,
) -> Result<Vec<Vec<Neighbor>>> {
    let n = dataset.len();
    if n < 2 || intermediate_degree == 0 {
        return Ok(vec![Vec::new(); n]);
    }
    let intermediate_degree = intermediate_degree.min(n - 1);
    let graph_degree = graph_degree.clamp(1, intermediate_degree);

    let initial = n.min(MIN_INITIAL_SIZE.max(8 * (intermediate_degree + 1)));
    let prefix = BinaryFlatIndex::from_codes(dataset.slice(0..initial)?);
    let mut knn = prefix.knn_graph(intermediate_degree);
    let mut graph = optimize(&knn, graph_degree.min(initial - 1));
    debug!(covered = initial, n, "iterative build: exact prefix");
    if initial == n {
        return Ok(knn);
    }

    let params = SearchParams::default()
        .with_itopk_size((2 * intermediate_degree).max(64))
        .with_search_width(4)
        .with_num_random_samplings(4)
        .with_seed(seed);

    let mut covered = initial;
    while covered < n {
        covered = n.min(covered * 2);
        knn = search_lists(&graph, dataset, covered, intermediate_degree, &params);
        graph = optimize(&knn, graph_degree.min(covered - 1));
        debug!(covered, n, "iterative build: grown");
    }

    for round in 0..REFINE_ROUNDS {
        knn = search_lists(&graph, dataset, n, intermediate_degree, &params);
        debug!(round, "iterative build: refined");
        if round + 1 < REFINE_ROUNDS {
            graph = optimize(&knn, graph_degree);
        }
    }

    Ok(knn)
}

/// Candidate lists for nodes `0..count` found by searching `graph`.
fn search_lists(
    graph: &FixedDegreeGraph,
    dataset: &BinaryCodes,
    count: usize,
    degree: usize,
    params: &SearchParams,
) -> Vec<Vec<Neighbor>> {
    (0..count)
        .into_par_iter()
        .map(|x| {
            search_graph(graph, dataset, dataset.row(x), degree + 1, params)
                .into_iter()
                .filter(|&(_, id)| id as usize != x)
                .take(degree)
                .map(|(distance, id)| Neighbor::new(id as u32, distance))
                .collect()
        })
        .collect()
}
