//! Fixed-degree proximity graph.
//!
//! This module contains the graph shared by the device-resident and
//! CPU-resident graph indexes: every node has exactly `degree` out-edges
//! stored in one flat array. It also holds the two algorithms that operate
//! on it:
//!
//! - [`optimize`] turns per-node k-NN candidate lists into the final graph
//!   using rank-based detour pruning plus reverse edges.
//! - [`search_graph`] runs a seeded beam search over the graph.
//!
//! Both are deterministic: the same inputs produce the same graph and the
//! same search results regardless of which device runs them.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::distance::HammingComputer;
use crate::error::{BinaryIndexError, Result};
use crate::types::{BinaryCodes, Distance, Label};

use super::config::SearchParams;

/// A neighbor candidate, ordered by `(distance, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Neighbor {
    /// Distance to the node whose list this is in.
    pub distance: Distance,
    /// The neighbor's node id.
    pub id: u32,
}

impl Neighbor {
    /// Create a new neighbor.
    #[inline]
    #[must_use]
    pub const fn new(id: u32, distance: Distance) -> Self {
        Self { distance, id }
    }
}

/// A graph where every node has exactly `degree` out-edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedDegreeGraph {
    /// Number of nodes.
    n: usize,
    /// Out-edges per node.
    degree: usize,
    /// `edges[i * degree..(i + 1) * degree]` = neighbors of node `i`.
    edges: Vec<u32>,
}

impl FixedDegreeGraph {
    /// Create a graph from a flat edge array.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge array has the wrong length or refers to
    /// nodes outside `0..n`.
    pub fn new(n: usize, degree: usize, edges: Vec<u32>) -> Result<Self> {
        let graph = Self { n, degree, edges };
        graph.validate()?;
        Ok(graph)
    }

    /// Number of nodes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Check if the graph has no nodes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Out-edges per node.
    #[inline]
    #[must_use]
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Neighbors of `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node >= len()`.
    #[inline]
    #[must_use]
    pub fn neighbors(&self, node: usize) -> &[u32] {
        &self.edges[node * self.degree..(node + 1) * self.degree]
    }

    /// The flat edge array.
    #[must_use]
    pub fn edges(&self) -> &[u32] {
        &self.edges
    }

    /// Bytes occupied by the edge array.
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.edges.len() * std::mem::size_of::<u32>()
    }

    /// Check structural consistency.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.edges.len() != self.n * self.degree {
            return Err(BinaryIndexError::Encoding(format!(
                "graph has {} edges, expected {} nodes x degree {}",
                self.edges.len(),
                self.n,
                self.degree
            )));
        }
        if let Some(&bad) = self.edges.iter().find(|&&id| id as usize >= self.n) {
            return Err(BinaryIndexError::Encoding(format!(
                "graph edge points to node {bad}, graph has {} nodes",
                self.n
            )));
        }
        Ok(())
    }
}

/// Build the final graph from sorted k-NN candidate lists.
///
/// For each node, the detour count of candidate `c[j]` is the number of
/// earlier candidates `c[i]` (`i < j`) that list `c[j]` at a position below
/// `j`: each such pair is a two-hop route at least as good as the direct
/// edge. Candidates are ranked by detour count (ties by rank) and the first
/// `degree / 2` become forward edges. Every forward edge `x -> y` proposes
/// the reverse edge `y -> x`; a node keeps at most `degree / 2` of them,
/// earliest forward rank first. Each output list is forward edges, then
/// reverse edges, then the remaining ranked candidates.
///
/// Finally every node left without an in-edge takes over one of the
/// non-forward slots of its first forward neighbor, so no node is
/// unreachable by construction.
///
/// Lists must be sorted by distance, free of duplicates and must not
/// contain the node itself.
#[must_use]
pub fn optimize(knn: &[Vec<Neighbor>], degree: usize) -> FixedDegreeGraph {
    let n = knn.len();
    let half = degree / 2;

    let ranked: Vec<Vec<u32>> = (0..n).into_par_iter().map(|x| rank_by_detours(knn, x)).collect();

    // Reverse edges, collected rank by rank so earlier ranks claim slots first.
    let mut reverse: Vec<Vec<u32>> = vec![Vec::new(); n];
    for rank in 0..half {
        for (x, list) in ranked.iter().enumerate() {
            if let Some(&y) = list.get(rank) {
                let slot = &mut reverse[y as usize];
                if slot.len() < half {
                    slot.push(x as u32);
                }
            }
        }
    }

    let mut edges: Vec<u32> = (0..n)
        .into_par_iter()
        .flat_map_iter(|x| {
            let mut out: Vec<u32> = Vec::with_capacity(degree);
            let ranked = &ranked[x];
            let candidates =
                ranked.iter().take(half).chain(reverse[x].iter()).chain(ranked.iter().skip(half));
            for &id in candidates {
                if out.len() == degree {
                    break;
                }
                if id as usize != x && !out.contains(&id) {
                    out.push(id);
                }
            }
            pad(&mut out, x, n, degree);
            out
        })
        .collect();

    connect_orphans(&mut edges, &ranked, n, degree, half);
    FixedDegreeGraph { n, degree, edges }
}

/// Candidates of node `x` ordered by `(detour count, rank)`.
fn rank_by_detours(knn: &[Vec<Neighbor>], x: usize) -> Vec<u32> {
    let list = &knn[x];
    let position: HashMap<u32, usize> = list.iter().enumerate().map(|(j, nb)| (nb.id, j)).collect();

    let mut detours = vec![0usize; list.len()];
    for (i, hop) in list.iter().enumerate() {
        for (p, second) in knn[hop.id as usize].iter().enumerate() {
            if let Some(&j) = position.get(&second.id) {
                if i.max(p) < j {
                    detours[j] += 1;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..list.len()).collect();
    order.sort_by_key(|&j| (detours[j], j));
    order.into_iter().map(|j| list[j].id).collect()
}

/// Give every node without an in-edge one edge from its first ranked
/// candidate.
///
/// The replaced slot is the last non-forward slot whose target keeps at
/// least one other in-edge. Nodes are processed in id order.
fn connect_orphans(edges: &mut [u32], ranked: &[Vec<u32>], n: usize, degree: usize, half: usize) {
    if n < 2 || degree == 0 {
        return;
    }

    let mut in_degree = vec![0usize; n];
    for (slot, &id) in edges.iter().enumerate() {
        if slot / degree != id as usize {
            in_degree[id as usize] += 1;
        }
    }

    for x in 0..n {
        if in_degree[x] > 0 {
            continue;
        }
        let Some(&y) = ranked[x].first() else {
            continue;
        };
        let row = &mut edges[y as usize * degree..(y as usize + 1) * degree];
        let victim = (half..degree).rev().find(|&j| in_degree[row[j] as usize] > 1);
        if let Some(j) = victim {
            in_degree[row[j] as usize] -= 1;
            row[j] = x as u32;
            in_degree[x] += 1;
        }
    }
}

/// Fill a short neighbor list so the graph stays fixed-degree.
fn pad(out: &mut Vec<u32>, x: usize, n: usize, degree: usize) {
    let filler = out.last().copied().unwrap_or(((x + 1) % n.max(1)) as u32);
    out.resize(degree, filler);
}

/// Seed for the search of one query: the configured seed mixed with an
/// FNV-1a hash of the query bytes.
fn query_seed(seed: u64, query: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in query {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash ^ seed
}

#[derive(Debug, Clone, Copy)]
struct BufferEntry {
    distance: Distance,
    id: u32,
    expanded: bool,
}

/// Beam search for the `k` nearest neighbors of `query`.
///
/// Random seed nodes fill an internal buffer of `itopk_size` candidates
/// (raised to `k` when smaller). Each iteration expands the `search_width`
/// closest unexpanded candidates, inserting their unvisited neighbors. The
/// search ends when every buffered candidate has been expanded or after
/// `max_iterations` iterations (0 = until convergence).
///
/// Returns up to `k` `(distance, node id)` pairs sorted by `(distance, id)`.
#[must_use]
pub fn search_graph(
    graph: &FixedDegreeGraph,
    dataset: &BinaryCodes,
    query: &[u8],
    k: usize,
    params: &SearchParams,
) -> Vec<(Distance, Label)> {
    let n = dataset.len().min(graph.len());
    if n == 0 || k == 0 {
        return Vec::new();
    }

    let itopk = params.itopk_size.max(k);
    let width = params.search_width.max(1);
    let computer = HammingComputer::new(query);
    let mut visited: HashSet<u32> = HashSet::with_capacity(itopk * 4);
    let mut buffer: Vec<BufferEntry> = Vec::with_capacity(itopk + width * graph.degree());

    let mut rng = StdRng::seed_from_u64(query_seed(params.seed, query));
    let samples = (params.num_random_samplings.max(1) * width * graph.degree().max(1)).min(n);
    for _ in 0..samples {
        let id = rng.gen_range(0..n) as u32;
        if visited.insert(id) {
            let distance = computer.distance(dataset.row(id as usize));
            buffer.push(BufferEntry { distance, id, expanded: false });
        }
    }
    sort_and_truncate(&mut buffer, itopk);

    let max_iterations = if params.max_iterations == 0 { usize::MAX } else { params.max_iterations };
    let mut iteration = 0;
    while iteration < max_iterations {
        iteration += 1;

        let parents: Vec<u32> = buffer
            .iter_mut()
            .filter(|e| !e.expanded)
            .take(width)
            .map(|e| {
                e.expanded = true;
                e.id
            })
            .collect();
        if parents.is_empty() {
            break;
        }

        for parent in parents {
            for &id in graph.neighbors(parent as usize) {
                if (id as usize) < n && visited.insert(id) {
                    let distance = computer.distance(dataset.row(id as usize));
                    buffer.push(BufferEntry { distance, id, expanded: false });
                }
            }
        }
        sort_and_truncate(&mut buffer, itopk);
    }

    buffer.iter().take(k).map(|e| (e.distance, Label::from(e.id))).collect()
}

fn sort_and_truncate(buffer: &mut Vec<BufferEntry>, itopk: usize) {
    buffer.sort_unstable_by_key(|e| (e.distance, e.id));
    buffer.truncate(itopk);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::BinaryFlatIndex;

    fn line_codes(n: usize) -> BinaryCodes {
        // Code i has the low i bits set, so d(i, j) = |i - j|.
        let rows: Vec<Vec<u8>> = (0..n)
            .map(|i| {
                let value: u64 = if i >= 64 { u64::MAX } else { (1u64 << i) - 1 };
                value.to_le_bytes().to_vec()
            })
            .collect();
        BinaryCodes::from_rows(&rows, 64).unwrap()
    }

    #[test]
    fn test_graph_validation() {
        assert!(FixedDegreeGraph::new(2, 1, vec![1, 0]).is_ok());
        assert!(FixedDegreeGraph::new(2, 1, vec![1]).is_err());
        assert!(FixedDegreeGraph::new(2, 1, vec![1, 2]).is_err());
    }

    #[test]
    fn test_neighbor_ordering() {
        let mut list = vec![Neighbor::new(5, 3), Neighbor::new(2, 3), Neighbor::new(9, 1)];
        list.sort();
        assert_eq!(list, vec![Neighbor::new(9, 1), Neighbor::new(2, 3), Neighbor::new(5, 3)]);
    }

    #[test]
    fn test_optimize_fixed_degree_without_self_loops() {
        let codes = line_codes(40);
        let knn = BinaryFlatIndex::from_codes(codes).knn_graph(8);
        let graph = optimize(&knn, 4);

        assert_eq!(graph.len(), 40);
        assert_eq!(graph.degree(), 4);
        for x in 0..40 {
            let neighbors = graph.neighbors(x);
            assert_eq!(neighbors.len(), 4);
            assert!(neighbors.iter().all(|&id| id as usize != x));
        }
    }

    #[test]
    fn test_optimize_prunes_detours() {
        // On a line, x+2 is reachable through x+1, so the direct edge to x+1
        // must survive pruning.
        let codes = line_codes(20);
        let knn = BinaryFlatIndex::from_codes(codes).knn_graph(6);
        let graph = optimize(&knn, 2);
        let first = graph.neighbors(10)[0];
        assert!(first == 9 || first == 11);
    }

    #[test]
    fn test_optimize_odd_degree_keeps_forward_half() {
        let codes = line_codes(30);
        let knn = BinaryFlatIndex::from_codes(codes).knn_graph(8);
        let graph = optimize(&knn, 5);
        for x in 0..30 {
            let ranked = rank_by_detours(&knn, x);
            assert_eq!(&graph.neighbors(x)[..2], &ranked[..2]);
        }
    }

    #[test]
    fn test_optimize_caps_reverse_edges_and_connects_orphans() {
        // Nodes 1..=5 all point at node 0, which only points at node 1.
        let mut knn = vec![vec![Neighbor::new(1, 1)]];
        knn.extend((1..=5).map(|_| vec![Neighbor::new(0, 1)]));
        let graph = optimize(&knn, 4);

        // Only 1 and 2 fit in the two reverse slots of node 0; orphans 3
        // and 4 then take over padded slots. Node 0 has no slot left for 5.
        assert_eq!(graph.neighbors(0), &[1, 2, 4, 3]);
        assert_eq!(graph.neighbors(5), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_optimize_tiny_graph_pads() {
        let knn = vec![vec![Neighbor::new(1, 1)], vec![Neighbor::new(0, 1)]];
        let graph = optimize(&knn, 3);
        assert_eq!(graph.neighbors(0), &[1, 1, 1]);
        assert_eq!(graph.neighbors(1), &[0, 0, 0]);
    }

    #[test]
    fn test_search_graph_finds_exact_neighbors() {
        let codes = line_codes(60);
        let knn = BinaryFlatIndex::from_codes(codes.clone()).knn_graph(8);
        let graph = optimize(&knn, 4);
        let params = SearchParams::default().with_itopk_size(16);

        let query = codes.row(30).to_vec();
        let results = search_graph(&graph, &codes, &query, 3, &params);
        assert_eq!(results, vec![(0, 30), (1, 29), (1, 31)]);
    }

    #[test]
    fn test_search_graph_with_full_buffer_is_exact() {
        use crate::index::BinaryIndex;

        let mut rng = StdRng::seed_from_u64(3);
        let bytes: Vec<u8> = (0..420 * 8).map(|_| rng.gen()).collect();
        let codes = BinaryCodes::new(bytes[..400 * 8].to_vec(), 64).unwrap();
        let queries = BinaryCodes::new(bytes[400 * 8..].to_vec(), 64).unwrap();

        let flat = BinaryFlatIndex::from_codes(codes.clone());
        let graph = optimize(&flat.knn_graph(16), 8);
        let params = SearchParams::default().with_itopk_size(512);

        let expected = flat.search(&queries, 10).unwrap();
        for q in 0..queries.len() {
            let found = search_graph(&graph, &codes, queries.row(q), 10, &params);
            assert_eq!(found, expected.row(q).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_search_graph_is_deterministic() {
        let codes = line_codes(50);
        let knn = BinaryFlatIndex::from_codes(codes.clone()).knn_graph(6);
        let graph = optimize(&knn, 4);
        let params = SearchParams::default();

        let query = codes.row(7).to_vec();
        let a = search_graph(&graph, &codes, &query, 5, &params);
        let b = search_graph(&graph, &codes, &query, 5, &params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_search_graph_empty() {
        let graph = FixedDegreeGraph::new(0, 4, Vec::new()).unwrap();
        let codes = BinaryCodes::empty(64).unwrap();
        assert!(search_graph(&graph, &codes, &[0u8; 8], 3, &SearchParams::default()).is_empty());
    }
}
