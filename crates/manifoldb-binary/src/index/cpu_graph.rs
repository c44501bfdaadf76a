//! CPU-resident graph index.
//!
//! Holds the same codes and graph as a device index after
//! [`BinaryCagraIndex::to_cpu`](super::BinaryCagraIndex::to_cpu) and
//! searches them with the same algorithm, so both agree exactly. The build
//! configuration travels with it, so a device copy made from it reports the
//! configuration the graph was built with. Only the base level is kept: the
//! graph cannot grow once built.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{BinaryIndexError, Result};
use crate::results::SearchResults;
use crate::types::{validate_dimension, BinaryCodes, Distance, Label};

use super::config::{CagraConfig, SearchParams};
use super::graph::{search_graph, FixedDegreeGraph};
use super::traits::{check_search_args, BinaryIndex};

/// Graph index searched on the CPU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuGraphIndex {
    codes: BinaryCodes,
    graph: Option<FixedDegreeGraph>,
    config: CagraConfig,
    search_params: SearchParams,
}

impl CpuGraphIndex {
    /// Create an empty, untrained index for `dimension`-bit vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if `dimension` is not a positive multiple of 8.
    pub fn new(dimension: usize) -> Result<Self> {
        validate_dimension(dimension)?;
        Ok(Self {
            codes: BinaryCodes::empty(dimension)?,
            graph: None,
            config: CagraConfig::default(),
            search_params: SearchParams::default(),
        })
    }

    /// Assemble an index from a built graph.
    ///
    /// The build configuration defaults to [`CagraConfig::default`] with the
    /// graph's degree; use [`with_config`](Self::with_config) to record the
    /// one actually used.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph does not cover exactly the given codes.
    pub fn from_parts(
        codes: BinaryCodes,
        graph: FixedDegreeGraph,
        search_params: SearchParams,
    ) -> Result<Self> {
        let config = CagraConfig::new().with_graph_degree(graph.degree());
        let index = Self { codes, graph: Some(graph), config, search_params };
        index.validate()?;
        Ok(index)
    }

    /// Record the configuration the graph was built with.
    #[must_use]
    pub fn with_config(mut self, config: CagraConfig) -> Self {
        self.config = config;
        self
    }

    /// The build configuration.
    #[must_use]
    pub fn config(&self) -> &CagraConfig {
        &self.config
    }

    /// The stored codes.
    #[must_use]
    pub fn codes(&self) -> &BinaryCodes {
        &self.codes
    }

    /// The graph, once built.
    #[must_use]
    pub fn graph(&self) -> Option<&FixedDegreeGraph> {
        self.graph.as_ref()
    }

    /// Parameters used by [`search`](BinaryIndex::search).
    #[must_use]
    pub fn search_params(&self) -> &SearchParams {
        &self.search_params
    }

    /// Replace the default search parameters.
    pub fn set_search_params(&mut self, params: SearchParams) {
        self.search_params = params;
    }

    /// Search with explicit parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is not trained, the query dimension
    /// doesn't match, or `k` is zero or exceeds the number of vectors.
    pub fn search_with_params(
        &self,
        queries: &BinaryCodes,
        k: usize,
        params: &SearchParams,
    ) -> Result<SearchResults> {
        check_search_args(self.dimension(), queries, k)?;
        let graph = self.graph.as_ref().ok_or(BinaryIndexError::NotTrained)?;
        if k > self.codes.len() {
            return Err(BinaryIndexError::InvalidK { k, available: self.codes.len() });
        }

        let rows: Vec<Vec<(Distance, Label)>> = (0..queries.len())
            .into_par_iter()
            .map(|q| search_graph(graph, &self.codes, queries.row(q), k, params))
            .collect();
        Ok(SearchResults::from_rows(rows, k))
    }

    /// Check structural consistency, e.g. after deserialization.
    pub(crate) fn validate(&self) -> Result<()> {
        self.codes.validate()?;
        if let Some(graph) = &self.graph {
            graph.validate()?;
            if graph.len() != self.codes.len() {
                return Err(BinaryIndexError::Encoding(format!(
                    "graph covers {} nodes but index holds {} codes",
                    graph.len(),
                    self.codes.len()
                )));
            }
        } else if !self.codes.is_empty() {
            return Err(BinaryIndexError::Encoding("codes stored without a graph".to_owned()));
        }
        Ok(())
    }
}

impl BinaryIndex for CpuGraphIndex {
    fn dimension(&self) -> usize {
        self.codes.dimension()
    }

    fn ntotal(&self) -> usize {
        self.codes.len()
    }

    fn is_trained(&self) -> bool {
        self.graph.is_some()
    }

    fn train(&mut self, _codes: &BinaryCodes) -> Result<()> {
        Err(BinaryIndexError::Unsupported("graph build on the CPU; build on a device and convert"))
    }

    fn add(&mut self, _codes: &BinaryCodes) -> Result<()> {
        Err(BinaryIndexError::Unsupported("adding to a base-level graph"))
    }

    fn search(&self, queries: &BinaryCodes, k: usize) -> Result<SearchResults> {
        self.search_with_params(queries, k, &self.search_params)
    }

    fn reset(&mut self) -> Result<()> {
        self.codes.clear();
        self.graph = None;
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
    use crate::index::graph::optimize;
    use crate::index::BinaryFlatIndex;

    /// Code `i` has its lowest `i` bits set.
    fn line_codes(n: usize) -> BinaryCodes {
        let rows: Vec<[u8; 8]> =
            (0..n).map(|i| if i >= 64 { u64::MAX } else { (1u64 << i) - 1 }.to_le_bytes()).collect();
        BinaryCodes::from_rows(&rows, 64).unwrap()
    }

    fn create_test_index(n: usize) -> CpuGraphIndex {
        let codes = line_codes(n);
        let knn = BinaryFlatIndex::from_codes(codes.clone()).knn_graph(8);
        let graph = optimize(&knn, 4);
        CpuGraphIndex::from_parts(codes, graph, SearchParams::default()).unwrap()
    }

    #[test]
    fn test_new_is_untrained() {
        let index = CpuGraphIndex::new(64).unwrap();
        assert!(!index.is_trained());
        assert!(index.is_empty());
        let query = line_codes(1);
        assert!(matches!(index.search(&query, 1), Err(BinaryIndexError::NotTrained)));
    }

    #[test]
    fn test_search_finds_exact_match() {
        let index = create_test_index(40);
        let queries = line_codes(40);
        let results = index.search(&queries, 1).unwrap();
        for q in 0..40 {
            assert_eq!(results.labels_row(q), &[q as Label]);
            assert_eq!(results.distances_row(q), &[0]);
        }
    }

    #[test]
    fn test_k_larger_than_ntotal() {
        let index = create_test_index(10);
        assert!(matches!(
            index.search(&line_codes(1), 11),
            Err(BinaryIndexError::InvalidK { k: 11, available: 10 })
        ));
    }

    #[test]
    fn test_add_and_train_unsupported() {
        let mut index = create_test_index(10);
        assert!(matches!(index.add(&line_codes(2)), Err(BinaryIndexError::Unsupported(_))));
        assert!(matches!(index.train(&line_codes(2)), Err(BinaryIndexError::Unsupported(_))));
    }

    #[test]
    fn test_from_parts_rejects_mismatched_graph() {
        let codes = line_codes(10);
        let knn = BinaryFlatIndex::from_codes(line_codes(12)).knn_graph(4);
        let graph = optimize(&knn, 2);
        assert!(CpuGraphIndex::from_parts(codes, graph, SearchParams::default()).is_err());
    }

    #[test]
    fn test_config_defaults_to_graph_degree() {
        let index = create_test_index(10);
        assert_eq!(index.config().graph_degree, 4);

        let config = CagraConfig::new().with_graph_degree(4).with_seed(7);
        let index = index.with_config(config.clone());
        assert_eq!(index.config(), &config);
    }

    #[test]
    fn test_reset() {
        let mut index = create_test_index(10);
        assert_eq!(index.reconstruct(3).unwrap(), line_codes(4).row(3).to_vec());
        index.reset().unwrap();
        assert!(!index.is_trained());
        assert_eq!(index.ntotal(), 0);
        assert!(matches!(index.reconstruct(3), Err(BinaryIndexError::UnknownId(3))));
    }
}
