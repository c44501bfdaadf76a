//! Device-resident graph index.
//!
//! [`BinaryCagraIndex`] owns a copy of the dataset and its proximity graph
//! in device memory. Building and searching run on the worker pool of the
//! [`DeviceResources`] the index was created with.
//!
//! # Build
//!
//! 1. A k-NN graph of `intermediate_graph_degree` neighbors per node is built
//!    with NN-descent or iterative search.
//! 2. The k-NN graph is pruned and merged with reverse edges into a graph
//!    with exactly `graph_degree` edges per node.
//!
//! The graph is built once, by the first `train` or `add`. Later additions
//! are rejected.
//!
//! # Example
//!
//! ```
//! use manifoldb_binary::capability::{has_capability, Capability};
//! use manifoldb_binary::index::{BinaryCagraIndex, BinaryIndex, CagraConfig, SearchParams};
//! use manifoldb_binary::resources::DeviceResources;
//! use manifoldb_binary::types::BinaryCodes;
//!
//! if !has_capability(Capability::Cagra) {
//!     return;
//! }
//!
//! let res = DeviceResources::standard().unwrap();
//! let config = CagraConfig::new().with_graph_degree(4).with_intermediate_graph_degree(8);
//! let mut index = BinaryCagraIndex::new(&res, 8, config).unwrap();
//!
//! let codes = BinaryCodes::new((0..=255u8).collect(), 8).unwrap();
//! index.add(&codes).unwrap();
//! index.set_search_params(SearchParams::default().with_itopk_size(256));
//!
//! let results = index.search(&BinaryCodes::new(vec![42], 8).unwrap(), 1).unwrap();
//! assert_eq!(results.labels_row(0), &[42]);
//! ```

use std::mem::size_of;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::info;

use crate::capability::{self, Capability};
use crate::error::{BinaryIndexError, Result};
use crate::resources::{DeviceAllocation, DeviceResources};
use crate::results::SearchResults;
use crate::types::{validate_dimension, BinaryCodes, Distance, Label};

use super::config::{CagraConfig, GraphBuildAlgo, SearchParams};
use super::cpu_graph::CpuGraphIndex;
use super::graph::{optimize, search_graph, FixedDegreeGraph, Neighbor};
use super::traits::{check_codes, check_search_args, BinaryIndex};
use super::{iterative, nn_descent};

/// Dataset and graph held in device memory.
#[derive(Debug)]
struct DeviceState {
    codes: BinaryCodes,
    graph: FixedDegreeGraph,
    _allocation: DeviceAllocation,
}

/// Graph index whose data lives on a device.
#[derive(Debug)]
pub struct BinaryCagraIndex {
    resources: Arc<DeviceResources>,
    dimension: usize,
    config: CagraConfig,
    search_params: SearchParams,
    state: Option<DeviceState>,
}

impl BinaryCagraIndex {
    /// Create an empty index for `dimension`-bit vectors on `config.device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `cagra` backend is not compiled in, the
    /// dimension is not a positive multiple of 8, or the device is invalid.
    pub fn new(
        resources: &Arc<DeviceResources>,
        dimension: usize,
        config: CagraConfig,
    ) -> Result<Self> {
        capability::require(Capability::Cagra)?;
        validate_dimension(dimension)?;
        resources.check_device(config.device)?;

        Ok(Self {
            resources: Arc::clone(resources),
            dimension,
            config,
            search_params: SearchParams::default(),
            state: None,
        })
    }

    /// Copy a CPU graph index onto `device`.
    ///
    /// The codes, graph, build configuration and search parameters are
    /// copied unchanged, so both indexes return identical results. Only the
    /// device changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable, the CPU index has no
    /// graph, or the device cannot hold it.
    pub fn from_cpu(
        resources: &Arc<DeviceResources>,
        device: usize,
        cpu: &CpuGraphIndex,
    ) -> Result<Self> {
        let graph = cpu.graph().ok_or(BinaryIndexError::NotTrained)?;
        let config = cpu.config().clone().with_device(device);
        let mut index = Self::new(resources, cpu.dimension(), config)?;
        index.search_params = *cpu.search_params();

        let bytes = cpu.codes().size_in_bytes() + graph.size_in_bytes();
        let allocation = resources.allocate(device, bytes)?;
        index.state = Some(DeviceState {
            codes: cpu.codes().clone(),
            graph: graph.clone(),
            _allocation: allocation,
        });

        info!(device, n = cpu.ntotal(), degree = graph.degree(), "copied graph index to device");
        Ok(index)
    }

    /// Copy the index into host memory.
    ///
    /// # Errors
    ///
    /// Returns [`BinaryIndexError::NotTrained`] if the graph has not been built.
    pub fn to_cpu(&self) -> Result<CpuGraphIndex> {
        let state = self.state.as_ref().ok_or(BinaryIndexError::NotTrained)?;
        let cpu =
            CpuGraphIndex::from_parts(state.codes.clone(), state.graph.clone(), self.search_params)?
                .with_config(self.config.clone());
        info!(device = self.config.device, n = state.codes.len(), "copied graph index to host");
        Ok(cpu)
    }

    /// The build configuration.
    #[must_use]
    pub fn config(&self) -> &CagraConfig {
        &self.config
    }

    /// The device the index lives on.
    #[must_use]
    pub fn device(&self) -> usize {
        self.config.device
    }

    /// The graph, once built.
    #[must_use]
    pub fn graph(&self) -> Option<&FixedDegreeGraph> {
        self.state.as_ref().map(|s| &s.graph)
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
    /// Returns an error if the index is not trained, the resources were
    /// released, the query dimension doesn't match, or `k` is zero or
    /// exceeds the number of vectors.
    pub fn search_with_params(
        &self,
        queries: &BinaryCodes,
        k: usize,
        params: &SearchParams,
    ) -> Result<SearchResults> {
        check_search_args(self.dimension, queries, k)?;
        let state = self.state.as_ref().ok_or(BinaryIndexError::NotTrained)?;
        if k > state.codes.len() {
            return Err(BinaryIndexError::InvalidK { k, available: state.codes.len() });
        }
        self.resources.check_device(self.config.device)?;

        let rows: Vec<Vec<(Distance, Label)>> = self.resources.run(|| {
            (0..queries.len())
                .into_par_iter()
                .map(|q| search_graph(&state.graph, &state.codes, queries.row(q), k, params))
                .collect()
        });
        Ok(SearchResults::from_rows(rows, k))
    }

    fn build(&mut self, codes: &BinaryCodes) -> Result<()> {
        check_codes(self.dimension, codes)?;
        if self.state.is_some() {
            return Err(BinaryIndexError::AlreadyTrained);
        }
        let n = codes.len();
        if n < 2 {
            return Err(BinaryIndexError::TooFewVectors { required: 2, actual: n });
        }

        let device = self.config.device;
        let (intermediate, degree) = self.config.effective_degrees(n);
        let algo = self.config.resolved_build_algo();

        let allocation =
            self.resources.allocate(device, codes.size_in_bytes() + n * degree * size_of::<u32>())?;
        let workspace = self.resources.allocate(device, n * intermediate * size_of::<Neighbor>())?;

        info!(device, n, intermediate, degree, ?algo, "building graph index");
        let start = Instant::now();

        let config = &self.config;
        let graph = self.resources.run(|| -> Result<FixedDegreeGraph> {
            let knn = match algo {
                GraphBuildAlgo::NnDescent => nn_descent::build_knn_graph(
                    codes,
                    intermediate,
                    config.nn_descent_niter,
                    config.nn_descent_termination_threshold,
                    config.seed,
                ),
                GraphBuildAlgo::IterativeSearch => {
                    iterative::build_knn_graph(codes, intermediate, degree, config.seed)?
                }
            };
            Ok(optimize(&knn, degree))
        })?;
        drop(workspace);

        info!(device, n, elapsed_ms = start.elapsed().as_millis(), "graph index built");
        self.state = Some(DeviceState { codes: codes.clone(), graph, _allocation: allocation });
        Ok(())
    }
}

impl BinaryIndex for BinaryCagraIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn ntotal(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.codes.len())
    }

    fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    fn train(&mut self, codes: &BinaryCodes) -> Result<()> {
        self.build(codes)
    }

    fn train_stores_vectors(&self) -> bool {
        true
    }

    fn add(&mut self, codes: &BinaryCodes) -> Result<()> {
        self.build(codes)
    }

    fn search(&self, queries: &BinaryCodes, k: usize) -> Result<SearchResults> {
        self.search_with_params(queries, k, &self.search_params)
    }

    fn reset(&mut self) -> Result<()> {
        self.state = None;
        Ok(())
    }

    fn reconstruct(&self, label: Label) -> Result<Vec<u8>> {
        self.state
            .as_ref()
            .and_then(|s| usize::try_from(label).ok().and_then(|i| s.codes.get(i)))
            .map(<[u8]>::to_vec)
            .ok_or(BinaryIndexError::UnknownId(label))
    }
}
