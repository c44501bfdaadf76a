//! Graph index configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Algorithm used to build the k-NN graph before optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphBuildAlgo {
    /// Iterative local joins over neighbors-of-neighbors.
    NnDescent,
    /// Grow the graph by searching the partial graph built so far.
    IterativeSearch,
}

impl Default for GraphBuildAlgo {
    fn default() -> Self {
        Self::NnDescent
    }
}

/// Configuration parameters for a graph index build.
///
/// # Parameters
///
/// * `device` - Device the index lives on.
///
/// * `intermediate_graph_degree` - Size of each node's k-NN candidate list
///   before pruning. Higher values give a better graph but a slower build.
///
/// * `graph_degree` - Out-edges per node in the final graph.
///   Typical values: 32-64.
///
/// * `build_algo` - k-NN graph construction algorithm
///   (`None` = default, currently NN-descent).
///
/// * `nn_descent_niter` - Maximum NN-descent iterations.
///
/// * `nn_descent_termination_threshold` - NN-descent stops once an iteration
///   updates fewer than this fraction of all list entries.
///
/// * `seed` - Seed for every random choice made during the build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CagraConfig {
    /// Device ordinal.
    pub device: usize,
    /// Candidate list size before pruning.
    pub intermediate_graph_degree: usize,
    /// Final out-degree.
    pub graph_degree: usize,
    /// Graph construction algorithm.
    pub build_algo: Option<GraphBuildAlgo>,
    /// NN-descent iteration cap.
    pub nn_descent_niter: usize,
    /// NN-descent early termination threshold.
    pub nn_descent_termination_threshold: f64,
    /// Build seed.
    pub seed: u64,
}

impl CagraConfig {
    /// Create a configuration with default parameters:
    /// - `device` = 0
    /// - `intermediate_graph_degree` = 128
    /// - `graph_degree` = 64
    /// - `build_algo` = default
    /// - `nn_descent_niter` = 20
    /// - `nn_descent_termination_threshold` = 0.0001
    #[must_use]
    pub fn new() -> Self {
        Self {
            device: 0,
            intermediate_graph_degree: 128,
            graph_degree: 64,
            build_algo: None,
            nn_descent_niter: 20,
            nn_descent_termination_threshold: 0.0001,
            seed: 0x5eed_cafe,
        }
    }

    /// Set the device ordinal.
    #[must_use]
    pub const fn with_device(mut self, device: usize) -> Self {
        self.device = device;
        self
    }

    /// Set the final out-degree.
    #[must_use]
    pub const fn with_graph_degree(mut self, degree: usize) -> Self {
        self.graph_degree = degree;
        self
    }

    /// Set the candidate list size before pruning.
    #[must_use]
    pub const fn with_intermediate_graph_degree(mut self, degree: usize) -> Self {
        self.intermediate_graph_degree = degree;
        self
    }

    /// Set the build algorithm.
    #[must_use]
    pub const fn with_build_algo(mut self, algo: GraphBuildAlgo) -> Self {
        self.build_algo = Some(algo);
        self
    }

    /// Set the NN-descent iteration cap.
    #[must_use]
    pub const fn with_nn_descent_niter(mut self, niter: usize) -> Self {
        self.nn_descent_niter = niter;
        self
    }

    /// Set the NN-descent termination threshold.
    #[must_use]
    pub const fn with_nn_descent_termination_threshold(mut self, threshold: f64) -> Self {
        self.nn_descent_termination_threshold = threshold;
        self
    }

    /// Set the build seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The build algorithm, with `None` resolved to the default.
    #[must_use]
    pub fn resolved_build_algo(&self) -> GraphBuildAlgo {
        self.build_algo.unwrap_or_default()
    }

    /// Degrees usable for a dataset of `n` vectors.
    ///
    /// Returns `(intermediate_graph_degree, graph_degree)` clamped so that
    /// `1 <= graph_degree <= intermediate_graph_degree <= n - 1`.
    #[must_use]
    pub fn effective_degrees(&self, n: usize) -> (usize, usize) {
        let mut intermediate = self.intermediate_graph_degree.max(1);
        let mut degree = self.graph_degree.max(1);

        if degree > intermediate {
            warn!(
                graph_degree = degree,
                intermediate_graph_degree = intermediate,
                "graph_degree exceeds intermediate_graph_degree, clamping"
            );
            degree = intermediate;
        }

        let limit = n.saturating_sub(1).max(1);
        if intermediate > limit {
            warn!(n, intermediate_graph_degree = intermediate, "dataset too small, clamping degrees");
            intermediate = limit;
            degree = degree.min(limit);
        }

        (intermediate, degree)
    }
}

impl Default for CagraConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-search parameters for graph indexes.
///
/// # Parameters
///
/// * `itopk_size` - Size of the internal candidate buffer. Raised to `k`
///   when smaller. Higher values give better recall but slower search.
///
/// * `search_width` - Candidates expanded per iteration.
///
/// * `max_iterations` - Iteration cap (0 = run until every buffered
///   candidate has been expanded).
///
/// * `num_random_samplings` - Rounds of random seed sampling; each round
///   draws `search_width * graph_degree` seed nodes.
///
/// * `seed` - Base seed for seed sampling, mixed with each query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Internal candidate buffer size.
    pub itopk_size: usize,
    /// Parents expanded per iteration.
    pub search_width: usize,
    /// Iteration cap, 0 = until convergence.
    pub max_iterations: usize,
    /// Random seed sampling rounds.
    pub num_random_samplings: usize,
    /// Seed sampling base seed.
    pub seed: u64,
}

impl SearchParams {
    /// Set the internal candidate buffer size.
    #[must_use]
    pub const fn with_itopk_size(mut self, itopk: usize) -> Self {
        self.itopk_size = itopk;
        self
    }

    /// Set the number of parents expanded per iteration.
    #[must_use]
    pub const fn with_search_width(mut self, width: usize) -> Self {
        self.search_width = width;
        self
    }

    /// Set the iteration cap.
    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Set the number of random seed sampling rounds.
    #[must_use]
    pub const fn with_num_random_samplings(mut self, rounds: usize) -> Self {
        self.num_random_samplings = rounds;
        self
    }

    /// Set the seed sampling base seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            itopk_size: 64,
            search_width: 1,
            max_iterations: 0,
            num_random_samplings: 1,
            seed: 0x12_8394,
        }
    }
}
