//! Binary vector indexes.
//!
//! # Overview
//!
//! - [`BinaryFlatIndex`]: exact brute-force search, the ground truth.
//! - [`BinaryCagraIndex`]: graph index built and searched on a device.
//! - [`CpuGraphIndex`]: host copy of a graph index, searched with the same
//!   algorithm so results match the device exactly.
//! - [`IdMap`]: wraps any index to attach caller-chosen identifiers.
//!
//! All of them implement [`BinaryIndex`].
//!
//! # Graph construction
//!
//! A graph index is built in two steps. First a k-NN graph with
//! `intermediate_graph_degree` neighbors per node is built with
//! [`nn_descent`] or [`iterative`] search. Then [`optimize`] prunes each
//! list with rank-based detour counting and merges in reverse edges,
//! leaving exactly `graph_degree` edges per node.
//!
//! # Configuration Parameters
//!
//! - **`graph_degree`**: Out-edges per node (typically 32-64)
//! - **`intermediate_graph_degree`**: Candidates per node before pruning
//! - **`itopk_size`**: Search buffer size (higher = better recall, slower search)

mod cagra;
mod config;
mod cpu_graph;
mod flat;
mod graph;
mod id_map;
pub mod iterative;
pub mod nn_descent;
mod traits;

pub use cagra::BinaryCagraIndex;
pub use config::{CagraConfig, GraphBuildAlgo, SearchParams};
pub use cpu_graph::CpuGraphIndex;
pub use flat::BinaryFlatIndex;
pub use graph::{optimize, search_graph, FixedDegreeGraph, Neighbor};
pub use id_map::IdMap;
pub use traits::BinaryIndex;
