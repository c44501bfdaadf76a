//! `ManifoldDB` Binary
//!
//! This crate provides approximate nearest neighbor search over packed binary
//! vectors under Hamming distance, using a device-resident proximity graph
//! index.
//!
//! # Overview
//!
//! - **Resources**: A shared handle to the devices, their memory budgets and
//!   the worker pool kernels run on
//! - **Graph index**: Built with NN-descent or iterative search, pruned to a
//!   fixed out-degree, searched with a seeded beam search
//! - **Conversion**: Lossless copies between device and host indexes
//! - **Persistence**: Versioned binary serialization of host indexes
//! - **Identifier mapping**: Caller-chosen labels over any index
//! - **Evaluation**: Tie-tolerant comparison against brute-force results
//!
//! # Example
//!
//! ```
//! use manifoldb_binary::capability::{has_capability, Capability};
//! use manifoldb_binary::index::{BinaryCagraIndex, BinaryIndex, CagraConfig};
//! use manifoldb_binary::persistence::{deserialize_index_binary, serialize_index_binary};
//! use manifoldb_binary::resources::DeviceResources;
//! use manifoldb_binary::types::BinaryCodes;
//!
//! if !has_capability(Capability::Cagra) {
//!     return;
//! }
//!
//! let res = DeviceResources::standard().unwrap();
//! let config = CagraConfig::new().with_intermediate_graph_degree(16).with_graph_degree(8);
//! let mut index = BinaryCagraIndex::new(&res, 64, config).unwrap();
//!
//! let codes: Vec<[u8; 8]> =
//!     (0..500u64).map(|i| i.wrapping_mul(0x9E37_79B9_7F4A_7C15).to_le_bytes()).collect();
//! index.add(&BinaryCodes::from_rows(&codes, 64).unwrap()).unwrap();
//!
//! // Copy to the host, serialize, and bring it back.
//! let bytes = serialize_index_binary(&index.to_cpu().unwrap().into()).unwrap();
//! let restored = deserialize_index_binary(&bytes).unwrap();
//! assert_eq!(restored.ntotal(), 500);
//! ```
//!
//! # Modules
//!
//! - [`capability`] - Compile-time backend availability
//! - [`resources`] - Device handle ([`DeviceResources`])
//! - [`types`] - Core types ([`BinaryCodes`], [`Label`], [`Distance`])
//! - [`distance`] - Hamming distance
//! - [`index`] - Binary indexes ([`BinaryCagraIndex`], [`CpuGraphIndex`], [`IdMap`])
//! - [`persistence`] - Index serialization
//! - [`results`] - Search result containers
//! - [`evaluation`] - Result comparison with tie tolerance
//! - [`error`] - Error types

#![deny(clippy::unwrap_used)]

pub mod capability;
pub mod distance;
pub mod error;
pub mod evaluation;
pub mod index;
pub mod persistence;
pub mod resources;
pub mod results;
pub mod types;

// Re-export commonly used types
pub use capability::{compile_options, has_capability, Capability};
pub use error::{BinaryIndexError, Result};
pub use evaluation::{check_knn_with_draws, knn_recall, KnnMismatch};
pub use index::{
    BinaryCagraIndex, BinaryFlatIndex, BinaryIndex, CagraConfig, CpuGraphIndex, GraphBuildAlgo,
    IdMap, SearchParams,
};
pub use persistence::{
    deserialize_index_binary, read_index_binary, serialize_index_binary, write_index_binary,
    CpuIndex,
};
pub use resources::{DeviceResources, ResourcesConfig};
pub use results::SearchResults;
pub use types::{BinaryCodes, Distance, Label};
