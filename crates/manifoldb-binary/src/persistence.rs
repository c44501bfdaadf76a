//! Binary index serialization.
//!
//! Only host-resident indexes are serialized; device indexes are converted
//! with [`BinaryCagraIndex::to_cpu`](crate::index::BinaryCagraIndex::to_cpu)
//! first and copied back with
//! [`BinaryCagraIndex::from_cpu`](crate::index::BinaryCagraIndex::from_cpu).
//!
//! # Format
//!
//! ```text
//! [magic: b"MBIX"][version: u8][payload: bincode]
//! ```
//!
//! The payload is a [`CpuIndex`] encoded with bincode's standard
//! configuration. Decoded indexes are checked for structural consistency
//! before they are returned.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BinaryIndexError, Result};
use crate::index::{BinaryFlatIndex, BinaryIndex, CpuGraphIndex, IdMap};
use crate::results::SearchResults;
use crate::types::{BinaryCodes, Label};

/// Leading bytes of every serialized index.
pub const INDEX_MAGIC: [u8; 4] = *b"MBIX";

/// Current serialization format version.
pub const INDEX_FORMAT_VERSION: u8 = 1;

const HEADER_SIZE: usize = INDEX_MAGIC.len() + 1;

/// Any host-resident binary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CpuIndex {
    /// Exact brute-force index.
    Flat(BinaryFlatIndex),
    /// Graph index.
    Graph(CpuGraphIndex),
    /// Id-mapped wrapper around another host index.
    IdMap(Box<IdMap<CpuIndex>>),
}

impl CpuIndex {
    /// Check structural consistency and rebuild derived state.
    fn restore(&mut self) -> Result<()> {
        match self {
            Self::Flat(index) => index.codes().validate(),
            Self::Graph(index) => index.validate(),
            Self::IdMap(map) => {
                // Validate the wrapped index before the mapping that depends on it.
                map.inner_mut().restore()?;
                map.restore()
            }
        }
    }
}

impl From<BinaryFlatIndex> for CpuIndex {
    fn from(index: BinaryFlatIndex) -> Self {
        Self::Flat(index)
    }
}

impl From<CpuGraphIndex> for CpuIndex {
    fn from(index: CpuGraphIndex) -> Self {
        Self::Graph(index)
    }
}

impl<I: Into<CpuIndex>> From<IdMap<I>> for CpuIndex {
    fn from(map: IdMap<I>) -> Self {
        Self::IdMap(Box::new(map.map_inner(Into::into)))
    }
}

macro_rules! delegate {
    ($self:ident, $index:ident => $body:expr) => {
        match $self {
            CpuIndex::Flat($index) => $body,
            CpuIndex::Graph($index) => $body,
            CpuIndex::IdMap($index) => $body,
        }
    };
}

impl BinaryIndex for CpuIndex {
    fn dimension(&self) -> usize {
        delegate!(self, index => index.dimension())
    }

    fn ntotal(&self) -> usize {
        delegate!(self, index => index.ntotal())
    }

    fn is_trained(&self) -> bool {
        delegate!(self, index => index.is_trained())
    }

    fn train(&mut self, codes: &BinaryCodes) -> Result<()> {
        delegate!(self, index => index.train(codes))
    }

    fn train_stores_vectors(&self) -> bool {
        delegate!(self, index => index.train_stores_vectors())
    }

    fn add(&mut self, codes: &BinaryCodes) -> Result<()> {
        delegate!(self, index => index.add(codes))
    }

    fn add_with_ids(&mut self, codes: &BinaryCodes, ids: &[Label]) -> Result<()> {
        delegate!(self, index => index.add_with_ids(codes, ids))
    }

    fn search(&self, queries: &BinaryCodes, k: usize) -> Result<SearchResults> {
        delegate!(self, index => index.search(queries, k))
    }

    fn reset(&mut self) -> Result<()> {
        delegate!(self, index => index.reset())
    }

    fn reconstruct(&self, label: Label) -> Result<Vec<u8>> {
        delegate!(self, index => index.reconstruct(label))
    }
}

/// Serialize an index to bytes.
///
/// # Errors
///
/// Returns [`BinaryIndexError::Encoding`] if encoding fails.
pub fn serialize_index_binary(index: &CpuIndex) -> Result<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(index, bincode::config::standard())?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&INDEX_MAGIC);
    bytes.push(INDEX_FORMAT_VERSION);
    bytes.extend_from_slice(&payload);

    debug!(bytes = bytes.len(), ntotal = index.ntotal(), "serialized index");
    Ok(bytes)
}

/// Deserialize an index produced by [`serialize_index_binary`].
///
/// # Errors
///
/// Returns [`BinaryIndexError::Encoding`] if the header is wrong, the payload
/// is truncated or has trailing bytes, or the decoded index is inconsistent.
pub fn deserialize_index_binary(bytes: &[u8]) -> Result<CpuIndex> {
    if bytes.len() < HEADER_SIZE {
        return Err(BinaryIndexError::Encoding("truncated index header".to_owned()));
    }

    let (magic, rest) = bytes.split_at(INDEX_MAGIC.len());
    if magic != INDEX_MAGIC {
        return Err(BinaryIndexError::Encoding(format!("invalid magic number: {magic:?}")));
    }

    let version = rest[0];
    if version != INDEX_FORMAT_VERSION {
        return Err(BinaryIndexError::Encoding(format!(
            "unsupported index format version: {version}, expected {INDEX_FORMAT_VERSION}"
        )));
    }

    let payload = &rest[1..];
    let (mut index, read): (CpuIndex, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
    if read != payload.len() {
        return Err(BinaryIndexError::Encoding(format!(
            "{} trailing bytes after index payload",
            payload.len() - read
        )));
    }

    index.restore()?;
    debug!(bytes = bytes.len(), ntotal = index.ntotal(), "deserialized index");
    Ok(index)
}

/// Write an index to a file.
///
/// # Errors
///
/// Returns an error if encoding fails or the file cannot be written.
pub fn write_index_binary(index: &CpuIndex, path: impl AsRef<Path>) -> Result<()> {
    fs::write(path, serialize_index_binary(index)?)?;
    Ok(())
}

/// Read an index from a file written by [`write_index_binary`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not hold a valid index.
pub fn read_index_binary(path: impl AsRef<Path>) -> Result<CpuIndex> {
    deserialize_index_binary(&fs::read(path)?)
}
