//! Error types for the binary index crate.

use thiserror::Error;

use crate::capability::Capability;
use crate::types::Label;

/// Errors that can occur in binary index operations.
#[derive(Debug, Error)]
pub enum BinaryIndexError {
    /// Dimension is zero or not a multiple of 8.
    #[error("invalid dimension {dimension}: must be a positive multiple of 8")]
    InvalidDimension {
        /// The rejected dimension, in bits.
        dimension: usize,
    },

    /// Dimension mismatch between codes and an index.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The expected dimension.
        expected: usize,
        /// The actual dimension.
        actual: usize,
    },

    /// Packed code buffer does not hold a whole number of codes.
    #[error("invalid codes: {0}")]
    InvalidCodes(String),

    /// The requested number of neighbors cannot be served.
    #[error("invalid k: requested {k}, {available} vectors available")]
    InvalidK {
        /// The requested result count.
        k: usize,
        /// The number of vectors in the index.
        available: usize,
    },

    /// Search or conversion on an index that has not been built.
    #[error("index is not trained")]
    NotTrained,

    /// Train called twice, or add on an immutable built graph.
    #[error("index is already trained")]
    AlreadyTrained,

    /// Not enough vectors to build a graph.
    #[error("too few vectors: need at least {required}, got {actual}")]
    TooFewVectors {
        /// The minimum number of vectors.
        required: usize,
        /// The number provided.
        actual: usize,
    },

    /// Identifier list does not line up with the codes.
    #[error("invalid ids: {0}")]
    InvalidIds(String),

    /// External identifier already present in the map.
    #[error("duplicate id: {0}")]
    DuplicateId(Label),

    /// External identifier not present in the index.
    #[error("unknown id: {0}")]
    UnknownId(Label),

    /// Operation not supported by this index type.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Optional backend was not compiled in.
    #[error("backend unavailable: {0:?} was not compiled into this build")]
    BackendUnavailable(Capability),

    /// Device ordinal out of range.
    #[error("invalid device {device}: {count} device(s) available")]
    InvalidDevice {
        /// The requested device.
        device: usize,
        /// The number of configured devices.
        count: usize,
    },

    /// Device memory budget exceeded.
    #[error("device {device} out of memory: requested {requested} bytes, {available} available")]
    DeviceMemoryExhausted {
        /// The device.
        device: usize,
        /// Bytes requested.
        requested: usize,
        /// Bytes still free.
        available: usize,
    },

    /// The resource handle was released.
    #[error("device resources have been released")]
    ResourcesReleased,

    /// Encoding/decoding error.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Filesystem error while reading or writing an index.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BinaryIndexError>;

impl From<bincode::error::EncodeError> for BinaryIndexError {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BinaryIndexError {
    fn from(err: bincode::error::DecodeError) -> Self {
        Self::Encoding(err.to_string())
    }
}
