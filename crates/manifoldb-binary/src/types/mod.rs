//! Core types for binary vector search.
//!
//! - [`BinaryCodes`] - Row-major matrix of packed binary vectors
//! - [`Label`] - Result identifier (`-1` marks a missing result)
//! - [`Distance`] - Hamming distance

mod codes;

pub use codes::{validate_dimension, BinaryCodes};

/// Identifier attached to a search result.
pub type Label = i64;

/// Hamming distance between two codes.
pub type Distance = i32;

/// Label reported for result slots that could not be filled.
pub const NO_LABEL: Label = -1;

/// Distance reported for result slots that could not be filled.
pub const NO_DISTANCE: Distance = Distance::MAX;
