//! Traits for binary indexes.

use crate::error::{BinaryIndexError, Result};
use crate::results::SearchResults;
use crate::types::{BinaryCodes, Label};

/// Trait for binary vector indexes.
///
/// Vectors added with [`add`](Self::add) are implicitly labelled
/// `ntotal..ntotal + n`. Indexes that accept caller-chosen labels override
/// [`add_with_ids`](Self::add_with_ids).
pub trait BinaryIndex {
    /// Number of bits per vector.
    fn dimension(&self) -> usize;

    /// Number of bytes per vector.
    fn code_size(&self) -> usize {
        self.dimension() / 8
    }

    /// Number of indexed vectors.
    fn ntotal(&self) -> usize;

    /// Check if the index is empty.
    fn is_empty(&self) -> bool {
        self.ntotal() == 0
    }

    /// Whether the index is ready to be searched.
    fn is_trained(&self) -> bool;

    /// Train the index on a representative set of vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the codes have the wrong dimension or the index
    /// cannot be (re)trained.
    fn train(&mut self, codes: &BinaryCodes) -> Result<()>;

    /// Whether [`train`](Self::train) also stores the training vectors, as
    /// graph indexes built from their training set do.
    fn train_stores_vectors(&self) -> bool {
        false
    }

    /// Add vectors with sequential labels.
    ///
    /// # Errors
    ///
    /// Returns an error if the codes have the wrong dimension or the index
    /// does not accept new vectors.
    fn add(&mut self, codes: &BinaryCodes) -> Result<()>;

    /// Add vectors with caller-supplied labels.
    ///
    /// # Errors
    ///
    /// The default implementation returns [`BinaryIndexError::Unsupported`].
    fn add_with_ids(&mut self, _codes: &BinaryCodes, _ids: &[Label]) -> Result<()> {
        Err(BinaryIndexError::Unsupported("add_with_ids"))
    }

    /// Search for the `k` nearest neighbors of every query.
    ///
    /// # Returns
    ///
    /// An `(nq, k)` result set, each row sorted by distance (closest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the query dimension doesn't match, `k` is zero or
    /// too large, or the index is not trained.
    fn search(&self, queries: &BinaryCodes, k: usize) -> Result<SearchResults>;

    /// Remove all vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be reset.
    fn reset(&mut self) -> Result<()>;

    /// Return the stored code for `label`.
    ///
    /// # Errors
    ///
    /// Returns [`BinaryIndexError::UnknownId`] if no vector has that label.
    fn reconstruct(&self, label: Label) -> Result<Vec<u8>>;
}

/// Validate common search arguments.
pub(crate) fn check_search_args(dimension: usize, queries: &BinaryCodes, k: usize) -> Result<()> {
    check_codes(dimension, queries)?;
    if k == 0 {
        return Err(BinaryIndexError::InvalidK { k, available: 0 });
    }
    Ok(())
}

/// Validate the dimension of codes being added or trained on.
pub(crate) fn check_codes(dimension: usize, codes: &BinaryCodes) -> Result<()> {
    if codes.dimension() != dimension {
        return Err(BinaryIndexError::DimensionMismatch {
            expected: dimension,
            actual: codes.dimension(),
        });
    }
    Ok(())
}

impl<I: BinaryIndex + ?Sized> BinaryIndex for Box<I> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn ntotal(&self) -> usize {
        (**self).ntotal()
    }

    fn is_trained(&self) -> bool {
        (**self).is_trained()
    }

    fn train(&mut self, codes: &BinaryCodes) -> Result<()> {
        (**self).train(codes)
    }

    fn train_stores_vectors(&self) -> bool {
        (**self).train_stores_vectors()
    }

    fn add(&mut self, codes: &BinaryCodes) -> Result<()> {
        (**self).add(codes)
    }

    fn add_with_ids(&mut self, codes: &BinaryCodes, ids: &[Label]) -> Result<()> {
        (**self).add_with_ids(codes, ids)
    }

    fn search(&self, queries: &BinaryCodes, k: usize) -> Result<SearchResults> {
        (**self).search(queries, k)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn reconstruct(&self, label: Label) -> Result<Vec<u8>> {
        (**self).reconstruct(label)
    }
}
