//! Packed binary code matrices.
//!
//! A binary vector of `dimension` bits is stored as `dimension / 8` bytes
//! (the code size). Bit `i` lives in byte `i / 8`, at position `i % 8`
//! counting from the least significant bit. A [`BinaryCodes`] holds `n`
//! such codes back to back in row-major order.
//!
//! # Example
//!
//! ```
//! use manifoldb_binary::types::BinaryCodes;
//!
//! // Two 16-bit codes
//! let codes = BinaryCodes::new(vec![0xFF, 0x00, 0x0F, 0xF0], 16).unwrap();
//!
//! assert_eq!(codes.len(), 2);
//! assert_eq!(codes.code_size(), 2);
//! assert_eq!(codes.row(1), &[0x0F, 0xF0]);
//! ```

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{BinaryIndexError, Result};

/// Check that `dimension` is a positive multiple of 8 and return the code size.
///
/// # Errors
///
/// Returns [`BinaryIndexError::InvalidDimension`] otherwise.
pub fn validate_dimension(dimension: usize) -> Result<usize> {
    if dimension == 0 || dimension % 8 != 0 {
        return Err(BinaryIndexError::InvalidDimension { dimension });
    }
    Ok(dimension / 8)
}

/// A row-major matrix of packed binary codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryCodes {
    /// Packed bytes, `len * code_size` of them.
    data: Vec<u8>,
    /// Number of bits per code.
    dimension: usize,
}

impl BinaryCodes {
    /// Create a code matrix from packed bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `dimension` is zero or not a multiple of 8
    /// - `data.len()` is not a multiple of the code size
    pub fn new(data: Vec<u8>, dimension: usize) -> Result<Self> {
        let code_size = validate_dimension(dimension)?;
        if data.len() % code_size != 0 {
            return Err(BinaryIndexError::InvalidCodes(format!(
                "{} bytes is not a multiple of the code size {}",
                data.len(),
                code_size
            )));
        }
        Ok(Self { data, dimension })
    }

    /// Create an empty code matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if `dimension` is invalid.
    pub fn empty(dimension: usize) -> Result<Self> {
        Self::with_capacity(dimension, 0)
    }

    /// Create an empty code matrix with room for `n` codes.
    ///
    /// # Errors
    ///
    /// Returns an error if `dimension` is invalid.
    pub fn with_capacity(dimension: usize, n: usize) -> Result<Self> {
        let code_size = validate_dimension(dimension)?;
        Ok(Self { data: Vec::with_capacity(n * code_size), dimension })
    }

    /// Create a code matrix from individual rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimension is invalid or any row has the wrong length.
    pub fn from_rows<R: AsRef<[u8]>>(rows: &[R], dimension: usize) -> Result<Self> {
        let mut codes = Self::with_capacity(dimension, rows.len())?;
        for row in rows {
            codes.push(row.as_ref())?;
        }
        Ok(codes)
    }

    /// Number of bits per code.
    #[inline]
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of bytes per code.
    #[inline]
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.dimension / 8
    }

    /// Number of codes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.code_size()
    }

    /// Check if there are no codes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get code `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`.
    #[inline]
    #[must_use]
    pub fn row(&self, i: usize) -> &[u8] {
        let cs = self.code_size();
        &self.data[i * cs..(i + 1) * cs]
    }

    /// Get code `i`, or `None` if out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, i: usize) -> Option<&[u8]> {
        (i < self.len()).then(|| self.row(i))
    }

    /// Iterate over all codes.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[u8]> + '_ {
        self.data.chunks_exact(self.code_size())
    }

    /// The raw packed bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume into the raw packed bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Copy a contiguous range of codes into a new matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.len() {
            return Err(BinaryIndexError::InvalidCodes(format!(
                "range {}..{} out of bounds for {} codes",
                range.start,
                range.end,
                self.len()
            )));
        }
        let cs = self.code_size();
        let data = self.data[range.start * cs..range.end * cs].to_vec();
        Ok(Self { data, dimension: self.dimension })
    }

    /// Append one code.
    ///
    /// # Errors
    ///
    /// Returns an error if `code` is not exactly `code_size` bytes.
    pub fn push(&mut self, code: &[u8]) -> Result<()> {
        if code.len() != self.code_size() {
            return Err(BinaryIndexError::DimensionMismatch {
                expected: self.dimension,
                actual: code.len() * 8,
            });
        }
        self.data.extend_from_slice(code);
        Ok(())
    }

    /// Append every code of `other`.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensions differ.
    pub fn extend(&mut self, other: &Self) -> Result<()> {
        self.check_dimension(other.dimension)?;
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    /// Keep only the codes for which `keep(index)` is true.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(usize) -> bool) {
        let cs = self.code_size();
        let mut data = Vec::with_capacity(self.data.len());
        for (i, row) in self.data.chunks_exact(cs).enumerate() {
            if keep(i) {
                data.extend_from_slice(row);
            }
        }
        self.data = data;
    }

    /// Remove all codes.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Bytes occupied by the packed data.
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.data.len()
    }

    /// Fail with [`BinaryIndexError::DimensionMismatch`] unless `dimension` matches.
    pub(crate) fn check_dimension(&self, dimension: usize) -> Result<()> {
        if self.dimension != dimension {
            return Err(BinaryIndexError::DimensionMismatch {
                expected: self.dimension,
                actual: dimension,
            });
        }
        Ok(())
    }

    /// Check that every row is structurally consistent after deserialization.
    pub(crate) fn validate(&self) -> Result<()> {
        let code_size = validate_dimension(self.dimension)?;
        if self.data.len() % code_size != 0 {
            return Err(BinaryIndexError::Encoding(format!(
                "code buffer of {} bytes is not a multiple of {code_size}",
                self.data.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_dimension() {
        assert_eq!(validate_dimension(512).unwrap(), 64);
        assert!(validate_dimension(0).is_err());
        assert!(validate_dimension(12).is_err());
    }

    #[test]
    fn test_new_valid() {
        let codes = BinaryCodes::new(vec![1, 2, 3, 4, 5, 6], 16).unwrap();
        assert_eq!(codes.len(), 3);
        assert_eq!(codes.row(2), &[5, 6]);
        assert_eq!(codes.get(3), None);
    }

    #[test]
    fn test_new_partial_row_fails() {
        let result = BinaryCodes::new(vec![1, 2, 3], 16);
        assert!(matches!(result, Err(BinaryIndexError::InvalidCodes(_))));
    }

    #[test]
    fn test_new_bad_dimension_fails() {
        let result = BinaryCodes::new(vec![1, 2, 3], 20);
        assert!(matches!(result, Err(BinaryIndexError::InvalidDimension { dimension: 20 })));
    }

    #[test]
    fn test_from_rows() {
        let codes = BinaryCodes::from_rows(&[vec![0xAA], vec![0x55]], 8).unwrap();
        assert_eq!(codes.len(), 2);
        assert_eq!(codes.as_bytes(), &[0xAA, 0x55]);

        let result = BinaryCodes::from_rows(&[vec![0xAA, 0x00]], 8);
        assert!(matches!(result, Err(BinaryIndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_slice_and_extend() {
        let codes = BinaryCodes::new((0u8..8).collect(), 16).unwrap();
        let tail = codes.slice(2..4).unwrap();
        assert_eq!(tail.as_bytes(), &[4, 5, 6, 7]);
        assert!(codes.slice(3..5).is_err());

        let mut head = codes.slice(0..1).unwrap();
        head.extend(&tail).unwrap();
        assert_eq!(head.len(), 3);

        let other = BinaryCodes::empty(8).unwrap();
        assert!(head.extend(&other).is_err());
    }

    #[test]
    fn test_retain_rows() {
        let mut codes = BinaryCodes::new(vec![10, 11, 12, 13], 8).unwrap();
        codes.retain_rows(|i| i % 2 == 1);
        assert_eq!(codes.as_bytes(), &[11, 13]);
    }

    #[test]
    fn test_rows_iter() {
        let codes = BinaryCodes::new(vec![1, 2, 3, 4], 16).unwrap();
        let rows: Vec<&[u8]> = codes.rows().collect();
        assert_eq!(rows, vec![&[1u8, 2][..], &[3u8, 4][..]]);
    }
}
