//! Hamming distance over packed byte codes.
//!
//! Hamming distance counts the number of positions where corresponding bits
//! differ, computed as popcount(a XOR b). Codes are processed in 8-byte lanes
//! so that `u64::count_ones()` maps onto the hardware POPCNT / CNT
//! instructions, with a byte-wise tail for code sizes that are not a multiple
//! of 8.

use crate::types::Distance;

/// Calculate the Hamming distance between two packed codes.
///
/// # Panics
///
/// Debug-panics if the codes have different lengths.
///
/// # Example
///
/// ```
/// use manifoldb_binary::distance::hamming_distance;
///
/// // Bits that differ: positions 1, 3, 4, 6 = 4 differences
/// assert_eq!(hamming_distance(&[0b1111_0000], &[0b1010_1010]), 4);
/// ```
#[inline]
#[must_use]
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    debug_assert_eq!(a.len(), b.len(), "codes must have same length");

    let mut lanes_a = a.chunks_exact(8);
    let mut lanes_b = b.chunks_exact(8);
    let mut distance: u32 = 0;

    for (x, y) in lanes_a.by_ref().zip(lanes_b.by_ref()) {
        distance += (read_lane(x) ^ read_lane(y)).count_ones();
    }
    for (&x, &y) in lanes_a.remainder().iter().zip(lanes_b.remainder()) {
        distance += (x ^ y).count_ones();
    }

    distance
}

#[inline]
fn read_lane(bytes: &[u8]) -> u64 {
    let mut lane = [0u8; 8];
    lane.copy_from_slice(bytes);
    u64::from_le_bytes(lane)
}

/// A query code pre-split into `u64` lanes.
///
/// Comparing one query against many database codes is the inner loop of
/// every search, so the query side is decoded once up front.
#[derive(Debug, Clone)]
pub struct HammingComputer {
    lanes: Vec<u64>,
    tail: Vec<u8>,
}

impl HammingComputer {
    /// Prepare a query code.
    #[must_use]
    pub fn new(query: &[u8]) -> Self {
        let chunks = query.chunks_exact(8);
        let tail = chunks.remainder().to_vec();
        let lanes = chunks.map(read_lane).collect();
        Self { lanes, tail }
    }

    /// Code size, in bytes, this computer was prepared for.
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.lanes.len() * 8 + self.tail.len()
    }

    /// Hamming distance from the prepared query to `code`.
    ///
    /// # Panics
    ///
    /// Debug-panics if `code` has a different length than the query.
    #[inline]
    #[must_use]
    pub fn distance(&self, code: &[u8]) -> Distance {
        debug_assert_eq!(code.len(), self.code_size(), "codes must have same length");

        let mut lanes = code.chunks_exact(8);
        let mut distance: u32 = 0;
        for (&q, c) in self.lanes.iter().zip(lanes.by_ref()) {
            distance += (q ^ read_lane(c)).count_ones();
        }
        for (&q, &c) in self.tail.iter().zip(lanes.remainder()) {
            distance += (q ^ c).count_ones();
        }

        // A code of d bits has distance <= d, far below i32::MAX for any valid dimension.
        distance as Distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_distance_identical() {
        let a = [0xFFu8; 16];
        assert_eq!(hamming_distance(&a, &a), 0);
    }

    #[test]
    fn test_hamming_distance_opposite() {
        let a = [0x00u8; 64];
        let b = [0xFFu8; 64];
        assert_eq!(hamming_distance(&a, &b), 512);
    }

    #[test]
    fn test_hamming_distance_one_bit() {
        assert_eq!(hamming_distance(&[0b0000_0001], &[0b0000_0000]), 1);
    }

    #[test]
    fn test_hamming_distance_with_tail() {
        // 8-byte lane plus a 3-byte tail
        let mut a = [0u8; 11];
        let b = [0u8; 11];
        a[0] = 0xFF;
        a[10] = 0x0F;
        assert_eq!(hamming_distance(&a, &b), 12);
    }

    #[test]
    fn test_computer_matches_function() {
        let query: Vec<u8> = (0u8..13).map(|i| i.wrapping_mul(37)).collect();
        let code: Vec<u8> = (0u8..13).map(|i| i.wrapping_mul(91) ^ 0x5A).collect();

        let computer = HammingComputer::new(&query);
        assert_eq!(computer.code_size(), 13);
        assert_eq!(computer.distance(&code) as u32, hamming_distance(&query, &code));
    }
}
