//! Distance functions for packed binary codes.

mod hamming;

pub use hamming::{hamming_distance, HammingComputer};

#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_symmetric(pair in (1usize..40).prop_flat_map(|n| (
            proptest::collection::vec(any::<u8>(), n),
            proptest::collection::vec(any::<u8>(), n),
        ))) {
            let (a, b) = pair;
            prop_assert_eq!(hamming_distance(&a, &b), hamming_distance(&b, &a));
        }

        #[test]
        fn prop_bounded_by_bits(pair in (1usize..40).prop_flat_map(|n| (
            proptest::collection::vec(any::<u8>(), n),
            proptest::collection::vec(any::<u8>(), n),
        ))) {
            let (a, b) = pair;
            prop_assert!(hamming_distance(&a, &b) as usize <= a.len() * 8);
            prop_assert_eq!(hamming_distance(&a, &a), 0);
        }

        #[test]
        fn prop_computer_agrees(pair in (1usize..40).prop_flat_map(|n| (
            proptest::collection::vec(any::<u8>(), n),
            proptest::collection::vec(any::<u8>(), n),
        ))) {
            let (a, b) = pair;
            let computer = HammingComputer::new(&a);
            prop_assert_eq!(computer.distance(&b) as u32, hamming_distance(&a, &b));
        }

        #[test]
        fn prop_triangle_inequality(triple in (1usize..24).prop_flat_map(|n| (
            proptest::collection::vec(any::<u8>(), n),
            proptest::collection::vec(any::<u8>(), n),
            proptest::collection::vec(any::<u8>(), n),
        ))) {
            let (a, b, c) = triple;
            let detour = hamming_distance(&a, &b) + hamming_distance(&b, &c);
            prop_assert!(hamming_distance(&a, &c) <= detour);
        }
    }
}
