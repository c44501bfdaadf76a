//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Once;

use manifoldb_binary::types::BinaryCodes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bits per vector in the integration scenarios.
pub const DIMENSION: usize = 512;

static TRACING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Uniformly random codes.
pub fn random_codes(n: usize, dimension: usize, seed: u64) -> BinaryCodes {
    let mut rng = StdRng::seed_from_u64(seed);
    let bytes: Vec<u8> = (0..n * dimension / 8).map(|_| rng.gen()).collect();
    BinaryCodes::new(bytes, dimension).expect("valid codes")
}
