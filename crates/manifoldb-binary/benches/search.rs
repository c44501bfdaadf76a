//! Benchmarks for binary search.
//!
//! Run with: `cargo bench -p manifoldb-binary`
//!
//! Compare the graph index against brute force at a few search buffer sizes.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use manifoldb_binary::distance::hamming_distance;
use manifoldb_binary::index::{
    BinaryCagraIndex, BinaryFlatIndex, BinaryIndex, CagraConfig, SearchParams,
};
use manifoldb_binary::resources::DeviceResources;
use manifoldb_binary::types::BinaryCodes;
use manifoldb_binary::{has_capability, Capability};
use rand::Rng;

const DIMENSION: usize = 512;

/// Generate `n` random codes.
fn random_codes(n: usize) -> BinaryCodes {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..n * DIMENSION / 8).map(|_| rng.gen()).collect();
    BinaryCodes::new(bytes, DIMENSION).expect("valid codes")
}

/// Benchmark Hamming distance across code sizes.
fn bench_hamming(c: &mut Criterion) {
    let mut group = c.benchmark_group("hamming_distance");
    let mut rng = rand::thread_rng();

    for bits in [64, 256, 512, 1024] {
        let a: Vec<u8> = (0..bits / 8).map(|_| rng.gen()).collect();
        let b: Vec<u8> = (0..bits / 8).map(|_| rng.gen()).collect();

        group.throughput(Throughput::Elements(bits as u64));
        group.bench_with_input(BenchmarkId::from_parameter(bits), &bits, |bench, _| {
            bench.iter(|| hamming_distance(black_box(&a), black_box(&b)));
        });
    }

    group.finish();
}

/// Benchmark brute-force search.
fn bench_flat_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_search");
    let queries = random_codes(100);

    for n in [1_000, 10_000] {
        let index = BinaryFlatIndex::from_codes(random_codes(n));
        group.throughput(Throughput::Elements(queries.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bench, _| {
            bench.iter(|| index.search(black_box(&queries), 10).expect("search"));
        });
    }

    group.finish();
}

/// Benchmark graph search at different buffer sizes.
fn bench_graph_search(c: &mut Criterion) {
    if !has_capability(Capability::Cagra) {
        return;
    }

    let res = DeviceResources::standard().expect("resources");
    let config = CagraConfig::new().with_intermediate_graph_degree(64).with_graph_degree(32);
    let mut index = BinaryCagraIndex::new(&res, DIMENSION, config).expect("index");
    index.train(&random_codes(10_000)).expect("build");
    let queries = random_codes(100);

    let mut group = c.benchmark_group("graph_search");
    for itopk in [32, 64, 128, 256] {
        let params = SearchParams::default().with_itopk_size(itopk);
        group.throughput(Throughput::Elements(queries.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(itopk), &itopk, |bench, _| {
            bench.iter(|| index.search_with_params(black_box(&queries), 10, &params).expect("search"));
        });
    }

    group.finish();
}

/// Benchmark graph construction.
fn bench_graph_build(c: &mut Criterion) {
    if !has_capability(Capability::Cagra) {
        return;
    }

    let res = DeviceResources::standard().expect("resources");
    let codes = random_codes(5_000);

    let mut group = c.benchmark_group("graph_build");
    group.sample_size(10);
    group.bench_function("nn_descent_5000", |bench| {
        bench.iter(|| {
            let config = CagraConfig::new().with_intermediate_graph_degree(64).with_graph_degree(32);
            let mut index = BinaryCagraIndex::new(&res, DIMENSION, config).expect("index");
            index.train(black_box(&codes)).expect("build");
            index
        });
    });

    group.finish();
}

criterion_group!(benches, bench_hamming, bench_flat_search, bench_graph_search, bench_graph_build);
criterion_main!(benches);
