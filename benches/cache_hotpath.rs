//! L1 cache hot-path benchmarks.
//!
//! Measures synchronous tier reads and writes and the record codec.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use refine_core::cache::{MemoryTier, MemoryTierConfig, RecordCodec, Ttl};

fn tier(max_entries: usize) -> MemoryTier {
    MemoryTier::new(MemoryTierConfig {
        max_entries,
        max_ttl: Duration::from_secs(3600),
        sweep_interval: Duration::from_secs(60),
    })
}

fn bench_l1_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("l1_get");

    for (name, size) in [("small", 100), ("medium", 1_000), ("large", 10_000)] {
        let tier = tier(size);
        for i in 0..size {
            tier.set(&format!("refine:src:default:{i}:en"), vec![0u8; 128], Ttl::After(Duration::from_secs(600)));
        }

        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("hit", name), |b| {
            let mut i = 0usize;
            b.iter(|| {
                let key = format!("refine:src:default:{}:en", i % size);
                i += 1;
                black_box(tier.get(&key))
            })
        });
        group.bench_function(BenchmarkId::new("miss", name), |b| {
            b.iter(|| black_box(tier.get("refine:src:default:absent:en")))
        });
    }

    group.finish();
}

fn bench_l1_set_with_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("l1_set");

    for (name, size) in [("small", 100), ("large", 10_000)] {
        let tier = tier(size);
        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("insert_new", name), |b| {
            let mut i = 0u64;
            b.iter(|| {
                tier.set(&format!("k{i}"), black_box(vec![1u8; 64]), Ttl::Never);
                i += 1;
            })
        });
    }

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_codec");
    let codec = RecordCodec::new(1024);

    for (name, len) in [("plain", 256), ("compressed", 16 * 1024)] {
        let value = json!({ "content": "the quick brown fox ".repeat(len / 20), "quality": 0.7 });
        let record = codec.encode(&value);

        group.throughput(Throughput::Bytes(record.raw_len as u64));
        group.bench_function(BenchmarkId::new("encode", name), |b| {
            b.iter(|| black_box(codec.encode(black_box(&value))))
        });
        group.bench_function(BenchmarkId::new("decode", name), |b| {
            b.iter(|| black_box(codec.decode::<serde_json::Value>("k", black_box(&record.bytes))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_l1_get, bench_l1_set_with_eviction, bench_codec);
criterion_main!(benches);
