//! Benchmarks for write cache operations.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use bookie_core::write_cache::{WriteCache, WriteCacheConfig};
use std::convert::Infallible;
use std::hint::black_box;
use std::sync::Arc;

const CACHE_SIZE: usize = 256 * 1024 * 1024;

/// Benchmark put with varied entry sizes (target: < 500ns).
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_cache_put");

    for size in [64, 256, 1024, 4096] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{}B", size), |b| {
            let cache = WriteCache::new(WriteCacheConfig::with_max_cache_size(CACHE_SIZE));
            let entry = vec![0u8; size];
            let mut entry_id = 0i64;

            b.iter(|| {
                if !cache.put(1, entry_id, black_box(&entry)).unwrap() {
                    cache.clear();
                    entry_id = 0;
                }
                entry_id += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark point lookups against a populated cache.
fn bench_get(c: &mut Criterion) {
    let cache = WriteCache::new(WriteCacheConfig::with_max_cache_size(CACHE_SIZE));
    for ledger_id in 0..10 {
        for entry_id in 0..1000 {
            cache.put(ledger_id, entry_id, &[0u8; 128]).unwrap();
        }
    }

    c.bench_function("write_cache_get", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i = (i + 1) % 10_000;
            black_box(cache.get(i / 1000, i % 1000).unwrap())
        });
    });

    c.bench_function("write_cache_get_last_entry", |b| {
        b.iter(|| black_box(cache.get_last_entry(black_box(5)).unwrap()));
    });
}

/// Benchmark a full sorted drain of 100k entries.
fn bench_for_each(c: &mut Criterion) {
    c.bench_function("write_cache_for_each_100k", |b| {
        b.iter_batched(
            || {
                let cache = WriteCache::new(WriteCacheConfig::with_max_cache_size(CACHE_SIZE));
                // Interleave ledgers so the sort has work to do
                for entry_id in 0..10_000 {
                    for ledger_id in (0..10).rev() {
                        cache.put(ledger_id, entry_id, &[0u8; 100]).unwrap();
                    }
                }
                cache
            },
            |cache| {
                let mut bytes = 0usize;
                cache
                    .for_each(|_, _, entry| {
                        bytes += entry.len();
                        Ok::<(), Infallible>(())
                    })
                    .unwrap();
                black_box(bytes);
            },
            BatchSize::LargeInput,
        );
    });
}

/// Benchmark contended puts from several writer threads.
fn bench_concurrent_put(c: &mut Criterion) {
    c.bench_function("write_cache_put_4_threads_10k", |b| {
        b.iter_batched(
            || Arc::new(WriteCache::new(WriteCacheConfig::with_max_cache_size(CACHE_SIZE))),
            |cache| {
                std::thread::scope(|s| {
                    for ledger_id in 0..4 {
                        let cache = Arc::clone(&cache);
                        s.spawn(move || {
                            for entry_id in 0..2_500 {
                                cache.put(ledger_id, entry_id, &[0u8; 256]).unwrap();
                            }
                        });
                    }
                });
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_put,
    bench_get,
    bench_for_each,
    bench_concurrent_put
);
criterion_main!(benches);
