use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;

use bookshelf::{CacheConfig, RateLimitConfig};
use resilience::{ResponseCache, SlidingWindowLimiter};

/// Benchmark cache reads for hits and misses
fn bench_cache_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_get");

    for capacity in [100usize, 1_000, 10_000] {
        let cache = ResponseCache::new(CacheConfig::default().with_capacity(capacity));
        for i in 0..capacity {
            cache.put(format!("search:query-{i}:10"), i);
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("hit", capacity), &capacity, |b, &cap| {
            let key = format!("search:query-{}:10", cap / 2);
            b.iter(|| black_box(cache.get(black_box(&key))));
        });
        group.bench_with_input(BenchmarkId::new("miss", capacity), &capacity, |b, _| {
            b.iter(|| black_box(cache.get(black_box("volume:absent"))));
        });
    }

    group.finish();
}

/// Benchmark inserts into a full cache (every put evicts)
fn bench_cache_put_evicting(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_put_evicting");
    group.throughput(Throughput::Elements(1));

    group.bench_function("capacity_100", |b| {
        let cache = ResponseCache::new(CacheConfig::default().with_capacity(100));
        let mut i = 0u64;
        b.iter(|| {
            cache.put(format!("volume:{i}"), black_box(i));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark the limiter's non-blocking admission path
fn bench_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter");
    group.throughput(Throughput::Elements(1));

    group.bench_function("try_admit_saturated", |b| {
        let limiter = SlidingWindowLimiter::new(
            RateLimitConfig::default()
                .with_max_requests(100)
                .with_window(Duration::from_secs(3600)),
        );
        while limiter.try_admit() {}
        b.iter(|| black_box(limiter.try_admit()));
    });

    group.bench_function("count", |b| {
        let limiter = SlidingWindowLimiter::new(RateLimitConfig::default());
        for _ in 0..50 {
            limiter.try_admit();
        }
        b.iter(|| black_box(limiter.count()));
    });

    group.finish();
}

criterion_group!(benches, bench_cache_get, bench_cache_put_evicting, bench_limiter);
criterion_main!(benches);
