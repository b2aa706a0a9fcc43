use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use formgate::{
    ClientIdentity, CounterRegistry, LruEviction, Metrics, RateLimiter, RateWindowCounter,
    ShardedStorage, SystemClock, TieredRateLimiter, WindowPolicy,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

type Storage = Arc<ShardedStorage<ClientIdentity, RateWindowCounter>>;

fn identity(n: u32) -> ClientIdentity {
    ClientIdentity::Addr(IpAddr::V4(Ipv4Addr::from(0x0a00_0000 | n)))
}

fn limiter(max: u32) -> RateLimiter<Storage> {
    let registry = CounterRegistry::new(
        Arc::new(ShardedStorage::new()),
        Arc::new(SystemClock::new()),
    );
    RateLimiter::new(
        "bench",
        registry,
        WindowPolicy::new(max, Duration::from_secs(60)).unwrap(),
        Metrics::new(),
    )
}

/// Benchmark single-threaded decisions for one caller
fn bench_single_threaded_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_threaded");

    for max in [10u32, 100, 1000] {
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::new("rate_limit_decisions", max), &max, |b, &max| {
            let limiter = limiter(max);
            let caller = identity(1);
            b.iter(|| {
                for _ in 0..1000 {
                    black_box(limiter.check(black_box(caller)));
                }
            })
        });
    }

    group.finish();
}

/// Benchmark multi-threaded concurrent throughput
fn bench_concurrent_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");

    for num_threads in [2u32, 4, 8] {
        group.throughput(Throughput::Elements(u64::from(num_threads) * 1000));
        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            &num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let limiter = Arc::new(limiter(100));
                    let handles: Vec<_> = (0..num_threads)
                        .map(|i| {
                            let limiter = Arc::clone(&limiter);
                            // Each thread uses its own caller to avoid contention
                            std::thread::spawn(move || {
                                for _ in 0..1000 {
                                    black_box(limiter.check(black_box(identity(i))));
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

/// Benchmark narrow-then-global tiers against caller diversity
fn bench_tiered_diversity(c: &mut Criterion) {
    let mut group = c.benchmark_group("tiered_diversity");
    group.throughput(Throughput::Elements(1000));

    for callers in [1u32, 10, 1000] {
        group.bench_with_input(BenchmarkId::new("callers", callers), &callers, |b, &callers| {
            let tiered = TieredRateLimiter::new(vec![limiter(10), limiter(100)]);
            b.iter(|| {
                for i in 0..1000 {
                    black_box(tiered.check(black_box(identity(i % callers))));
                }
            })
        });
    }

    group.finish();
}

/// Benchmark inserting callers up to and past the eviction cap
fn bench_eviction_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction_pressure");

    for cap in [100usize, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::new("insert_past_cap", cap), &cap, |b, &cap| {
            b.iter(|| {
                let limiter = limiter(10).with_eviction(Arc::new(LruEviction::new(cap)));
                for i in 0..(cap as u32 * 2) {
                    limiter.check(identity(i));
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_threaded_throughput,
    bench_concurrent_throughput,
    bench_tiered_diversity,
    bench_eviction_pressure,
);
criterion_main!(benches);
