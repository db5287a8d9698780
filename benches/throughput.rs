use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::thread;
use tlfu_cache::Cache;

const OPS_PER_THREAD: u64 = 200_000;

fn bench_single_thread_get_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread");
    group.throughput(Throughput::Elements(OPS_PER_THREAD));

    group.bench_function("put_then_get", |b| {
        b.iter(|| {
            let cache: Cache<u64, u64> = Cache::builder().maximum_size(10_000).build();
            for i in 0..OPS_PER_THREAD {
                let key = i % 20_000;
                cache.put(key, key);
                black_box(cache.get_if_present(&key));
            }
        });
    });

    group.finish();
}

fn bench_concurrent_get_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");

    for num_threads in [2, 4, 8].iter() {
        let total_ops = OPS_PER_THREAD * (*num_threads as u64);
        group.throughput(Throughput::Elements(total_ops));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{num_threads}T")),
            num_threads,
            |b, &n| {
                b.iter(|| {
                    let cache: Cache<u64, u64> = Cache::builder().maximum_size(10_000).build();
                    let mut handles = Vec::new();
                    for t in 0..n {
                        let cache = cache.clone();
                        handles.push(thread::spawn(move || {
                            for i in 0..OPS_PER_THREAD {
                                let key = (t as u64 * OPS_PER_THREAD + i) % 20_000;
                                cache.put(key, key);
                                black_box(cache.get_if_present(&key));
                            }
                        }));
                    }
                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_single_thread_get_put, bench_concurrent_get_put);
criterion_main!(benches);
