use std::hint::black_box;

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use mad_cv::Decimal;
use mad_cv::backend::Backend;
use mad_cv::ops::dispatch::AnyBackend;
use mad_cv::stats;

fn dataset(n: usize) -> Vec<Decimal> {
    let mut rng = StdRng::seed_from_u64(n as u64);
    (0..n).map(|_| rng.random_range(-100.0..100.0)).collect()
}

fn bench_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute");
    for n in [1 << 12, 1 << 16, 1 << 20] {
        let data = dataset(n);
        for backend in Backend::ALL {
            // each backend owns its context for the whole benchmark
            let Ok(mut b) = AnyBackend::new(backend) else {
                continue;
            };
            group.bench_with_input(BenchmarkId::new(backend.to_string(), n), &data, |bencher, data| {
                bencher.iter_batched_ref(
                    || data.clone(),
                    |v| black_box(stats::compute(&mut b, v)),
                    BatchSize::LargeInput,
                );
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_compute);
criterion_main!(benches);
