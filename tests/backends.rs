use mad_cv::approx::{CROSS_TOLERANCE, approx_eq};
use mad_cv::backend::Backend;
use mad_cv::ops::cpu::Exec;
use mad_cv::ops::dispatch::{AnyBackend, ScalarBackend, StatBackend, VectorBackend};
use mad_cv::stats::{self, median_of_sorted};
use mad_cv::{Decimal, Statistics};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_dataset(n: usize, seed: u64) -> Vec<Decimal> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.random_range(-50.0..150.0)).collect()
}

fn sorted_reference(data: &[Decimal]) -> Vec<Decimal> {
    let mut v = data.to_vec();
    v.sort_by(Decimal::total_cmp);
    v
}

/// MAD by fully sorting the differences, and CV by a naive two-pass formula.
fn reference_statistics(data: &[Decimal]) -> Statistics {
    let sorted = sorted_reference(data);
    let median = median_of_sorted(&sorted);
    let diffs = sorted_reference(&sorted.iter().map(|x| (x - median).abs()).collect::<Vec<_>>());

    let n = data.len() as f64;
    let mean = data.iter().map(|&x| f64::from(x)).sum::<f64>() / n;
    let var = data.iter().map(|&x| (f64::from(x) - mean).powi(2)).sum::<f64>() / n;

    Statistics {
        mad: median_of_sorted(&diffs),
        coef_var: (var.sqrt() / mean) as Decimal,
    }
}

fn all_cpu_backends() -> Vec<Box<dyn StatBackend>> {
    vec![
        Box::new(ScalarBackend::new(Exec::Serial)),
        Box::new(ScalarBackend::new(Exec::Threaded)),
        Box::new(VectorBackend::new(Exec::Serial)),
        Box::new(VectorBackend::new(Exec::Threaded)),
    ]
}

#[test]
fn test_sort_is_an_ascending_permutation_on_every_backend() {
    for n in [2, 3, 31, 1000, 4097] {
        let data = random_dataset(n, n as u64);
        let expected = sorted_reference(&data);

        for mut b in all_cpu_backends() {
            let mut v = data.clone();
            b.sort(&mut v).unwrap();
            assert_eq!(v, expected, "{} n = {n}", b.name());
        }
    }
}

#[test]
fn test_backends_agree_on_random_dataset() {
    let data = random_dataset(10_000, 0x5eed);
    let reference = reference_statistics(&data);

    for mut b in all_cpu_backends() {
        let mut v = data.clone();
        let result = stats::compute(&mut *b, &mut v).unwrap();
        assert!(approx_eq(&result.mad, &reference.mad, CROSS_TOLERANCE), "{}: {result:?}", b.name());
        assert!(
            approx_eq(&result.coef_var, &reference.coef_var, CROSS_TOLERANCE),
            "{}: {result:?} vs {reference:?}",
            b.name()
        );
    }
}

#[cfg(not(feature = "f32"))]
#[test]
fn test_cpu_backends_agree_tightly_in_double_precision() {
    use mad_cv::approx::F64_CPU_TOLERANCE;

    let data = random_dataset(50_000, 99);
    let mut results = Vec::new();
    for mut b in all_cpu_backends() {
        let mut v = data.clone();
        results.push(stats::compute(&mut *b, &mut v).unwrap());
    }

    let first = results[0];
    for r in &results[1..] {
        assert_eq!(r.mad, first.mad);
        assert!(approx_eq(&r.coef_var, &first.coef_var, F64_CPU_TOLERANCE));
    }
}

#[test]
fn test_duplicates_and_negatives() {
    let data: Vec<Decimal> = (0..5000).map(|i| ((i * 37) % 11) as Decimal - 5.0).collect();
    let reference = reference_statistics(&data);

    for mut b in all_cpu_backends() {
        let mut v = data.clone();
        let mad = stats::compute_mad(&mut *b, &mut v).unwrap();
        assert_eq!(mad, reference.mad, "{}", b.name());
    }
}

/// Adapters without `SHADER_F64` cannot build the default `f64` kernels and
/// these tests skip; run them with `--features "wgpu f32"` for GPU coverage on
/// such adapters (including software ones).
#[cfg(feature = "wgpu")]
mod gpu {
    use super::*;
    use mad_cv::ops::wgpu::GpuBackend;

    fn gpu() -> Option<GpuBackend> {
        match GpuBackend::new() {
            Ok(b) => Some(b),
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                None
            }
        }
    }

    #[test]
    fn test_gpu_sort_matches_reference() {
        let Some(mut b) = gpu() else { return };
        for n in [2, 7, 256, 1000, 70_000] {
            let data = random_dataset(n, 3);
            let mut v = data.clone();
            b.sort(&mut v).unwrap();
            assert_eq!(v, sorted_reference(&data), "n = {n}");
        }
    }

    #[test]
    fn test_gpu_agrees_with_cpu_backends() {
        let Some(mut b) = gpu() else { return };
        let data = random_dataset(10_000, 0x5eed);
        let reference = reference_statistics(&data);

        let mut v = data.clone();
        let result = stats::compute(&mut b, &mut v).unwrap();
        assert_eq!(v, sorted_reference(&data));
        assert!(approx_eq(&result.mad, &reference.mad, CROSS_TOLERANCE));
        assert!(approx_eq(&result.coef_var, &reference.coef_var, CROSS_TOLERANCE));
        assert!(!b.is_resident());
    }

    #[test]
    fn test_gpu_through_enum() {
        let Ok(mut b) = AnyBackend::new(Backend::Gpu) else { return };
        let mut data = vec![38.0, 27.0, 43.0, 3.0, 9.0, 82.0, 10.0];
        assert_eq!(stats::compute_mad(&mut b, &mut data).unwrap(), 17.0);
    }
}

#[test]
fn test_enum_and_concrete_backends_match() {
    let data = random_dataset(3000, 11);
    for backend in [Backend::Sequential, Backend::Parallel, Backend::Vectorized] {
        let mut a = data.clone();
        let mut b = data.clone();
        let via_enum = stats::compute(&mut AnyBackend::new(backend).unwrap(), &mut a).unwrap();
        let via_fn = mad_cv::ops::dispatch::compute_with(backend, &mut b).unwrap();
        assert_eq!(via_enum, via_fn);
        assert_eq!(a, b);
    }
}
