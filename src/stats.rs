//! MAD and CV on top of any [`StatBackend`].
//!
//! The orchestration is backend-agnostic: the backend sorts, differences and
//! reduces; everything here is `O(1)` or a single `O(n)` scan on the host.
//!
//! - **MAD**: sort, take the median, compute `|x - median|`, take the median of
//!   those differences. The differences of sorted data decrease towards the
//!   median and increase away from it, so their median is found by merging
//!   outward from the centre instead of sorting them again.
//! - **CV**: `(Σx, Σx²)` from the backend, then `sqrt(Σx²/n - mean²) / mean`.
//!
//! Computing MAD leaves the dataset sorted ascending.

use core::ops::{Deref, DerefMut};

use crate::ops::dispatch::StatBackend;
use crate::{Decimal, EngineError};

/// The two dispersion statistics of one dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    /// Median absolute deviation from the median.
    pub mad: Decimal,
    /// Standard deviation divided by the mean (population variance).
    pub coef_var: Decimal,
}

impl Statistics {
    /// `false` when the mean was zero and the CV is NaN or infinite.
    #[must_use]
    pub const fn coef_var_is_defined(&self) -> bool {
        self.coef_var.is_finite()
    }
}

/// Keeps the dataset resident on the backend; releases it on drop.
struct Residency<'a, B: StatBackend + ?Sized> {
    backend: &'a mut B,
}

impl<'a, B: StatBackend + ?Sized> Residency<'a, B> {
    fn acquire(backend: &'a mut B, data: &[Decimal]) -> Result<Self, EngineError> {
        backend.acquire(data)?;
        Ok(Self { backend })
    }
}

impl<B: StatBackend + ?Sized> Deref for Residency<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: StatBackend + ?Sized> DerefMut for Residency<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: StatBackend + ?Sized> Drop for Residency<'_, B> {
    fn drop(&mut self) {
        self.backend.release();
    }
}

/// Computes the median absolute deviation of `data`, sorting it in place.
///
/// # Errors
///
/// [`EngineError::EmptyDataset`] for an empty slice, or whatever the backend
/// raises.
///
/// # Example
///
/// ```
/// use mad_cv::ops::{cpu::Exec, dispatch::ScalarBackend};
/// use mad_cv::stats::compute_mad;
///
/// let mut data = [38.0, 27.0, 43.0, 3.0, 9.0, 82.0, 10.0];
/// let mad = compute_mad(&mut ScalarBackend::new(Exec::Threaded), &mut data).unwrap();
/// assert_eq!(mad, 17.0);
/// ```
pub fn compute_mad<B: StatBackend + ?Sized>(backend: &mut B, data: &mut [Decimal]) -> Result<Decimal, EngineError> {
    if data.is_empty() {
        return Err(EngineError::EmptyDataset);
    }
    let mut resident = Residency::acquire(backend, data)?;
    mad_of(&mut *resident, data)
}

/// Computes the coefficient of variation of `data`.
///
/// A zero mean yields NaN or an infinity (logged as a warning); check it with
/// [`Decimal::is_finite`] or [`Statistics::coef_var_is_defined`].
///
/// # Errors
///
/// [`EngineError::EmptyDataset`] for an empty slice, or whatever the backend
/// raises.
pub fn compute_coef_var<B: StatBackend + ?Sized>(backend: &mut B, data: &[Decimal]) -> Result<Decimal, EngineError> {
    if data.is_empty() {
        return Err(EngineError::EmptyDataset);
    }
    coef_var_of(backend, data)
}

/// Computes both statistics with one residency scope, sorting `data`.
///
/// Sums are taken before the sort, so a device backend uploads the dataset
/// once for the whole computation.
///
/// # Errors
///
/// [`EngineError::EmptyDataset`] for an empty slice, or whatever the backend
/// raises. The backend's residency is released on every path.
pub fn compute<B: StatBackend + ?Sized>(backend: &mut B, data: &mut [Decimal]) -> Result<Statistics, EngineError> {
    if data.is_empty() {
        return Err(EngineError::EmptyDataset);
    }
    log::debug!("computing statistics of {} elements on {}", data.len(), backend.name());

    let mut resident = Residency::acquire(backend, data)?;
    let coef_var = coef_var_of(&mut *resident, data)?;
    let mad = mad_of(&mut *resident, data)?;

    Ok(Statistics { mad, coef_var })
}

fn mad_of<B: StatBackend + ?Sized>(backend: &mut B, data: &mut [Decimal]) -> Result<Decimal, EngineError> {
    backend.sort(data)?;
    debug_assert!(is_sorted(data), "{} returned unsorted data", backend.name());

    let median = median_of_sorted(data);
    let diffs = backend.compute_abs_diff(data, median)?;
    let split = data.partition_point(|&x| x < median);

    Ok(folded_median(&diffs, split))
}

fn coef_var_of<B: StatBackend + ?Sized>(backend: &mut B, data: &[Decimal]) -> Result<Decimal, EngineError> {
    let (sum, sum_sq) = backend.compute_sums(data)?;
    Ok(coef_var_from_sums(sum, sum_sq, data.len()))
}

/// Median of an ascending slice: the middle element, or the midpoint of the
/// two middle elements for even lengths. NaN for an empty slice.
#[must_use]
pub fn median_of_sorted(sorted: &[Decimal]) -> Decimal {
    let n = sorted.len();
    match n {
        0 => Decimal::NAN,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => sorted[n / 2 - 1].midpoint(sorted[n / 2]),
    }
}

/// Median of `|x - m|` over sorted `x`, without sorting the differences.
///
/// `split` is the first index whose element is `>= m`: differences decrease
/// on `[0, split)` and increase on `[split, n)`. Two cursors walk outward from
/// `split`, always taking the smaller difference, which yields the
/// differences in ascending order; the walk stops at rank `n / 2`.
#[must_use]
pub fn folded_median(diffs: &[Decimal], split: usize) -> Decimal {
    let n = diffs.len();
    if n == 0 {
        return Decimal::NAN;
    }
    let upper = n / 2;
    let lower = if n % 2 == 0 { upper - 1 } else { upper };

    let (mut left, mut right) = (split.min(n), split.min(n));
    let mut at_lower = Decimal::NAN;
    let mut current = Decimal::NAN;

    for rank in 0..=upper {
        // either side may run out first
        current = match (left > 0, right < n) {
            (true, true) if diffs[left - 1] <= diffs[right] => {
                left -= 1;
                diffs[left]
            }
            (true, false) => {
                left -= 1;
                diffs[left]
            }
            (_, true) => {
                right += 1;
                diffs[right - 1]
            }
            (false, false) => break,
        };
        if rank == lower {
            at_lower = current;
        }
    }

    at_lower.midpoint(current)
}

/// CV from the sum and sum of squares of `n` elements.
///
/// Negative variances from cancellation are clamped to zero; NaN from
/// infinite inputs is kept.
#[must_use]
pub fn coef_var_from_sums(sum: Decimal, sum_sq: Decimal, n: usize) -> Decimal {
    let n = n as Decimal;
    let mean = sum / n;
    let variance = sum_sq / n - mean * mean;
    let variance = if variance < 0.0 { 0.0 } else { variance };

    if mean == 0.0 {
        log::warn!("coefficient of variation undefined: mean is zero");
    }
    variance.sqrt() / mean
}

/// Whether `data` is sorted ascending.
#[must_use]
pub fn is_sorted(data: &[Decimal]) -> bool {
    data.is_sorted_by(|a, b| a <= b)
}
