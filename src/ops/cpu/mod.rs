//! Parallel CPU kernels
//!
//! # CPU Backend
//!
//! This module provides the CPU implementations of the three operations every
//! backend exposes: sorting, absolute differences from a pivot, and the
//! `(Σx, Σx²)` reduction.
//!
//! ## Features
//!
//! - Parallel execution using [`rayon`](https://docs.rs/rayon), selected per call
//!   through [`Exec`]
//! - Lane-wise kernels over [`Lanes`], one 256-bit register of [`Decimal`]s at
//!   a time, shaped so the compiler emits packed instructions
//! - Scalar kernels used by the sequential and threaded backends
//!
//! ## Implemented Kernels
//!
//! - `merge_sort`: bottom-up merge sort, pairs of runs merged concurrently
//! - `bitonic_sort`: bitonic network with lane-wise compare-exchange
//! - `abs_diff` / `abs_diff_lanes`: `|x - pivot|`
//! - `sums` / `sums_lanes`: sum and sum of squares per worker chunk
//!
//! ## Design Goals
//!
//! - Results do not depend on the worker count beyond accumulation rounding
//! - Every pass of a sort finishes before the next one starts

use crate::Decimal;

mod abs_diff;
pub use self::abs_diff::{abs_diff, abs_diff_lanes};

mod bitonic;
pub use self::bitonic::{bitonic_sort, padded_len};

mod lanes;
pub use self::lanes::Lanes;

mod merge_sort;
pub use self::merge_sort::merge_sort;

mod reduce;
pub use self::reduce::{chunk_range, sums, sums_lanes};

/// Elements a rayon task should at least own before splitting further.
const MIN_TASK_LEN: usize = 1 << 12;

/// How a CPU kernel schedules its independent pieces of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Exec {
    /// Everything on the calling thread.
    #[default]
    Serial,
    /// Independent pieces spread across the `rayon` worker pool.
    Threaded,
}

impl Exec {
    /// Number of reduction chunks this mode splits a dataset into.
    #[must_use]
    pub fn workers(self) -> usize {
        match self {
            Self::Serial => 1,
            Self::Threaded => rayon::current_num_threads().max(1),
        }
    }

    /// Minimum number of `width`-element items per rayon task.
    fn min_items(width: usize) -> usize {
        (MIN_TASK_LEN / width.max(1)).max(1)
    }
}

/// Scalar compare-exchange placing the smaller value first (or last when
/// `descending`).
#[inline]
fn compare_exchange(a: &mut Decimal, b: &mut Decimal, descending: bool) {
    if (*a > *b) != descending && *a != *b {
        core::mem::swap(a, b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_uses_one_worker() {
        assert_eq!(Exec::Serial.workers(), 1);
        assert!(Exec::Threaded.workers() >= 1);
    }

    #[test]
    fn compare_exchange_orders_both_directions() {
        let (mut a, mut b) = (3.0, 1.0);
        compare_exchange(&mut a, &mut b, false);
        assert_eq!((a, b), (1.0, 3.0));
        compare_exchange(&mut a, &mut b, true);
        assert_eq!((a, b), (3.0, 1.0));
        compare_exchange(&mut a, &mut b, true);
        assert_eq!((a, b), (3.0, 1.0));
    }
}
