use rayon::prelude::*;

use super::Exec;
use crate::Decimal;

/// Sorts `data` ascending with a bottom-up (iterative) merge sort.
///
/// For run sizes `1, 2, 4, ...` the slice is cut into adjacent pairs of runs
/// and every pair is merged independently; under [`Exec::Threaded`] the pairs
/// of one pass are merged concurrently. A pass reads one buffer and writes the
/// other, so the end of `for_each` is the barrier between passes. The last
/// pair of a pass is clamped to the slice bound.
///
/// The sort is stable; equal elements keep their relative order.
///
/// # Example
///
/// ```
/// use mad_cv::ops::cpu::{merge_sort, Exec};
///
/// let mut v = [38.0, 27.0, 43.0, 3.0, 9.0, 82.0, 10.0];
/// merge_sort(&mut v, Exec::Threaded);
/// assert_eq!(v, [3.0, 9.0, 10.0, 27.0, 38.0, 43.0, 82.0]);
/// ```
pub fn merge_sort(data: &mut [Decimal], exec: Exec) {
    let n = data.len();
    if n < 2 {
        return;
    }

    let mut scratch = vec![0.0; n];
    let mut sorted_in_data = true;
    let mut size = 1;

    while size < n {
        if sorted_in_data {
            merge_pass(data, &mut scratch, size, exec);
        } else {
            merge_pass(&scratch, data, size, exec);
        }
        sorted_in_data = !sorted_in_data;
        size *= 2;
    }

    if !sorted_in_data {
        data.copy_from_slice(&scratch);
    }
}

/// Merges every pair of `size`-runs of `src` into `dst`.
fn merge_pass(src: &[Decimal], dst: &mut [Decimal], size: usize, exec: Exec) {
    let width = 2 * size;
    let merge = move |(out, pair): (&mut [Decimal], &[Decimal])| merge_pair(pair, size, out);

    match exec {
        Exec::Serial => dst.chunks_mut(width).zip(src.chunks(width)).for_each(merge),
        Exec::Threaded => dst
            .par_chunks_mut(width)
            .zip(src.par_chunks(width))
            .with_min_len(Exec::min_items(width))
            .for_each(merge),
    }
}

/// Merges the sorted runs `pair[..size]` and `pair[size..]` into `out`.
fn merge_pair(pair: &[Decimal], size: usize, out: &mut [Decimal]) {
    let (left, right) = pair.split_at(size.min(pair.len()));
    let (mut i, mut j) = (0, 0);

    for slot in out.iter_mut() {
        // `<=` takes from the left run on ties, which keeps the sort stable
        let take_left = j == right.len() || (i < left.len() && left[i] <= right[j]);
        if take_left {
            *slot = left[i];
            i += 1;
        } else {
            *slot = right[j];
            j += 1;
        }
    }
}
