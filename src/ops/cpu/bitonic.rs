use rayon::prelude::*;

use super::{Exec, Lanes, compare_exchange};
use crate::{Decimal, LANES};

/// Length of the sorting network for `n` elements: the next power of two.
#[must_use]
pub const fn padded_len(n: usize) -> usize {
    n.next_power_of_two()
}

/// Sorts `data` ascending with a bitonic sorting network.
///
/// Inputs whose length is not a power of two are copied into a buffer padded
/// with `+∞`, which sorts behind every real element; the first `n` elements of
/// the result are copied back, so no padding ever reaches `data`.
///
/// The network has `log2(m)` stages, stage `s` made of `s + 1` passes. Within a
/// pass every compare-exchange is independent. Pair distances of at least
/// [`LANES`] compare whole registers at once; shorter ones run scalar. Under
/// [`Exec::Threaded`] the blocks of a pass run on the `rayon` pool and the end
/// of the pass is a join.
///
/// # Example
///
/// ```
/// use mad_cv::ops::cpu::{bitonic_sort, Exec};
///
/// let mut v = [38.0, 27.0, 43.0, 3.0, 9.0, 82.0, 10.0];
/// bitonic_sort(&mut v, Exec::Serial);
/// assert_eq!(v, [3.0, 9.0, 10.0, 27.0, 38.0, 43.0, 82.0]);
/// ```
pub fn bitonic_sort(data: &mut [Decimal], exec: Exec) {
    let n = data.len();
    if n < 2 {
        return;
    }

    let padded = padded_len(n);
    if padded == n {
        bitonic_network(data, exec);
        return;
    }

    log::debug!("bitonic sort: padding {n} elements to {padded}");
    let mut buf = Vec::with_capacity(padded);
    buf.extend_from_slice(data);
    buf.resize(padded, Decimal::INFINITY);
    bitonic_network(&mut buf, exec);
    data.copy_from_slice(&buf[..n]);
}

/// Runs the full network over a power-of-two slice.
fn bitonic_network(data: &mut [Decimal], exec: Exec) {
    debug_assert!(data.len().is_power_of_two());
    let stages = data.len().trailing_zeros();

    for stage in 0..stages {
        for pass in 0..=stage {
            compare_exchange_pass(data, stage, 1 << (stage - pass), exec);
        }
    }
}

/// One pass: every element `i` with `i & distance == 0` against `i + distance`.
///
/// Blocks of `2 * distance` elements are independent. A block sorts descending
/// when it lies in an odd `2^(stage + 1)`-sized run, which is what turns pairs
/// of sorted runs into bitonic sequences for the next stage.
fn compare_exchange_pass(data: &mut [Decimal], stage: u32, distance: usize, exec: Exec) {
    let width = 2 * distance;
    let direction_run = 2usize << stage;

    let step = move |(index, block): (usize, &mut [Decimal])| {
        let descending = ((index * width) & direction_run) != 0;
        let (lo, hi) = block.split_at_mut(distance);
        compare_exchange_block(lo, hi, descending);
    };

    match exec {
        Exec::Serial => data.chunks_mut(width).enumerate().for_each(step),
        Exec::Threaded => data
            .par_chunks_mut(width)
            .enumerate()
            .with_min_len(Exec::min_items(width))
            .for_each(step),
    }
}

/// Compare-exchanges `lo[k]` with `hi[k]` for every `k`.
fn compare_exchange_block(lo: &mut [Decimal], hi: &mut [Decimal], descending: bool) {
    let mut lo_lanes = lo.chunks_exact_mut(LANES);
    let mut hi_lanes = hi.chunks_exact_mut(LANES);

    for (a, b) in (&mut lo_lanes).zip(&mut hi_lanes) {
        let x = Lanes::load(a);
        let y = Lanes::load(b);
        let (small, large) = (x.min(y), x.max(y));
        if descending {
            large.store(a);
            small.store(b);
        } else {
            small.store(a);
            large.store(b);
        }
    }

    lo_lanes
        .into_remainder()
        .iter_mut()
        .zip(hi_lanes.into_remainder())
        .for_each(|(a, b)| compare_exchange(a, b, descending));
}
