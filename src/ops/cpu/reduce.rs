use core::ops::Range;

use rayon::prelude::*;

use super::{Exec, Lanes};
use crate::{Decimal, LANES};

/// Bounds of chunk `index` when `len` elements are split into `chunks` parts.
///
/// Chunks are contiguous and `len / chunks` long; the last one also absorbs the
/// remainder of the division.
#[must_use]
pub fn chunk_range(index: usize, len: usize, chunks: usize) -> Range<usize> {
    let size = len / chunks;
    let start = index * size;
    let end = if index + 1 == chunks { len } else { start + size };
    start..end
}

/// Computes `(Σx, Σx²)` with scalar per-chunk accumulators.
///
/// The data is split into [`Exec::workers`] contiguous chunks, each reduced on
/// its own; the chunk partials are then added in order on the calling thread.
#[must_use]
pub fn sums(data: &[Decimal], exec: Exec) -> (Decimal, Decimal) {
    reduce_chunks(data, exec, |chunk| {
        chunk
            .iter()
            .fold((0.0, 0.0), |(s, sq), &x| (s + x, sq + x * x))
    })
}

/// Computes `(Σx, Σx²)` with lane-wise accumulators inside each chunk.
///
/// Each chunk accumulates [`LANES`] partial sums side by side, adds the lanes
/// together at the end, and finishes with a scalar loop over the tail.
#[must_use]
pub fn sums_lanes(data: &[Decimal], exec: Exec) -> (Decimal, Decimal) {
    reduce_chunks(data, exec, lane_sums)
}

fn lane_sums(chunk: &[Decimal]) -> (Decimal, Decimal) {
    let mut sum = Lanes::ZERO;
    let mut sum_sq = Lanes::ZERO;

    let lanes = chunk.chunks_exact(LANES);
    let tail = lanes.remainder();
    for v in lanes.map(Lanes::load) {
        sum = sum + v;
        sum_sq = sum_sq + v * v;
    }

    tail.iter().fold(
        (sum.horizontal_sum(), sum_sq.horizontal_sum()),
        |(s, sq), &x| (s + x, sq + x * x),
    )
}

fn reduce_chunks<F>(data: &[Decimal], exec: Exec, kernel: F) -> (Decimal, Decimal)
where
    F: Fn(&[Decimal]) -> (Decimal, Decimal) + Sync,
{
    let chunks = exec.workers().min(data.len()).max(1);
    let partial = |i: usize| kernel(&data[chunk_range(i, data.len(), chunks)]);

    let partials: Vec<(Decimal, Decimal)> = match exec {
        Exec::Serial => (0..chunks).map(partial).collect(),
        Exec::Threaded => (0..chunks).into_par_iter().map(partial).collect(),
    };

    log::trace!("reduced {} elements in {chunks} chunks", data.len());
    partials
        .into_iter()
        .fold((0.0, 0.0), |(s, sq), (ps, psq)| (s + ps, sq + psq))
}
