use rayon::prelude::*;

use super::{Exec, Lanes, MIN_TASK_LEN};
use crate::{Decimal, LANES};

/// Computes `|x - pivot|` for every element, one element at a time.
#[must_use]
pub fn abs_diff(data: &[Decimal], pivot: Decimal, exec: Exec) -> Vec<Decimal> {
    match exec {
        Exec::Serial => data.iter().map(|&x| (x - pivot).abs()).collect(),
        Exec::Threaded => data
            .par_iter()
            .with_min_len(MIN_TASK_LEN)
            .map(|&x| (x - pivot).abs())
            .collect(),
    }
}

/// Computes `|x - pivot|` for every element, [`LANES`] elements at a time.
///
/// A scalar tail handles lengths that are not a multiple of the lane count.
/// Under [`Exec::Threaded`] the output is split into lane-aligned blocks that
/// are processed concurrently.
#[must_use]
pub fn abs_diff_lanes(data: &[Decimal], pivot: Decimal, exec: Exec) -> Vec<Decimal> {
    let mut out = vec![0.0; data.len()];

    match exec {
        Exec::Serial => abs_diff_block(data, pivot, &mut out),
        Exec::Threaded => out
            .par_chunks_mut(MIN_TASK_LEN)
            .zip(data.par_chunks(MIN_TASK_LEN))
            .for_each(|(dst, src)| abs_diff_block(src, pivot, dst)),
    }

    out
}

fn abs_diff_block(src: &[Decimal], pivot: Decimal, dst: &mut [Decimal]) {
    let pivot_lanes = Lanes::splat(pivot);
    let mut src_lanes = src.chunks_exact(LANES);
    let mut dst_lanes = dst.chunks_exact_mut(LANES);

    for (s, d) in (&mut src_lanes).zip(&mut dst_lanes) {
        (Lanes::load(s) - pivot_lanes).abs().store(d);
    }

    src_lanes
        .remainder()
        .iter()
        .zip(dst_lanes.into_remainder())
        .for_each(|(&x, d)| *d = (x - pivot).abs());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_and_lanes_agree_on_ragged_length() {
        // not a multiple of LANES so the tail loop runs
        let data: Vec<Decimal> = (0..(3 * LANES + 3)).map(|i| i as Decimal * 1.5).collect();
        let expected: Vec<Decimal> = data.iter().map(|x| (x - 10.0).abs()).collect();

        for exec in [Exec::Serial, Exec::Threaded] {
            assert_eq!(abs_diff(&data, 10.0, exec), expected);
            assert_eq!(abs_diff_lanes(&data, 10.0, exec), expected);
        }
    }

    #[test]
    fn threaded_lanes_cover_multiple_blocks() {
        let data: Vec<Decimal> = (0..(MIN_TASK_LEN * 3 + 7)).map(|i| (i % 97) as Decimal).collect();
        let out = abs_diff_lanes(&data, 48.0, Exec::Threaded);
        assert_eq!(out.len(), data.len());
        assert!(out.iter().zip(&data).all(|(d, x)| *d == (x - 48.0).abs()));
    }

    #[test]
    fn example_differences_from_median() {
        let sorted = [3.0, 9.0, 10.0, 27.0, 38.0, 43.0, 82.0];
        let diffs = abs_diff_lanes(&sorted, 27.0, Exec::Serial);
        assert_eq!(diffs, [24.0, 18.0, 17.0, 0.0, 11.0, 16.0, 55.0]);
    }
}
