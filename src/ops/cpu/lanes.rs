use core::ops::{Add, Mul, Sub};

use crate::{Decimal, LANES};

/// One SIMD register worth of [`Decimal`]s.
///
/// Every operation is a fixed-length element-wise loop over `[Decimal; LANES]`,
/// which the optimizer lowers to packed instructions (`vaddpd`, `vminpd`, ...)
/// on any target with wide enough registers.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(align(32))]
pub struct Lanes(pub [Decimal; LANES]);

impl Lanes {
    /// All lanes zero.
    pub const ZERO: Self = Self([0.0; LANES]);

    /// Broadcasts `x` into every lane.
    #[inline(always)]
    #[must_use]
    pub const fn splat(x: Decimal) -> Self {
        Self([x; LANES])
    }

    /// Loads the first `LANES` elements of `src`.
    ///
    /// # Panics
    ///
    /// If `src` is shorter than `LANES`.
    #[inline(always)]
    #[must_use]
    pub fn load(src: &[Decimal]) -> Self {
        let mut v = [0.0; LANES];
        v.copy_from_slice(&src[..LANES]);
        Self(v)
    }

    /// Stores every lane into the first `LANES` elements of `dst`.
    #[inline(always)]
    pub fn store(self, dst: &mut [Decimal]) {
        dst[..LANES].copy_from_slice(&self.0);
    }

    /// Lane-wise minimum.
    #[inline(always)]
    #[must_use]
    pub fn min(self, rhs: Self) -> Self {
        Self(core::array::from_fn(|i| {
            if rhs.0[i] < self.0[i] { rhs.0[i] } else { self.0[i] }
        }))
    }

    /// Lane-wise maximum.
    #[inline(always)]
    #[must_use]
    pub fn max(self, rhs: Self) -> Self {
        Self(core::array::from_fn(|i| {
            if rhs.0[i] > self.0[i] { rhs.0[i] } else { self.0[i] }
        }))
    }

    /// Lane-wise absolute value (sign bit cleared).
    #[inline(always)]
    #[must_use]
    pub fn abs(self) -> Self {
        Self(self.0.map(Decimal::abs))
    }

    /// Sum of all lanes.
    #[inline(always)]
    #[must_use]
    pub fn horizontal_sum(self) -> Decimal {
        self.0.iter().sum()
    }
}

impl Add for Lanes {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self(core::array::from_fn(|i| self.0[i] + rhs.0[i]))
    }
}

impl Sub for Lanes {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self(core::array::from_fn(|i| self.0[i] - rhs.0[i]))
    }
}

impl Mul for Lanes {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        Self(core::array::from_fn(|i| self.0[i] * rhs.0[i]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: Decimal) -> Lanes {
        Lanes(core::array::from_fn(|i| start + i as Decimal))
    }

    #[test]
    fn arithmetic_is_lane_wise() {
        let a = ramp(1.0);
        let b = Lanes::splat(2.0);
        assert_eq!((a + b).0[0], 3.0);
        assert_eq!((a * b).0[LANES - 1], 2.0 * LANES as Decimal);
        assert_eq!((b - a).abs().0[0], 1.0);
    }

    #[test]
    fn min_max_split_pairs() {
        let a = ramp(0.0);
        let b = Lanes::splat(1.5);
        let lo = a.min(b);
        let hi = a.max(b);
        for i in 0..LANES {
            assert!(lo.0[i] <= hi.0[i]);
            assert_eq!(lo.0[i] + hi.0[i], a.0[i] + 1.5);
        }
    }

    #[test]
    fn load_store_and_horizontal_sum() {
        let src: Vec<Decimal> = (0..LANES + 3).map(|i| i as Decimal).collect();
        let v = Lanes::load(&src);
        let mut dst = vec![0.0; LANES];
        v.store(&mut dst);
        assert_eq!(dst, src[..LANES]);
        let expected = (LANES * (LANES - 1) / 2) as Decimal;
        assert_eq!(v.horizontal_sum(), expected);
        assert_eq!(Lanes::ZERO.horizontal_sum(), 0.0);
    }
}
