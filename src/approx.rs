//! Utilities to approximate equality of floating point values.
//!
//! Backends accumulate in different orders, so their results only agree up to
//! rounding. Comparisons here are relative to the larger magnitude, with an
//! absolute floor near zero.

use crate::Decimal;

/// Tolerance between CPU backends on `f64` data.
pub const F64_CPU_TOLERANCE: f64 = 1e-9;

/// Tolerance between any two backends, GPU included, on `f64` data.
pub const F64_CROSS_TOLERANCE: f64 = 1e-6;

/// Tolerance between any two backends on `f32` data.
pub const F32_CROSS_TOLERANCE: f32 = 1e-3;

/// Cross-backend tolerance for the configured [`Decimal`].
#[cfg(not(feature = "f32"))]
pub const CROSS_TOLERANCE: Decimal = F64_CROSS_TOLERANCE;

/// Cross-backend tolerance for the configured [`Decimal`].
#[cfg(feature = "f32")]
pub const CROSS_TOLERANCE: Decimal = F32_CROSS_TOLERANCE;

/// Checks the relative distance between two values.
pub trait RelativeEq<Rhs: ?Sized = Self> {
    /// The scalar the tolerance is expressed in.
    type Epsilon: Copy;

    /// Grades the equality of `self` and `rhs` against `tolerance`.
    fn approx_eq(&self, rhs: &Rhs, tolerance: Self::Epsilon) -> ApproxEquality;
}

macro_rules! impl_relative_eq {
    ($t:ty) => {
        impl RelativeEq for $t {
            type Epsilon = $t;

            fn approx_eq(&self, rhs: &Self, tolerance: $t) -> ApproxEquality {
                if self == rhs {
                    // covers equal infinities
                    return ApproxEquality::Precise;
                }
                if self.is_nan() && rhs.is_nan() {
                    return ApproxEquality::Precise;
                }
                let scale = self.abs().max(rhs.abs()).max(1.0);
                let dif = (self - rhs).abs() / scale;

                if dif <= tolerance * 1e-3 {
                    ApproxEquality::Precise
                } else if dif <= tolerance {
                    ApproxEquality::Relative
                } else {
                    ApproxEquality::Scarce
                }
            }
        }
    };
}

impl_relative_eq!(f32);
impl_relative_eq!(f64);

impl<T: RelativeEq> RelativeEq for [T] {
    type Epsilon = T::Epsilon;

    fn approx_eq(&self, rhs: &Self, tolerance: T::Epsilon) -> ApproxEquality {
        if self.len() != rhs.len() {
            return ApproxEquality::Scarce;
        }
        let mut eq = ApproxEquality::Precise;
        for (a, b) in self.iter().zip(rhs) {
            match a.approx_eq(b, tolerance) {
                ApproxEquality::Precise => {}
                ApproxEquality::Relative => eq = ApproxEquality::Relative,
                ApproxEquality::Scarce => return ApproxEquality::Scarce,
            }
        }
        eq
    }
}

/// The approximated equality enumerated.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Within a thousandth of the tolerance.
    Precise = 0,

    /// Within the tolerance.
    Relative = 1,

    /// No relative equality.
    Scarce = 2,
}

/// Whether `a` and `b` agree within `tolerance` (relative).
pub fn approx_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B, tolerance: A::Epsilon) -> bool {
    a.approx_eq(b, tolerance) != ApproxEquality::Scarce
}
