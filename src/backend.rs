//! Backend selection module.
//!
//! This module defines the closed set of execution strategies the engine can
//! run on, and a process-wide default used by the convenience functions in
//! [`crate::ops::dispatch`].
//!
//! # Supported Backends
//!
//! - `Sequential` — scalar kernels, merge sort, one thread (default).
//! - `Parallel` — scalar kernels and merge sort spread over the `rayon` pool.
//! - `Vectorized` — lane-wise kernels and a bitonic sorting network.
//! - `Gpu` — WGSL compute shaders via `wgpu` (requires the `wgpu` feature).
//!
//! The default is stored globally in an `AtomicU8`. A computation reads it
//! once and never switches backend mid-call.

use core::convert::TryFrom;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

/// Enumeration of supported computation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Backend {
    /// Single-threaded scalar backend (default).
    #[default]
    Sequential = 0,
    /// SIMD lanes and a bitonic sort.
    Vectorized,
    /// Multithreaded scalar backend.
    Parallel,
    /// GPU-offloaded backend using `wgpu`.
    Gpu,
}

impl Backend {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 4] = [Self::Sequential, Self::Vectorized, Self::Parallel, Self::Gpu];

    /// Whether this backend can be constructed in the current build.
    #[must_use]
    pub const fn is_compiled(self) -> bool {
        match self {
            Self::Gpu => cfg!(feature = "wgpu"),
            _ => true,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sequential => "sequential",
            Self::Vectorized => "vectorized",
            Self::Parallel => "parallel",
            Self::Gpu => "gpu",
        };
        f.write_str(name)
    }
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Sequential),
            1 => Ok(Self::Vectorized),
            2 => Ok(Self::Parallel),
            3 => Ok(Self::Gpu),
            _ => Err(()),
        }
    }
}

/// Internal global state for the default backend.
static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Sequential as u8);

/// Sets the default backend used by [`crate::ops::dispatch`].
///
/// # Example
///
/// ```
/// use mad_cv::backend::{get_backend, set_backend, Backend};
/// set_backend(Backend::Parallel);
/// assert_eq!(get_backend(), Backend::Parallel);
/// set_backend(Backend::Sequential);
/// ```
pub fn set_backend(b: Backend) {
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the current default backend.
///
/// If the stored value is invalid, defaults to [`Backend::Sequential`].
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_round_trip_covers_every_variant() {
        for b in Backend::ALL {
            assert_eq!(Backend::try_from(b as u8), Ok(b));
        }
        assert!(Backend::try_from(4).is_err());
    }

    #[test]
    fn cpu_backends_are_always_compiled() {
        assert!(Backend::Sequential.is_compiled());
        assert!(Backend::Vectorized.is_compiled());
        assert!(Backend::Parallel.is_compiled());
        assert_eq!(Backend::Gpu.is_compiled(), cfg!(feature = "wgpu"));
    }
}
