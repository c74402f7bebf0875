//! mad_cv: dispersion statistics over interchangeable compute backends.
//!
//! Computes the median absolute deviation (MAD) and the coefficient of
//! variation (CV) of one-dimensional datasets. The same logical algorithm runs
//! on four execution strategies:
//!
//! - **Sequential** — scalar loops and a bottom-up merge sort.
//! - **Parallel** — the same kernels split across the `rayon` worker pool.
//! - **Vectorized** — lane-wise kernels and a bitonic sorting network.
//! - **Gpu** — WGSL compute shaders through `wgpu` (feature `wgpu`).
//!
//! # Modules
//!
//! - [`stats`] — MAD / CV orchestration on top of any backend.
//! - [`ops`] — sort and reduction kernels plus the backend variants.
//! - [`backend`] — backend selection.
//! - [`loader`] — delimited text ingestion into per-column datasets.
//! - [`approx`] — relative float comparison used to cross-check backends.
//!
//! # Precision
//!
//! [`Decimal`] is `f64` unless the `f32` feature is enabled.
//!
//! # Example
//!
//! ```rust
//! use mad_cv::backend::Backend;
//! use mad_cv::ops::dispatch::AnyBackend;
//! use mad_cv::stats;
//!
//! let mut data = vec![38.0, 27.0, 43.0, 3.0, 9.0, 82.0, 10.0];
//! let mut backend = AnyBackend::new(Backend::Sequential).unwrap();
//! let result = stats::compute(&mut backend, &mut data).unwrap();
//! assert_eq!(result.mad, 17.0);
//! assert_eq!(data, [3.0, 9.0, 10.0, 27.0, 38.0, 43.0, 82.0]);
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::similar_names,
    clippy::module_name_repetitions
)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod approx;
pub mod backend;
pub mod error;
pub mod loader;
pub mod ops;
pub mod stats;

pub use error::EngineError;
pub use stats::Statistics;

#[cfg(not(feature = "f32"))]
type DecimalInner = f64;
#[cfg(feature = "f32")]
type DecimalInner = f32;

/// The element type of every dataset (`f64`, or `f32` with the `f32` feature).
pub type Decimal = DecimalInner;

/// Width of one SIMD register in bytes (AVX2).
pub const SIMD_BYTES: usize = 32;

/// The amount of [`Decimal`]s processed per vector step: 4 doubles or 8 floats.
pub const LANES: usize = SIMD_BYTES / size_of::<Decimal>();
