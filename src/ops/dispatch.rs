//! Backend Dispatch Layer
//!
//! Every backend implements [`StatBackend`]: the three operations the
//! statistics in [`crate::stats`] are built from. Static callers use a concrete
//! type ([`ScalarBackend`], [`VectorBackend`], `GpuBackend`); callers that pick
//! the strategy at runtime go through the tagged union [`AnyBackend`], built
//! from a [`Backend`].
//!
//! # Design Highlights
//! - **Closed set**: one variant per [`Backend`], selected once per call
//! - **No fallback**: a GPU that cannot be used is an error, never a CPU detour
//! - **Residency hooks**: [`StatBackend::acquire`] / [`StatBackend::release`]
//!   let the GPU keep one device buffer for a whole computation
//!
//! # Example
//! ```rust
//! use mad_cv::backend::Backend;
//! use mad_cv::ops::dispatch;
//!
//! let mut data = vec![1.0, 2.0, 3.0, 4.0];
//! let stats = dispatch::compute_with(Backend::Vectorized, &mut data).unwrap();
//! assert_eq!(stats.mad, 1.0);
//! ```

use crate::backend::{Backend, get_backend};
use crate::ops::cpu::{self, Exec};
use crate::stats::{self, Statistics};
use crate::{Decimal, EngineError};

#[cfg(feature = "wgpu")]
use crate::ops::wgpu::GpuBackend;

/// The operation set shared by every execution strategy.
///
/// Contracts are identical across implementations; only the decomposition of
/// the work differs.
pub trait StatBackend {
    /// Short human-readable name.
    fn name(&self) -> &'static str;

    /// Sorts `data` ascending, in place.
    ///
    /// # Errors
    ///
    /// Only device backends fail.
    fn sort(&mut self, data: &mut [Decimal]) -> Result<(), EngineError>;

    /// Returns `|x - median|` for every element of `data`, in order.
    ///
    /// # Errors
    ///
    /// Only device backends fail.
    fn compute_abs_diff(&mut self, data: &[Decimal], median: Decimal) -> Result<Vec<Decimal>, EngineError>;

    /// Returns `(Σx, Σx²)` over `data`.
    ///
    /// # Errors
    ///
    /// Only device backends fail.
    fn compute_sums(&mut self, data: &[Decimal]) -> Result<(Decimal, Decimal), EngineError>;

    /// Prepares `data` for a sequence of operations on the same dataset.
    ///
    /// Device backends upload `data` here once and reuse that copy until
    /// [`release`](Self::release). The default does nothing.
    ///
    /// # Errors
    ///
    /// When the upload fails.
    fn acquire(&mut self, data: &[Decimal]) -> Result<(), EngineError> {
        let _ = data;
        Ok(())
    }

    /// Frees whatever [`acquire`](Self::acquire) set up. Must be idempotent.
    fn release(&mut self) {}
}

impl<B: StatBackend + ?Sized> StatBackend for &mut B {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn sort(&mut self, data: &mut [Decimal]) -> Result<(), EngineError> {
        (**self).sort(data)
    }

    fn compute_abs_diff(&mut self, data: &[Decimal], median: Decimal) -> Result<Vec<Decimal>, EngineError> {
        (**self).compute_abs_diff(data, median)
    }

    fn compute_sums(&mut self, data: &[Decimal]) -> Result<(Decimal, Decimal), EngineError> {
        (**self).compute_sums(data)
    }

    fn acquire(&mut self, data: &[Decimal]) -> Result<(), EngineError> {
        (**self).acquire(data)
    }

    fn release(&mut self) {
        (**self).release();
    }
}

/// Scalar kernels with a bottom-up merge sort.
///
/// `Exec::Serial` is [`Backend::Sequential`]; `Exec::Threaded` is
/// [`Backend::Parallel`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarBackend {
    /// Scheduling of the independent pieces of each kernel.
    pub exec: Exec,
}

impl ScalarBackend {
    /// Creates a scalar backend with the given scheduling.
    #[must_use]
    pub const fn new(exec: Exec) -> Self {
        Self { exec }
    }
}

impl StatBackend for ScalarBackend {
    fn name(&self) -> &'static str {
        match self.exec {
            Exec::Serial => "sequential",
            Exec::Threaded => "parallel",
        }
    }

    fn sort(&mut self, data: &mut [Decimal]) -> Result<(), EngineError> {
        cpu::merge_sort(data, self.exec);
        Ok(())
    }

    fn compute_abs_diff(&mut self, data: &[Decimal], median: Decimal) -> Result<Vec<Decimal>, EngineError> {
        Ok(cpu::abs_diff(data, median, self.exec))
    }

    fn compute_sums(&mut self, data: &[Decimal]) -> Result<(Decimal, Decimal), EngineError> {
        Ok(cpu::sums(data, self.exec))
    }
}

/// Lane-wise kernels with a bitonic sort.
///
/// `Exec::Serial` is [`Backend::Vectorized`]; `Exec::Threaded` composes the
/// vector kernels with the worker pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorBackend {
    /// Scheduling of the independent pieces of each kernel.
    pub exec: Exec,
}

impl VectorBackend {
    /// Creates a vectorized backend with the given scheduling.
    #[must_use]
    pub const fn new(exec: Exec) -> Self {
        Self { exec }
    }
}

impl StatBackend for VectorBackend {
    fn name(&self) -> &'static str {
        match self.exec {
            Exec::Serial => "vectorized",
            Exec::Threaded => "parallel-vectorized",
        }
    }

    fn sort(&mut self, data: &mut [Decimal]) -> Result<(), EngineError> {
        cpu::bitonic_sort(data, self.exec);
        Ok(())
    }

    fn compute_abs_diff(&mut self, data: &[Decimal], median: Decimal) -> Result<Vec<Decimal>, EngineError> {
        Ok(cpu::abs_diff_lanes(data, median, self.exec))
    }

    fn compute_sums(&mut self, data: &[Decimal]) -> Result<(Decimal, Decimal), EngineError> {
        Ok(cpu::sums_lanes(data, self.exec))
    }
}

/// One of the backends, chosen at runtime.
#[derive(Debug)]
pub enum AnyBackend {
    /// [`Backend::Sequential`] or [`Backend::Parallel`].
    Scalar(ScalarBackend),
    /// [`Backend::Vectorized`].
    Vector(VectorBackend),
    /// [`Backend::Gpu`].
    #[cfg(feature = "wgpu")]
    Gpu(GpuBackend),
}

impl AnyBackend {
    /// Builds the backend for `backend`.
    ///
    /// The GPU variant creates a fresh device context and compiles its kernels.
    ///
    /// # Errors
    ///
    /// - [`EngineError::GpuUnavailable`] for `Backend::Gpu` without the `wgpu` feature
    /// - a GPU error when no adapter/device is found or the kernels fail to build
    pub fn new(backend: Backend) -> Result<Self, EngineError> {
        match backend {
            Backend::Sequential => Ok(Self::Scalar(ScalarBackend::new(Exec::Serial))),
            Backend::Parallel => Ok(Self::Scalar(ScalarBackend::new(Exec::Threaded))),
            Backend::Vectorized => Ok(Self::Vector(VectorBackend::new(Exec::Serial))),
            #[cfg(feature = "wgpu")]
            Backend::Gpu => Ok(Self::Gpu(GpuBackend::new()?)),
            #[cfg(not(feature = "wgpu"))]
            Backend::Gpu => Err(EngineError::GpuUnavailable),
        }
    }

    fn inner(&mut self) -> &mut dyn StatBackend {
        match self {
            Self::Scalar(b) => b,
            Self::Vector(b) => b,
            #[cfg(feature = "wgpu")]
            Self::Gpu(b) => b,
        }
    }
}

impl StatBackend for AnyBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Scalar(b) => b.name(),
            Self::Vector(b) => b.name(),
            #[cfg(feature = "wgpu")]
            Self::Gpu(b) => b.name(),
        }
    }

    fn sort(&mut self, data: &mut [Decimal]) -> Result<(), EngineError> {
        self.inner().sort(data)
    }

    fn compute_abs_diff(&mut self, data: &[Decimal], median: Decimal) -> Result<Vec<Decimal>, EngineError> {
        self.inner().compute_abs_diff(data, median)
    }

    fn compute_sums(&mut self, data: &[Decimal]) -> Result<(Decimal, Decimal), EngineError> {
        self.inner().compute_sums(data)
    }

    fn acquire(&mut self, data: &[Decimal]) -> Result<(), EngineError> {
        self.inner().acquire(data)
    }

    fn release(&mut self) {
        self.inner().release();
    }
}

/// Computes MAD and CV on `backend`, leaving `data` sorted.
///
/// # Errors
///
/// See [`AnyBackend::new`] and [`stats::compute`].
pub fn compute_with(backend: Backend, data: &mut [Decimal]) -> Result<Statistics, EngineError> {
    if data.is_empty() {
        return Err(EngineError::EmptyDataset);
    }
    let mut b = AnyBackend::new(backend)?;
    stats::compute(&mut b, data)
}

/// Computes MAD and CV on the default backend ([`get_backend`]).
///
/// # Errors
///
/// See [`compute_with`].
pub fn compute(data: &mut [Decimal]) -> Result<Statistics, EngineError> {
    compute_with(get_backend(), data)
}

/// Computes the MAD on the default backend, leaving `data` sorted.
///
/// # Errors
///
/// See [`compute_with`].
pub fn mad(data: &mut [Decimal]) -> Result<Decimal, EngineError> {
    if data.is_empty() {
        return Err(EngineError::EmptyDataset);
    }
    let mut b = AnyBackend::new(get_backend())?;
    stats::compute_mad(&mut b, data)
}

/// Computes the CV on the default backend.
///
/// # Errors
///
/// See [`compute_with`].
pub fn coef_var(data: &[Decimal]) -> Result<Decimal, EngineError> {
    if data.is_empty() {
        return Err(EngineError::EmptyDataset);
    }
    let mut b = AnyBackend::new(get_backend())?;
    stats::compute_coef_var(&mut b, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_backends_build_from_enum() {
        for backend in [Backend::Sequential, Backend::Parallel, Backend::Vectorized] {
            let b = AnyBackend::new(backend).unwrap();
            assert_eq!(b.name(), backend.to_string());
        }
    }

    #[cfg(not(feature = "wgpu"))]
    #[test]
    fn gpu_without_feature_is_an_error() {
        assert!(matches!(AnyBackend::new(Backend::Gpu), Err(EngineError::GpuUnavailable)));
    }

    #[test]
    fn empty_dataset_is_rejected_before_backend_construction() {
        let mut empty: Vec<Decimal> = Vec::new();
        assert!(matches!(compute_with(Backend::Gpu, &mut empty), Err(EngineError::EmptyDataset)));
        assert!(matches!(coef_var(&empty), Err(EngineError::EmptyDataset)));
    }

    #[test]
    fn threaded_vector_backend_sorts_and_sums() {
        let mut b = VectorBackend::new(Exec::Threaded);
        let mut v = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        b.sort(&mut v).unwrap();
        assert_eq!(v, [1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(b.compute_sums(&v).unwrap(), (15.0, 55.0));
        assert_eq!(b.name(), "parallel-vectorized");
    }
}
