//! Engine-level errors.

use core::fmt;

#[cfg(feature = "wgpu")]
use crate::ops::wgpu::GpuError;

/// Failure of a statistic computation.
///
/// Every variant is structural: retrying the same call yields the same error.
#[derive(Debug)]
pub enum EngineError {
    /// The dataset has no elements; MAD and CV are undefined.
    EmptyDataset,
    /// `Backend::Gpu` was requested from a build without the `wgpu` feature.
    GpuUnavailable,
    /// The GPU backend failed (adapter, device, shader build, transfer).
    #[cfg(feature = "wgpu")]
    Gpu(GpuError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDataset => write!(f, "dataset is empty"),
            Self::GpuUnavailable => {
                write!(f, "GPU backend requested but the `wgpu` feature is disabled")
            }
            #[cfg(feature = "wgpu")]
            Self::Gpu(e) => write!(f, "GPU failure: {e}"),
        }
    }
}

impl core::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            #[cfg(feature = "wgpu")]
            Self::Gpu(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(feature = "wgpu")]
impl From<GpuError> for EngineError {
    fn from(e: GpuError) -> Self {
        Self::Gpu(e)
    }
}
