//! # Operation Layer
//!
//! This module defines the sort / difference / reduction operations and the
//! backends that implement them.
//!
//! ## Submodules
//!
//! - [`cpu`] — merge sort, bitonic network, lane-wise and threaded kernels
//! - [`wgpu`] *(opt-in)* — GPU compute shader pipelines using `wgpu`
//! - [`dispatch`] — the [`StatBackend`](dispatch::StatBackend) trait, the
//!   backend variants and enum-based selection
//!
//! ## Extending the Backend
//!
//! To add a backend:
//!
//! 1. Implement the kernels (e.g. `cpu::my_sort`, `wgpu::my_kernel`)
//! 2. Implement [`StatBackend`](dispatch::StatBackend) for a new type
//! 3. Add it to [`AnyBackend`](dispatch::AnyBackend)
//!
//! ## Feature Flags
//!
//! - `wgpu` — Enables the `wgpu` (WebGPU) backend

pub mod dispatch;

pub mod cpu;

#[cfg(feature = "wgpu")]
pub mod wgpu;
