//! GPU-accelerated statistics kernels using WGPU.
//!
//! This module runs the three backend operations as WGSL compute shaders:
//!
//! - `bitonic` — one compare-exchange pass of the bitonic sorting network
//! - `abs_diff` — elementwise `|x - median|`
//! - `reduce` — workgroup tree reduction of `Σx` and `Σx²`
//!
//! A [`GpuContext`] owns the adapter, device, queue and the compiled
//! pipelines. Shader sources are prefixed with an `alias Scalar = ...;` line
//! matching [`Decimal`](crate::Decimal) once (via `lazy_static`) and compiled
//! when the context is created; a build failure carries the compiler log.
//!
//! Double precision requires the adapter to support
//! [`wgpu::Features::SHADER_F64`]. Without it context creation fails; there is
//! no silent downgrade.

use core::fmt;

use briny::prelude::*;

mod backend;
pub use self::backend::GpuBackend;

mod dataset;
pub use self::dataset::DeviceDataset;

/// Invocations per workgroup in every kernel.
pub const WORKGROUP_SIZE: u32 = 256;

const BITONIC: &str = include_str!("shaders/bitonic.wgsl");
const ABS_DIFF: &str = include_str!("shaders/abs_diff.wgsl");
const REDUCE: &str = include_str!("shaders/reduce.wgsl");

#[cfg(not(feature = "f32"))]
const SCALAR_ALIAS: &str = "alias Scalar = f64;\n\n";
#[cfg(feature = "f32")]
const SCALAR_ALIAS: &str = "alias Scalar = f32;\n\n";

#[cfg(not(feature = "f32"))]
const REQUIRED_FEATURES: wgpu::Features = wgpu::Features::SHADER_F64;
#[cfg(feature = "f32")]
const REQUIRED_FEATURES: wgpu::Features = wgpu::Features::empty();

lazy_static::lazy_static! {
    static ref BITONIC_SOURCE: String = format!("{SCALAR_ALIAS}{BITONIC}");
    static ref ABS_DIFF_SOURCE: String = format!("{SCALAR_ALIAS}{ABS_DIFF}");
    static ref REDUCE_SOURCE: String = format!("{SCALAR_ALIAS}{REDUCE}");
}

/// Errors raised by the GPU backend.
#[derive(Debug)]
pub enum GpuError {
    /// No adapter matched the requested options.
    Adapter(wgpu::RequestAdapterError),
    /// The adapter refused to create a device.
    Device(wgpu::RequestDeviceError),
    /// The adapter lacks features the configured precision needs.
    MissingFeature(wgpu::Features),
    /// A kernel failed to compile or validate; holds the compiler log.
    Build(String),
    /// Waiting on the device failed.
    Poll(wgpu::PollError),
    /// Mapping a staging buffer for readback failed.
    Map(wgpu::BufferAsyncError),
    /// The mapped bytes could not be viewed as [`Decimal`](crate::Decimal)s.
    Readback(bytemuck::PodCastError),
    /// The dataset does not fit in a single storage binding on this device.
    TooLarge {
        /// Requested buffer size in bytes.
        bytes: u64,
        /// Largest storage binding the device allows.
        limit: u64,
    },
    /// A shader source was rejected before compilation.
    Validation(ValidationError),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adapter(e) => write!(f, "Adapter error: {e}"),
            Self::Device(e) => write!(f, "Device error: {e}"),
            Self::MissingFeature(features) => {
                write!(f, "Adapter does not support required features: {features:?}")
            }
            Self::Build(log) => write!(f, "Kernel build failed:\n{log}"),
            Self::Poll(e) => write!(f, "Device poll failed: {e}"),
            Self::Map(e) => write!(f, "Buffer map failed: {e}"),
            Self::Readback(e) => write!(f, "Readback cast failed: {e}"),
            Self::TooLarge { bytes, limit } => {
                write!(f, "Dataset of {bytes} bytes exceeds the device limit of {limit} bytes")
            }
            Self::Validation(e) => write!(f, "Validation error: {e}"),
        }
    }
}

impl core::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Adapter(e) => Some(e),
            Self::Device(e) => Some(e),
            Self::Poll(e) => Some(e),
            Self::Map(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for GpuError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

/// Adapter selection for a [`GpuContext`].
#[derive(Debug, Clone, Copy)]
pub struct GpuOptions {
    /// Preferred adapter class. Defaults to the discrete, high-performance one.
    pub power_preference: wgpu::PowerPreference,
    /// Use the software fallback adapter only.
    pub force_fallback_adapter: bool,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

/// A compiled compute pipeline and the layout of its single bind group.
pub(crate) struct Kernel {
    pub(crate) layout: wgpu::BindGroupLayout,
    pub(crate) pipeline: wgpu::ComputePipeline,
}

/// The three kernels every GPU computation needs.
pub(crate) struct Kernels {
    pub(crate) bitonic: Kernel,
    pub(crate) abs_diff: Kernel,
    pub(crate) reduce: Kernel,
}

/// Holds the WGPU adapter, device and queue plus the compiled kernels.
///
/// Each context compiles its kernels once, on creation. It is not shared
/// between concurrent computations: [`GpuBackend`] borrows it mutably.
pub struct GpuContext {
    /// The adapter the device was created from.
    pub adapter: wgpu::Adapter,
    /// The actual GPU device.
    pub device: wgpu::Device,
    /// The queue all kernels are submitted to.
    pub queue: wgpu::Queue,
    pub(crate) kernels: Kernels,
}

impl GpuContext {
    /// Creates a context on the default high-performance adapter.
    ///
    /// # Errors
    ///
    /// See [`GpuContext::with_options`].
    ///
    /// # Example
    /// ```no_run
    /// use mad_cv::ops::wgpu::GpuContext;
    ///
    /// let ctx = GpuContext::new()?;
    /// println!("{}", ctx.info());
    /// # Ok::<(), mad_cv::ops::wgpu::GpuError>(())
    /// ```
    pub fn new() -> Result<Self, GpuError> {
        Self::with_options(GpuOptions::default())
    }

    /// Creates a context on an adapter matching `options`.
    ///
    /// # Internals
    /// - Uses `pollster::block_on` to wait for the async WGPU calls
    /// - Requests the adapter's own limits so large datasets fit
    /// - Requests [`wgpu::Features::SHADER_F64`] unless built with `f32`
    ///
    /// # Errors
    ///
    /// - [`GpuError::Adapter`] / [`GpuError::Device`] when no device is available
    /// - [`GpuError::MissingFeature`] when the adapter cannot do the configured precision
    /// - [`GpuError::Build`] / [`GpuError::Validation`] when a kernel does not compile
    pub fn with_options(options: GpuOptions) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: options.power_preference,
            force_fallback_adapter: options.force_fallback_adapter,
            compatible_surface: None,
        }))
        .map_err(GpuError::Adapter)?;

        let info = adapter.get_info();
        log::info!(
            "GPU adapter: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        if !adapter.features().contains(REQUIRED_FEATURES) {
            return Err(GpuError::MissingFeature(
                REQUIRED_FEATURES.difference(adapter.features()),
            ));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("mad_cv"),
            required_features: REQUIRED_FEATURES,
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(GpuError::Device)?;

        let kernels = Kernels {
            bitonic: build_kernel(
                &device,
                "bitonic",
                &BITONIC_SOURCE,
                &[storage_entry(0, false), uniform_entry(1, true)],
            )?,
            abs_diff: build_kernel(
                &device,
                "abs_diff",
                &ABS_DIFF_SOURCE,
                &[storage_entry(0, true), storage_entry(1, false), uniform_entry(2, false)],
            )?,
            reduce: build_kernel(
                &device,
                "reduce",
                &REDUCE_SOURCE,
                &[
                    storage_entry(0, true),
                    storage_entry(1, false),
                    storage_entry(2, false),
                    uniform_entry(3, false),
                ],
            )?,
        };

        Ok(Self { adapter, device, queue, kernels })
    }

    /// Human-readable description of the adapter and driver.
    #[must_use]
    pub fn info(&self) -> String {
        let info = self.adapter.get_info();
        format!(
            "{} ({:?}, {:?}, driver: {} {})",
            info.name, info.backend, info.device_type, info.driver, info.driver_info
        )
    }

    /// Fails with [`GpuError::TooLarge`] when `bytes` cannot be bound as one
    /// storage buffer.
    pub(crate) fn check_size(&self, bytes: u64) -> Result<(), GpuError> {
        let limits = self.device.limits();
        let limit = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
        if bytes > limit {
            log::warn!("dataset of {bytes} bytes exceeds the storage binding limit ({limit})");
            return Err(GpuError::TooLarge { bytes, limit });
        }
        Ok(())
    }

    /// Workgroup grid covering `invocations`, spilling into `y` when `x` would
    /// exceed the per-dimension limit.
    pub(crate) fn workgroups(&self, invocations: u32) -> (u32, u32) {
        let groups = invocations.div_ceil(WORKGROUP_SIZE).max(1);
        let max = self.device.limits().max_compute_workgroups_per_dimension.max(1);
        if groups <= max {
            (groups, 1)
        } else {
            (max, groups.div_ceil(max))
        }
    }

    /// Blocks until every submitted command has finished.
    pub(crate) fn wait(&self) -> Result<(), GpuError> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(GpuError::Poll)
    }
}

impl fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuContext").field("adapter", &self.info()).finish_non_exhaustive()
    }
}

/// Secure wrapper for WGSL source code extracted from files.
pub struct WgslSource<'a>(pub &'a str);

impl Validate for WgslSource<'_> {
    fn validate(&self) -> Result<(), ValidationError> {
        let src = self.0;

        if src.len() > 65536 {
            return Err(ValidationError);
        }

        if !src.contains("fn main") || !src.starts_with("alias Scalar = ") {
            return Err(ValidationError);
        }

        // no source inclusion
        if src.contains("import") || src.contains("#include") {
            return Err(ValidationError);
        }

        let forbidden = ["asm", "unsafe", "ptr", "std::"];
        if forbidden.iter().any(|bad| src.contains(bad)) {
            return Err(ValidationError);
        }

        Ok(())
    }
}

/// Validates, compiles and links one kernel, capturing the compiler log.
fn build_kernel(
    device: &wgpu::Device,
    label: &'static str,
    source: &str,
    entries: &[wgpu::BindGroupLayoutEntry],
) -> Result<Kernel, GpuError> {
    WgslSource(source).validate()?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });

    let info = pollster::block_on(module.get_compilation_info());
    let scope = pollster::block_on(device.pop_error_scope());

    let mut build_log: Vec<String> = info
        .messages
        .iter()
        .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
        .map(|m| match &m.location {
            Some(loc) => format!("{label}:{}:{}: {}", loc.line_number, loc.line_position, m.message),
            None => format!("{label}: {}", m.message),
        })
        .collect();
    if let Some(err) = scope {
        build_log.push(format!("{label}: {err}"));
    }

    if !build_log.is_empty() {
        let build_log = build_log.join("\n");
        log::error!("failed to build kernel `{label}`:\n{build_log}");
        return Err(GpuError::Build(build_log));
    }

    log::debug!("built kernel `{label}`");
    Ok(Kernel { layout, pipeline })
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, has_dynamic_offset: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset,
            min_binding_size: None,
        },
        count: None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A context, or `None` (logged) on machines without a usable adapter.
    pub(crate) fn context() -> Option<GpuContext> {
        match GpuContext::new() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                None
            }
        }
    }

    #[test]
    fn prefixed_sources_pass_validation() {
        for src in [&*BITONIC_SOURCE, &*ABS_DIFF_SOURCE, &*REDUCE_SOURCE] {
            assert!(WgslSource(src).validate().is_ok());
        }
    }

    #[test]
    fn validation_rejects_unprefixed_and_forbidden_sources() {
        assert!(WgslSource(BITONIC).validate().is_err());
        assert!(WgslSource("alias Scalar = f32;\nfn main() { unsafe }").validate().is_err());
        assert!(WgslSource("alias Scalar = f32;\nfn helper() {}").validate().is_err());
    }

    #[test]
    fn context_reports_adapter() {
        let Some(ctx) = context() else { return };
        assert!(!ctx.info().is_empty());
        let (x, y) = ctx.workgroups(1000);
        assert_eq!((x, y), (4, 1));
    }
}
