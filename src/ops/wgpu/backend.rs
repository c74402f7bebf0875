use wgpu::util::DeviceExt;

use super::dataset::{output_buffer, read_buffer};
use super::{DeviceDataset, GpuContext, GpuError, GpuOptions, WORKGROUP_SIZE};
use crate::ops::dispatch::StatBackend;
use crate::{Decimal, EngineError};

/// Uniform block of one bitonic pass; mirrors `Params` in `bitonic.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct PassParams {
    stage: u32,
    pass_index: u32,
    pairs: u32,
    _pad: u32,
}

const PARAMS_PAD: usize = (16 - size_of::<Decimal>() - size_of::<u32>()) / size_of::<u32>();

/// Uniform block of `abs_diff.wgsl`, padded to 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DiffParams {
    median: Decimal,
    len: u32,
    _pad: [u32; PARAMS_PAD],
}

/// Uniform block of `reduce.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ReduceParams {
    len: u32,
    _pad: [u32; 3],
}

/// The GPU backend: bitonic sort and reductions as WGSL kernels.
///
/// Between [`acquire`](StatBackend::acquire) and
/// [`release`](StatBackend::release) the dataset stays resident on the device
/// and every operation on the acquired slice reuses it instead of uploading
/// again. Any other slice, and every operation outside that scope, uploads its
/// input.
///
/// The resident copy follows [`sort`](StatBackend::sort); other host-side
/// writes to the acquired slice are not seen until the next `acquire`.
#[derive(Debug)]
pub struct GpuBackend {
    ctx: GpuContext,
    resident: Option<Resident>,
}

/// The acquired dataset and the host slice it mirrors.
#[derive(Debug)]
struct Resident {
    dataset: DeviceDataset,
    addr: usize,
    len: usize,
}

impl Resident {
    fn mirrors(&self, data: &[Decimal]) -> bool {
        self.addr == data.as_ptr() as usize && self.len == data.len()
    }
}

impl GpuBackend {
    /// Creates a backend on a fresh context with default options.
    ///
    /// # Errors
    ///
    /// See [`GpuContext::with_options`].
    pub fn new() -> Result<Self, GpuError> {
        Self::with_options(GpuOptions::default())
    }

    /// Creates a backend on a fresh context matching `options`.
    ///
    /// # Errors
    ///
    /// See [`GpuContext::with_options`].
    pub fn with_options(options: GpuOptions) -> Result<Self, GpuError> {
        Ok(Self::from_context(GpuContext::with_options(options)?))
    }

    /// Wraps an existing context.
    #[must_use]
    pub const fn from_context(ctx: GpuContext) -> Self {
        Self { ctx, resident: None }
    }

    /// The context every kernel runs on.
    #[must_use]
    pub const fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// Whether a dataset is currently resident on the device.
    #[must_use]
    pub const fn is_resident(&self) -> bool {
        self.resident.is_some()
    }

    fn run_bitonic(&self, ds: &DeviceDataset) -> Result<(), GpuError> {
        let padded = ds.padded_len();
        if padded < 2 {
            return Ok(());
        }
        let stages = padded.trailing_zeros();
        let pairs = (padded / 2) as u32;

        // one uniform slot per pass, addressed through dynamic offsets
        let stride = u64::from(self.ctx.device.limits().min_uniform_buffer_offset_alignment)
            .max(size_of::<PassParams>() as u64) as usize;
        let mut slots = Vec::new();
        for stage in 0..stages {
            for pass_index in 0..=stage {
                let params = PassParams { stage, pass_index, pairs, _pad: 0 };
                let start = slots.len();
                slots.resize(start + stride, 0u8);
                slots[start..start + size_of::<PassParams>()].copy_from_slice(bytemuck::bytes_of(&params));
            }
        }
        let passes = slots.len() / stride;

        let params = self.ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bitonic_params"),
            contents: &slots,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let kernel = &self.ctx.kernels.bitonic;
        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bitonic_bind_group"),
            layout: &kernel.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ds.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &params,
                        offset: 0,
                        size: wgpu::BufferSize::new(size_of::<PassParams>() as u64),
                    }),
                },
            ],
        });

        let (x, y) = self.ctx.workgroups(pairs);
        log::debug!("bitonic sort: {padded} elements, {passes} passes, {x}x{y} workgroups");

        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("bitonic_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("bitonic_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            // each dispatch is ordered after the previous one's writes
            for slot in 0..passes {
                pass.set_bind_group(0, &bind_group, &[(slot * stride) as u32]);
                pass.dispatch_workgroups(x, y, 1);
            }
        }
        self.ctx.queue.submit(Some(encoder.finish()));
        self.ctx.wait()?;
        params.destroy();
        Ok(())
    }

    fn run_abs_diff(&self, ds: &DeviceDataset, median: Decimal) -> Result<Vec<Decimal>, GpuError> {
        let len = ds.len();
        let out = output_buffer(&self.ctx, "abs_diff_out", len)?;
        let params = DiffParams { median, len: len as u32, _pad: [0; PARAMS_PAD] };
        let params = self.ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("abs_diff_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let kernel = &self.ctx.kernels.abs_diff;
        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("abs_diff_bind_group"),
            layout: &kernel.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ds.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
        });

        let (x, y) = self.ctx.workgroups(len as u32);
        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("abs_diff_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("abs_diff_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(x, y, 1);
        }
        self.ctx.queue.submit(Some(encoder.finish()));

        let diffs = read_buffer(&self.ctx, &out, len)?;
        out.destroy();
        params.destroy();
        Ok(diffs)
    }

    fn run_reduce(&self, ds: &DeviceDataset) -> Result<(Decimal, Decimal), GpuError> {
        let len = ds.len();
        let (x, y) = self.ctx.workgroups(len as u32);
        let groups = (x * y) as usize;

        let sums = output_buffer(&self.ctx, "reduce_sums", groups)?;
        let squares = output_buffer(&self.ctx, "reduce_squares", groups)?;
        let params = ReduceParams { len: len as u32, _pad: [0; 3] };
        let params = self.ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("reduce_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let kernel = &self.ctx.kernels.reduce;
        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("reduce_bind_group"),
            layout: &kernel.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ds.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: sums.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: squares.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params.as_entire_binding(),
                },
            ],
        });

        log::debug!("reduce: {len} elements, {groups} workgroups of {WORKGROUP_SIZE}");
        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("reduce_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("reduce_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(x, y, 1);
        }
        self.ctx.queue.submit(Some(encoder.finish()));

        let partial_sums = read_buffer(&self.ctx, &sums, groups)?;
        let partial_squares = read_buffer(&self.ctx, &squares, groups)?;
        sums.destroy();
        squares.destroy();
        params.destroy();

        Ok((partial_sums.iter().sum(), partial_squares.iter().sum()))
    }

    /// Runs `op` on the resident dataset when it matches `data`, or on a
    /// temporary upload of `data` otherwise.
    fn with_dataset<T>(
        &self,
        data: &[Decimal],
        op: impl FnOnce(&Self, &DeviceDataset) -> Result<T, GpuError>,
    ) -> Result<T, GpuError> {
        match &self.resident {
            Some(resident) if resident.mirrors(data) => op(self, &resident.dataset),
            _ => {
                let ds = DeviceDataset::upload(&self.ctx, data)?;
                op(self, &ds)
            }
        }
    }
}

impl StatBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn sort(&mut self, data: &mut [Decimal]) -> Result<(), EngineError> {
        if data.len() < 2 {
            return Ok(());
        }
        let sorted = self.with_dataset(data, |this, ds| {
            this.run_bitonic(ds)?;
            ds.read(&this.ctx)
        })?;
        data.copy_from_slice(&sorted);
        Ok(())
    }

    fn compute_abs_diff(&mut self, data: &[Decimal], median: Decimal) -> Result<Vec<Decimal>, EngineError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.with_dataset(data, |this, ds| this.run_abs_diff(ds, median))?)
    }

    fn compute_sums(&mut self, data: &[Decimal]) -> Result<(Decimal, Decimal), EngineError> {
        if data.is_empty() {
            return Ok((0.0, 0.0));
        }
        Ok(self.with_dataset(data, |this, ds| this.run_reduce(ds))?)
    }

    fn acquire(&mut self, data: &[Decimal]) -> Result<(), EngineError> {
        self.release();
        if !data.is_empty() {
            self.resident = Some(Resident {
                dataset: DeviceDataset::upload(&self.ctx, data)?,
                addr: data.as_ptr() as usize,
                len: data.len(),
            });
        }
        Ok(())
    }

    fn release(&mut self) {
        self.resident = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approx::{CROSS_TOLERANCE, approx_eq};
    use crate::ops::wgpu::tests::context;

    fn backend() -> Option<GpuBackend> {
        context().map(GpuBackend::from_context)
    }

    #[test]
    fn params_blocks_are_sixteen_bytes() {
        assert_eq!(size_of::<PassParams>(), 16);
        assert_eq!(size_of::<DiffParams>(), 16);
        assert_eq!(size_of::<ReduceParams>(), 16);
    }

    #[test]
    fn sorts_non_power_of_two() {
        let Some(mut gpu) = backend() else { return };
        let mut v = vec![38.0, 27.0, 43.0, 3.0, 9.0, 82.0, 10.0];
        gpu.sort(&mut v).unwrap();
        assert_eq!(v, [3.0, 9.0, 10.0, 27.0, 38.0, 43.0, 82.0]);
    }

    #[test]
    fn sums_skip_padding() {
        let Some(mut gpu) = backend() else { return };
        let (s, sq) = gpu.compute_sums(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!(approx_eq(&s, &15.0, CROSS_TOLERANCE));
        assert!(approx_eq(&sq, &55.0, CROSS_TOLERANCE));
    }

    #[test]
    fn resident_dataset_is_reused_and_released() {
        let Some(mut gpu) = backend() else { return };
        let mut v = vec![4.0, 1.0, 3.0, 2.0];
        gpu.acquire(&v).unwrap();
        assert!(gpu.is_resident());

        gpu.sort(&mut v).unwrap();
        assert_eq!(v, [1.0, 2.0, 3.0, 4.0]);
        let diffs = gpu.compute_abs_diff(&v, 2.5).unwrap();
        assert_eq!(diffs, [1.5, 0.5, 0.5, 1.5]);

        gpu.release();
        gpu.release();
        assert!(!gpu.is_resident());
    }

    #[test]
    fn other_slice_of_same_length_is_not_served_from_residency() {
        let Some(mut gpu) = backend() else { return };
        let a = [1.0, 2.0, 3.0];
        let b = [10.0, 20.0, 30.0];
        gpu.acquire(&a).unwrap();

        let (s, sq) = gpu.compute_sums(&b).unwrap();
        assert!(approx_eq(&s, &60.0, CROSS_TOLERANCE));
        assert!(approx_eq(&sq, &1400.0, CROSS_TOLERANCE));

        let mut c = [3.0, 1.0, 2.0];
        gpu.sort(&mut c).unwrap();
        assert_eq!(c, [1.0, 2.0, 3.0]);
        assert_eq!(gpu.compute_abs_diff(&b, 20.0).unwrap(), [10.0, 0.0, 10.0]);

        // the acquired slice still hits the resident copy
        let (s, _) = gpu.compute_sums(&a).unwrap();
        assert!(approx_eq(&s, &6.0, CROSS_TOLERANCE));
        gpu.release();
    }

    #[test]
    fn context_reports_adapter() {
        let Some(gpu) = backend() else { return };
        assert!(!gpu.context().info().is_empty());
    }

    #[test]
    fn multi_group_reduction() {
        let Some(mut gpu) = backend() else { return };
        let data: Vec<Decimal> = (0..100_000).map(|i| (i % 1000) as Decimal * 0.5).collect();
        let (s, sq) = gpu.compute_sums(&data).unwrap();
        let (rs, rsq) = crate::ops::cpu::sums(&data, crate::ops::cpu::Exec::Serial);
        assert!(approx_eq(&s, &rs, CROSS_TOLERANCE));
        assert!(approx_eq(&sq, &rsq, CROSS_TOLERANCE));
    }
}
