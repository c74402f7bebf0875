use std::sync::mpsc;

use wgpu::util::DeviceExt;

use super::{GpuContext, GpuError};
use crate::Decimal;
use crate::ops::cpu::padded_len;

const ELEMENT_BYTES: u64 = size_of::<Decimal>() as u64;

/// A dataset resident on the device, padded with `+∞` to a power of two.
///
/// The buffer is destroyed when the value is dropped, so every exit path of a
/// computation frees the device memory.
#[derive(Debug)]
pub struct DeviceDataset {
    buffer: wgpu::Buffer,
    len: usize,
    padded: usize,
}

impl DeviceDataset {
    /// Uploads `data` padded to [`padded_len`] elements.
    ///
    /// # Errors
    ///
    /// [`GpuError::TooLarge`] when the padded buffer exceeds the device's
    /// storage binding limit.
    pub fn upload(ctx: &GpuContext, data: &[Decimal]) -> Result<Self, GpuError> {
        let padded = padded_len(data.len().max(1));
        ctx.check_size(padded as u64 * ELEMENT_BYTES)?;

        let mut host = Vec::with_capacity(padded);
        host.extend_from_slice(data);
        host.resize(padded, Decimal::INFINITY);

        log::debug!("uploading {} elements (padded to {padded})", data.len());
        let buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dataset"),
            contents: bytemuck::cast_slice(&host),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
        });

        Ok(Self { buffer, len: data.len(), padded })
    }

    /// Number of real (unpadded) elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the dataset has no real elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length of the device buffer in elements, a power of two.
    #[must_use]
    pub const fn padded_len(&self) -> usize {
        self.padded
    }

    /// The device buffer.
    #[must_use]
    pub const fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Copies the first [`len`](Self::len) elements back to the host.
    ///
    /// # Errors
    ///
    /// When the device cannot be polled or the staging buffer cannot be mapped.
    pub fn read(&self, ctx: &GpuContext) -> Result<Vec<Decimal>, GpuError> {
        read_buffer(ctx, &self.buffer, self.len)
    }
}

impl Drop for DeviceDataset {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

/// Creates a zeroed storage buffer of `len` elements that can be read back.
pub(crate) fn output_buffer(ctx: &GpuContext, label: &str, len: usize) -> Result<wgpu::Buffer, GpuError> {
    let size = len.max(1) as u64 * ELEMENT_BYTES;
    ctx.check_size(size)?;
    Ok(ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    }))
}

/// Copies the first `len` elements of `src` to the host.
///
/// Submits a copy into a staging buffer, waits for the device, then maps it.
pub(crate) fn read_buffer(ctx: &GpuContext, src: &wgpu::Buffer, len: usize) -> Result<Vec<Decimal>, GpuError> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let size = len as u64 * ELEMENT_BYTES;

    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback_encoder"),
    });
    encoder.copy_buffer_to_buffer(src, 0, &staging, 0, size);
    ctx.queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        // the receiver outlives the poll below
        let _ = tx.send(result);
    });
    ctx.wait()?;

    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(GpuError::Map(e)),
        Err(_) => return Err(GpuError::Map(wgpu::BufferAsyncError)),
    }

    let out = {
        let view = slice.get_mapped_range();
        bytemuck::try_cast_slice::<u8, Decimal>(&view)
            .map(<[Decimal]>::to_vec)
            .map_err(GpuError::Readback)?
    };
    staging.unmap();
    staging.destroy();

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::wgpu::tests::context;

    #[test]
    fn upload_pads_and_reads_back_real_elements() {
        let Some(ctx) = context() else { return };
        let data = [3.0, 1.0, 2.0];
        let ds = DeviceDataset::upload(&ctx, &data).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.padded_len(), 4);
        assert_eq!(ds.read(&ctx).unwrap(), data);
    }

    #[test]
    fn padding_is_positive_infinity() {
        let Some(ctx) = context() else { return };
        let ds = DeviceDataset::upload(&ctx, &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let all = read_buffer(&ctx, ds.buffer(), ds.padded_len()).unwrap();
        assert_eq!(all.len(), 8);
        assert!(all[5..].iter().all(|x| *x == Decimal::INFINITY));
    }
}
