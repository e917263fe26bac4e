// SPDX-License-Identifier: AGPL-3.0-only

//! Storage buffer creation, upload and staged readback.

use super::GpuF64;
use crate::error::{PeridynError, Result};
use wgpu::util::DeviceExt;

impl GpuF64 {
    /// Storage buffer initialised from f64 data.
    #[must_use]
    pub fn create_f64_buffer(&self, data: &[f64], label: &str) -> wgpu::Buffer {
        self.device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// Zeroed f64 storage buffer of `count` elements.
    #[must_use]
    pub fn create_f64_output_buffer(&self, count: usize, label: &str) -> wgpu::Buffer {
        self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (count.max(1) * 8) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Storage buffer initialised from u32 data.
    #[must_use]
    pub fn create_u32_buffer(&self, data: &[u32], label: &str) -> wgpu::Buffer {
        // Zero-length bindings are invalid; pad empty inputs to one element.
        let padded = [0u32];
        let contents: &[u32] = if data.is_empty() { &padded } else { data };
        self.device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(contents),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// Uniform buffer from a `Pod` value.
    #[must_use]
    pub fn create_uniform_buffer<T: bytemuck::Pod>(&self, value: &T, label: &str) -> wgpu::Buffer {
        self.device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(value),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    /// Overwrite a buffer from offset 0.
    pub fn upload_f64(&self, buffer: &wgpu::Buffer, data: &[f64]) {
        if !data.is_empty() {
            self.queue().write_buffer(buffer, 0, bytemuck::cast_slice(data));
        }
    }

    /// Overwrite a u32 buffer from offset 0.
    pub fn upload_u32(&self, buffer: &wgpu::Buffer, data: &[u32]) {
        if !data.is_empty() {
            self.queue().write_buffer(buffer, 0, bytemuck::cast_slice(data));
        }
    }

    /// Copy `count` f64 values back to the host.
    pub fn read_back_f64(&self, buffer: &wgpu::Buffer, count: usize) -> Result<Vec<f64>> {
        self.read_back(buffer, count * 8, mapped_bytes_to_f64)
    }

    /// Copy `count` u32 values back to the host.
    pub fn read_back_u32(&self, buffer: &wgpu::Buffer, count: usize) -> Result<Vec<u32>> {
        self.read_back(buffer, count * 4, mapped_bytes_to_u32)
    }

    fn read_back<T>(
        &self,
        buffer: &wgpu::Buffer,
        size: usize,
        decode: fn(&[u8]) -> Vec<T>,
    ) -> Result<Vec<T>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let staging = self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("peridyn readback"),
            size: size as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.begin_encoder("readback");
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size as u64);
        self.submit_encoder(encoder);

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.device().poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| PeridynError::BackendUnavailable(String::from("readback channel closed")))?
            .map_err(|e| PeridynError::BackendUnavailable(format!("buffer map failed: {e}")))?;
        let data = slice.get_mapped_range();
        let values = decode(&data);
        drop(data);
        staging.unmap();
        Ok(values)
    }
}

/// Mapped bytes as f64. Mapped ranges are normally aligned, so the
/// zero-copy cast succeeds; otherwise decode element by element.
pub fn mapped_bytes_to_f64(data: &[u8]) -> Vec<f64> {
    bytemuck::try_cast_slice(data).map_or_else(
        |_| {
            data.chunks_exact(8)
                .map(|chunk| {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(chunk);
                    f64::from_le_bytes(b)
                })
                .collect()
        },
        <[f64]>::to_vec,
    )
}

/// Mapped bytes as u32, same fallback as [`mapped_bytes_to_f64`].
pub fn mapped_bytes_to_u32(data: &[u8]) -> Vec<u32> {
    bytemuck::try_cast_slice(data).map_or_else(
        |_| {
            data.chunks_exact(4)
                .map(|chunk| {
                    let mut b = [0u8; 4];
                    b.copy_from_slice(chunk);
                    u32::from_le_bytes(b)
                })
                .collect()
        },
        <[u32]>::to_vec,
    )
}
