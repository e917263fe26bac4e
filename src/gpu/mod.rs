// SPDX-License-Identifier: AGPL-3.0-only

//! wgpu device with f64 compute for the accelerated backend.
//!
//! Requests `SHADER_F64` and fails with
//! [`PeridynError::BackendUnavailable`] when the adapter lacks it, so the
//! caller can fall back to a CPU backend.
//!
//! - `adapter`: discovery and selection (`PERIDYN_GPU_ADAPTER`)
//! - `buffers`: f64/u32 buffers, upload and readback
//! - dispatch helpers live here

mod adapter;
mod buffers;

pub use adapter::{enumerate_adapters, AdapterInfo};

use crate::error::{PeridynError, Result};

/// Threads per workgroup of every peridyn compute shader.
pub const WORKGROUP_SIZE: u32 = 64;

/// GPU context with `SHADER_F64` enabled.
#[must_use]
pub struct GpuF64 {
    pub adapter_name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl std::fmt::Debug for GpuF64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuF64")
            .field("adapter_name", &self.adapter_name)
            .finish_non_exhaustive()
    }
}

impl GpuF64 {
    /// Select an adapter and open an f64 device.
    ///
    /// # Errors
    ///
    /// [`PeridynError::BackendUnavailable`] if no f64 adapter exists or
    /// device creation fails.
    pub async fn new() -> Result<Self> {
        let adapter = adapter::select_adapter()?;
        let info = adapter.get_info();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("peridyn f64 device"),
                    required_features: wgpu::Features::SHADER_F64,
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| PeridynError::BackendUnavailable(format!("device creation: {e}")))?;
        log::info!("gpu: {} ({:?}, {})", info.name, info.backend, info.driver);
        Ok(Self {
            adapter_name: info.name,
            device,
            queue,
        })
    }

    /// Blocking [`Self::new`].
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    #[must_use]
    pub const fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub const fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Compile a WGSL compute shader with entry point `main`.
    #[must_use]
    pub fn create_pipeline(&self, wgsl: &str, label: &str) -> wgpu::ComputePipeline {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &module,
                entry_point: "main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
    }

    /// Bind `buffers` to bindings 0, 1, 2, … of group 0.
    #[must_use]
    pub fn create_bind_group(
        &self,
        pipeline: &wgpu::ComputePipeline,
        buffers: &[&wgpu::Buffer],
    ) -> wgpu::BindGroup {
        let layout = pipeline.get_bind_group_layout(0);
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buf)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buf.as_entire_binding(),
            })
            .collect();
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("peridyn bind group"),
            layout: &layout,
            entries: &entries,
        })
    }

    #[must_use]
    pub fn begin_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    pub fn submit_encoder(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Record one dispatch covering `invocations` threads into `encoder`.
    pub fn encode_pass(
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        invocations: u32,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("peridyn pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        let (x, y, z) = split_workgroups(invocations.div_ceil(WORKGROUP_SIZE));
        pass.dispatch_workgroups(x, y, z);
    }
}

/// Split a workgroup count into `(x, y, 1)` when it exceeds the 65535 per-axis
/// limit. Shaders linearize with `gid.x + gid.y * num_workgroups.x * WORKGROUP_SIZE`.
#[must_use]
pub fn split_workgroups(total: u32) -> (u32, u32, u32) {
    if total <= 65_535 {
        (total.max(1), 1, 1)
    } else {
        let y = total.div_ceil(65_535);
        (total.div_ceil(y), y, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroups_fit_axis_limit() {
        assert_eq!(split_workgroups(0), (1, 1, 1));
        assert_eq!(split_workgroups(1000), (1000, 1, 1));
        let (x, y, _) = split_workgroups(200_000);
        assert!(x <= 65_535);
        assert!(u64::from(x) * u64::from(y) >= 200_000);
    }
}
