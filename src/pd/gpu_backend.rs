// SPDX-License-Identifier: AGPL-3.0-only

//! wgpu f64 backend.
//!
//! Topology is built on the host (same scan as the sequential backend,
//! so bond ids match) and uploaded once. Each step uploads displacement
//! and the host broken flags, dispatches the per-particle gather kernel,
//! and reads forces and flags back. Flags set on the device are folded
//! into the host topology with the same compare-and-set the CPU paths
//! use, so breakage stays irreversible and counted once. Integration runs
//! on the host.

use crate::error::Result;
use crate::gpu::GpuF64;
use crate::pd::backend::{Backend, BackendKind, StepArrays};
use crate::pd::config::SimConfig;
use crate::pd::geometry::Geometry;
use crate::pd::integrator::{EulerStep, IntegratorView};
use crate::pd::kernel;
use crate::pd::topology::{BondTopology, BondTypeFn, CrackPredicate};

/// WGSL source of the bond force kernel.
pub const SHADER_BOND_FORCE: &str = include_str!("shaders/bond_force_f64.wgsl");

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ForceParams {
    n_particles: u32,
    dim: u32,
    neighbors_base: u32,
    bonds_base: u32,
}

/// Device-resident copy of one topology.
struct Resident {
    n_particles: usize,
    n_bonds: usize,
    dim: usize,
    displacement: wgpu::Buffer,
    broken: wgpu::Buffer,
    force: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    // Bound but never touched from the host after upload.
    _static: [wgpu::Buffer; 5],
}

impl Resident {
    fn upload(
        gpu: &GpuF64,
        pipeline: &wgpu::ComputePipeline,
        topology: &BondTopology,
        geometry: &Geometry,
    ) -> Self {
        let n = geometry.len();
        let dim = geometry.dim();
        let offsets = topology.family_offsets();
        let slots = offsets[n];

        let mut csr: Vec<u32> = Vec::with_capacity(n + 1 + 2 * slots);
        csr.extend(offsets.iter().map(|&o| o as u32));
        for i in 0..n {
            csr.extend_from_slice(topology.family(i));
        }
        for i in 0..n {
            csr.extend_from_slice(topology.family_bond_ids(i));
        }
        let bond_params: Vec<f64> = topology
            .bonds()
            .iter()
            .flat_map(|b| [b.reference_length, b.stiffness, b.critical_stretch])
            .collect();
        let params = ForceParams {
            n_particles: n as u32,
            dim: dim as u32,
            neighbors_base: (n + 1) as u32,
            bonds_base: (n + 1 + slots) as u32,
        };

        let coords = gpu.create_f64_buffer(geometry.coords(), "pd coords");
        let volumes = gpu.create_f64_buffer(geometry.volumes(), "pd volumes");
        let displacement = gpu.create_f64_output_buffer(n * dim, "pd displacement");
        let csr = gpu.create_u32_buffer(&csr, "pd families");
        let bond_params = if bond_params.is_empty() {
            gpu.create_f64_output_buffer(1, "pd bond params")
        } else {
            gpu.create_f64_buffer(&bond_params, "pd bond params")
        };
        let broken = gpu.create_u32_buffer(&vec![0u32; topology.bond_count()], "pd broken");
        let force = gpu.create_f64_output_buffer(n * dim, "pd force");
        let uniform = gpu.create_uniform_buffer(&params, "pd force params");

        let bind_group = gpu.create_bind_group(
            pipeline,
            &[
                &coords,
                &volumes,
                &displacement,
                &csr,
                &bond_params,
                &broken,
                &force,
                &uniform,
            ],
        );
        log::debug!(
            "gpu: uploaded {n} particles, {} bonds, {slots} family slots",
            topology.bond_count()
        );
        Self {
            n_particles: n,
            n_bonds: topology.bond_count(),
            dim,
            displacement,
            broken,
            force,
            bind_group,
            _static: [coords, volumes, csr, bond_params, uniform],
        }
    }

    fn matches(&self, topology: &BondTopology, geometry: &Geometry) -> bool {
        self.n_particles == geometry.len()
            && self.dim == geometry.dim()
            && self.n_bonds == topology.bond_count()
    }
}

/// Accelerated backend on an f64-capable GPU.
pub struct GpuBackend {
    gpu: GpuF64,
    pipeline: wgpu::ComputePipeline,
    resident: Option<Resident>,
}

impl std::fmt::Debug for GpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBackend")
            .field("adapter", &self.gpu.adapter_name)
            .field("resident", &self.resident.is_some())
            .finish()
    }
}

impl GpuBackend {
    /// Open the device and compile the force kernel.
    ///
    /// # Errors
    ///
    /// [`crate::error::PeridynError::BackendUnavailable`] without an f64 adapter.
    pub fn new() -> Result<Self> {
        let gpu = GpuF64::new_blocking()?;
        let pipeline = gpu.create_pipeline(SHADER_BOND_FORCE, "pd bond force f64");
        Ok(Self {
            gpu,
            pipeline,
            resident: None,
        })
    }

    /// Name of the adapter in use.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.gpu.adapter_name
    }

    fn ensure_resident(&mut self, topology: &BondTopology, geometry: &Geometry) {
        let stale = self
            .resident
            .as_ref()
            .map_or(true, |r| !r.matches(topology, geometry));
        if stale {
            self.resident = Some(Resident::upload(&self.gpu, &self.pipeline, topology, geometry));
        }
    }
}

impl Backend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn build_topology(
        &mut self,
        geometry: &Geometry,
        config: &SimConfig,
        crack: Option<&CrackPredicate>,
        bond_type: Option<&BondTypeFn>,
    ) -> Result<BondTopology> {
        let topology = BondTopology::build(geometry, config, crack, bond_type)?;
        self.resident = Some(Resident::upload(&self.gpu, &self.pipeline, &topology, geometry));
        Ok(topology)
    }

    fn compute_step(
        &mut self,
        topology: &BondTopology,
        geometry: &Geometry,
        arrays: StepArrays<'_>,
    ) -> Result<usize> {
        self.ensure_resident(topology, geometry);
        let (gpu, pipeline) = (&self.gpu, &self.pipeline);
        let Some(resident) = self.resident.as_ref() else {
            return Ok(0);
        };

        let host_flags: Vec<u32> = (0..topology.bond_count())
            .map(|b| u32::from(topology.is_broken(b)))
            .collect();
        gpu.upload_f64(&resident.displacement, arrays.displacement);
        gpu.upload_u32(&resident.broken, &host_flags);

        let mut encoder = gpu.begin_encoder("pd step");
        GpuF64::encode_pass(
            &mut encoder,
            pipeline,
            &resident.bind_group,
            resident.n_particles as u32,
        );
        gpu.submit_encoder(encoder);

        let force = gpu.read_back_f64(&resident.force, resident.n_particles * resident.dim)?;
        arrays.force.copy_from_slice(&force);
        let device_flags = gpu.read_back_u32(&resident.broken, resident.n_bonds)?;
        let newly_broken = device_flags
            .iter()
            .enumerate()
            .filter(|&(b, &flag)| flag != 0 && topology.break_bond(b))
            .count();

        kernel::damage(topology, arrays.damage);
        Ok(newly_broken)
    }

    fn integrate(&mut self, step: EulerStep, view: IntegratorView<'_>) {
        step.apply(view);
    }
}
