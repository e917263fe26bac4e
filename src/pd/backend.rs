// SPDX-License-Identifier: AGPL-3.0-only

//! Execution backends.
//!
//! The driver holds a `Box<dyn Backend>` and calls the same three
//! operations whatever runs underneath:
//!
//! | Backend | Topology build | Force + damage | Integration |
//! |---------|----------------|----------------|-------------|
//! | [`SequentialBackend`] | index-ordered scan | bond loop, Newton's 3rd law | index order |
//! | [`ParallelBackend`] | rayon scan per particle | rayon per-particle gather | rayon |
//! | `GpuBackend` (`gpu` feature) | host scan + upload | WGSL per-particle gather | host |
//!
//! All three produce the same bond ordering, so broken flags and damage
//! indices line up across backends; forces differ only by summation order.

use crate::error::{PeridynError, Result};
use crate::pd::config::SimConfig;
use crate::pd::geometry::Geometry;
use crate::pd::integrator::{EulerStep, IntegratorView};
use crate::pd::kernel;
use crate::pd::topology::{BondTopology, BondTypeFn, CrackPredicate, FamilySearch};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Backend selection in the configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Reference single-threaded path.
    #[default]
    Sequential,
    /// Data-parallel CPU path on a rayon pool.
    Parallel,
    /// wgpu f64 compute path (requires the `gpu` feature and an f64 adapter).
    Gpu,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Gpu => "gpu",
        })
    }
}

/// Force, breakage and damage arrays for one kernel invocation.
pub struct StepArrays<'a> {
    pub displacement: &'a [f64],
    pub force: &'a mut [f64],
    pub damage: &'a mut [f64],
}

/// The three operations every backend provides.
pub trait Backend: Send {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Build the bond topology for `geometry`.
    fn build_topology(
        &mut self,
        geometry: &Geometry,
        config: &SimConfig,
        crack: Option<&CrackPredicate>,
        bond_type: Option<&BondTypeFn>,
    ) -> Result<BondTopology>;

    /// Bond forces, breakage and damage for the current displacement.
    /// Returns the number of bonds broken by this call.
    fn compute_step(
        &mut self,
        topology: &BondTopology,
        geometry: &Geometry,
        arrays: StepArrays<'_>,
    ) -> Result<usize>;

    /// Advance velocity and displacement by one step.
    fn integrate(&mut self, step: EulerStep, view: IntegratorView<'_>);
}

/// Construct the backend named by `kind`.
///
/// # Errors
///
/// [`PeridynError::BackendUnavailable`] when the backend cannot run here:
/// thread-pool creation failed, no f64-capable adapter, or the crate was
/// built without the `gpu` feature.
pub fn create_backend(kind: BackendKind) -> Result<Box<dyn Backend>> {
    match kind {
        BackendKind::Sequential => Ok(Box::new(SequentialBackend)),
        BackendKind::Parallel => Ok(Box::new(ParallelBackend::new(None)?)),
        BackendKind::Gpu => create_gpu_backend(),
    }
}

#[cfg(feature = "gpu")]
fn create_gpu_backend() -> Result<Box<dyn Backend>> {
    Ok(Box::new(crate::pd::gpu_backend::GpuBackend::new()?))
}

#[cfg(not(feature = "gpu"))]
fn create_gpu_backend() -> Result<Box<dyn Backend>> {
    Err(PeridynError::BackendUnavailable(String::from(
        "built without the `gpu` feature",
    )))
}

// ═══════════════════════════════════════════════════════════════════
// Sequential
// ═══════════════════════════════════════════════════════════════════

/// Reference backend: everything in index order on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialBackend;

impl Backend for SequentialBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sequential
    }

    fn build_topology(
        &mut self,
        geometry: &Geometry,
        config: &SimConfig,
        crack: Option<&CrackPredicate>,
        bond_type: Option<&BondTypeFn>,
    ) -> Result<BondTopology> {
        BondTopology::build(geometry, config, crack, bond_type)
    }

    fn compute_step(
        &mut self,
        topology: &BondTopology,
        geometry: &Geometry,
        arrays: StepArrays<'_>,
    ) -> Result<usize> {
        let broken = kernel::bond_forces_sequential(topology, geometry, arrays.displacement, arrays.force);
        kernel::damage(topology, arrays.damage);
        Ok(broken)
    }

    fn integrate(&mut self, step: EulerStep, view: IntegratorView<'_>) {
        step.apply(view);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Parallel (rayon)
// ═══════════════════════════════════════════════════════════════════

/// Data-parallel CPU backend on its own rayon pool.
pub struct ParallelBackend {
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for ParallelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelBackend")
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl ParallelBackend {
    /// Pool with `threads` workers (`None`: rayon's default, honoring
    /// `RAYON_NUM_THREADS`).
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("peridyn-{i}"));
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| PeridynError::BackendUnavailable(format!("rayon pool: {e}")))?;
        log::info!("parallel backend: {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }

    /// Worker count.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Backend for ParallelBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Parallel
    }

    fn build_topology(
        &mut self,
        geometry: &Geometry,
        config: &SimConfig,
        crack: Option<&CrackPredicate>,
        bond_type: Option<&BondTypeFn>,
    ) -> Result<BondTopology> {
        let search = FamilySearch::new(geometry, config.horizon, crack, config.strict_geometry);
        let families = self.pool.install(|| {
            (0..geometry.len())
                .into_par_iter()
                .map(|i| search.scan(i))
                .collect::<Result<Vec<_>>>()
        })?;
        BondTopology::assemble(geometry, config, families, bond_type)
    }

    fn compute_step(
        &mut self,
        topology: &BondTopology,
        geometry: &Geometry,
        arrays: StepArrays<'_>,
    ) -> Result<usize> {
        let StepArrays {
            displacement,
            force,
            damage,
        } = arrays;
        Ok(self.pool.install(|| {
            let broken = kernel::bond_forces_parallel(topology, geometry, displacement, force);
            kernel::damage_parallel(topology, damage);
            broken
        }))
    }

    fn integrate(&mut self, step: EulerStep, view: IntegratorView<'_>) {
        self.pool.install(|| step.apply_parallel(view));
    }
}
