// SPDX-License-Identifier: AGPL-3.0-only

//! Explicit Euler update.
//!
//! `a = f/m − γ v`, `v += a dt`, `u += v dt`, skipping particles whose
//! degrees of freedom are prescribed by the boundary. Any non-finite force,
//! velocity or displacement afterwards is a fatal divergence.

use crate::error::{PeridynError, Result};
use rayon::prelude::*;

/// Per-run integrator constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EulerStep {
    pub dt: f64,
    /// Viscous damping γ (1/time).
    pub damping: f64,
}

/// Particle arrays the integrator advances, flat with stride `dim`.
pub struct IntegratorView<'a> {
    pub dim: usize,
    pub inv_mass: &'a [f64],
    pub pinned: &'a [bool],
    pub force: &'a [f64],
    pub velocity: &'a mut [f64],
    pub displacement: &'a mut [f64],
}

#[inline]
fn advance(p: EulerStep, inv_m: f64, f: &[f64], v: &mut [f64], u: &mut [f64]) {
    for k in 0..f.len() {
        let a = f[k] * inv_m - p.damping * v[k];
        v[k] += a * p.dt;
        u[k] += v[k] * p.dt;
    }
}

impl EulerStep {
    /// Advance every free particle in index order.
    pub fn apply(self, view: IntegratorView<'_>) {
        let dim = view.dim;
        for (i, (v, u)) in view
            .velocity
            .chunks_exact_mut(dim)
            .zip(view.displacement.chunks_exact_mut(dim))
            .enumerate()
        {
            if view.pinned[i] {
                continue;
            }
            advance(self, view.inv_mass[i], &view.force[i * dim..(i + 1) * dim], v, u);
        }
    }

    /// Rayon variant of [`Self::apply`]; per-particle arithmetic is identical.
    pub fn apply_parallel(self, view: IntegratorView<'_>) {
        let dim = view.dim;
        let (inv_mass, pinned, force) = (view.inv_mass, view.pinned, view.force);
        view.velocity
            .par_chunks_mut(dim)
            .zip(view.displacement.par_chunks_mut(dim))
            .enumerate()
            .filter(|(i, _)| !pinned[*i])
            .for_each(|(i, (v, u))| {
                advance(self, inv_mass[i], &force[i * dim..(i + 1) * dim], v, u);
            });
    }
}

/// Fail on the lowest-index particle with a non-finite value.
///
/// Force is checked first, then velocity, then displacement, so the
/// reported quantity is the earliest one in the update chain.
pub fn check_finite(
    step: usize,
    dim: usize,
    force: &[f64],
    velocity: &[f64],
    displacement: &[f64],
) -> Result<()> {
    for (quantity, values) in [
        ("force", force),
        ("velocity", velocity),
        ("displacement", displacement),
    ] {
        if let Some(idx) = values.iter().position(|x| !x.is_finite()) {
            return Err(PeridynError::Divergence {
                step,
                particle: idx / dim,
                quantity,
            });
        }
    }
    Ok(())
}
