// SPDX-License-Identifier: AGPL-3.0-only

//! Observables: damage statistics, energies, load history, symmetry.
//!
//! Bond strain energy `W = ½ c s² L V_i V_j` is the potential whose
//! gradient is the kernel's bond force, so finite differences of
//! [`strain_energy`] check the force kernel independently.

use crate::error::{PeridynError, Result};
use crate::pd::geometry::Geometry;
use crate::pd::topology::BondTopology;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One point of the load-displacement curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadRecord {
    pub step: usize,
    /// Mean load-axis displacement of the tip particles.
    pub tip_displacement: f64,
    /// Summed load-axis force (bond plus external) on the tip particles.
    pub tip_force: f64,
}

/// Summary of a damage field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageStats {
    pub max: f64,
    pub mean: f64,
    /// Particles with damage > 0.
    pub damaged: usize,
}

/// Max, mean, and count of damaged particles.
#[must_use]
pub fn damage_stats(damage: &[f64]) -> DamageStats {
    if damage.is_empty() {
        return DamageStats::default();
    }
    DamageStats {
        max: damage.iter().copied().fold(0.0, f64::max),
        mean: damage.iter().sum::<f64>() / damage.len() as f64,
        damaged: damage.iter().filter(|&&d| d > 0.0).count(),
    }
}

/// Total elastic energy stored in live bonds.
#[must_use]
pub fn strain_energy(topology: &BondTopology, geometry: &Geometry, displacement: &[f64]) -> f64 {
    let dim = geometry.dim();
    let volumes = geometry.volumes();
    topology
        .bonds()
        .iter()
        .enumerate()
        .filter(|(b, _)| !topology.is_broken(*b))
        .map(|(_, bond)| {
            let (i, j) = (bond.i as usize, bond.j as usize);
            let (xi, xj) = (geometry.coord(i), geometry.coord(j));
            let r = (0..dim)
                .map(|k| {
                    let d = (xj[k] + displacement[j * dim + k]) - (xi[k] + displacement[i * dim + k]);
                    d * d
                })
                .sum::<f64>()
                .sqrt();
            let s = (r - bond.reference_length) / bond.reference_length;
            0.5 * bond.stiffness * s * s * bond.reference_length * volumes[i] * volumes[j]
        })
        .sum()
}

/// `Σ ½ m_i |v_i|²`.
#[must_use]
pub fn kinetic_energy(mass: &[f64], velocity: &[f64], dim: usize) -> f64 {
    mass.iter()
        .zip(velocity.chunks_exact(dim))
        .map(|(m, v)| 0.5 * m * v.iter().map(|x| x * x).sum::<f64>())
        .sum()
}

/// Largest deviation from mirror symmetry about `axis = center`.
///
/// For every particle the mirror partner (reflected reference coordinate)
/// must exist; its displacement must be the reflection of this one's.
///
/// # Errors
///
/// [`PeridynError::GeometryMismatch`] if a particle has no mirror partner.
pub fn mirror_symmetry_error(
    geometry: &Geometry,
    displacement: &[f64],
    axis: usize,
    center: f64,
) -> Result<f64> {
    let dim = geometry.dim();
    // Grid coordinates are reproduced to ~1e-15; quantize well above that.
    let quantum = 1e-9;
    let key = |x: &[f64], reflect: bool| -> Vec<i64> {
        (0..dim)
            .map(|k| {
                let v = if reflect && k == axis { 2.0 * center - x[k] } else { x[k] };
                (v / quantum).round() as i64
            })
            .collect()
    };
    let index: HashMap<Vec<i64>, usize> = (0..geometry.len())
        .map(|i| (key(geometry.coord(i), false), i))
        .collect();

    let mut worst = 0.0f64;
    for i in 0..geometry.len() {
        let j = *index.get(&key(geometry.coord(i), true)).ok_or_else(|| {
            PeridynError::GeometryMismatch(format!(
                "particle {i} has no mirror partner about axis {axis} = {center}"
            ))
        })?;
        for k in 0..dim {
            let ui = displacement[i * dim + k];
            let uj = displacement[j * dim + k];
            let err = if k == axis { ui + uj } else { ui - uj };
            worst = worst.max(err.abs());
        }
    }
    Ok(worst)
}
