// SPDX-License-Identifier: AGPL-3.0-only

//! Bond force and damage kernel in f64.
//!
//! Two variants of the same physics:
//!
//! - [`bond_forces_sequential`] walks the bond table once and applies each
//!   bond force to both endpoints (Newton's third law).
//! - [`bond_forces_parallel`] gathers per particle over its family, so
//!   each task writes only its own force slot. Both endpoints evaluate the
//!   same stretch bit-for-bit, so they agree on whether the bond breaks;
//!   the compare-and-set on the flag decides which one counts it.
//!
//! Force on i from bond (i, j): `c · s · V_i · V_j · (x_j − x_i)/|x_j − x_i|`.

use crate::pd::geometry::Geometry;
use crate::pd::topology::BondTopology;
use rayon::prelude::*;

/// Current separation vector, its length, and the bond stretch.
#[inline]
fn stretch(
    geometry: &Geometry,
    displacement: &[f64],
    i: usize,
    j: usize,
    reference_length: f64,
) -> ([f64; 3], f64, f64) {
    let dim = geometry.dim();
    let (xi, xj) = (geometry.coord(i), geometry.coord(j));
    let mut dx = [0.0; 3];
    let mut r_sq = 0.0;
    for k in 0..dim {
        dx[k] = (xj[k] + displacement[j * dim + k]) - (xi[k] + displacement[i * dim + k]);
        r_sq += dx[k] * dx[k];
    }
    let r = r_sq.sqrt();
    (dx, r, (r - reference_length) / reference_length)
}

/// Sequential bond loop. Zeroes `force` and returns the number of bonds
/// that broke during this call.
pub fn bond_forces_sequential(
    topology: &BondTopology,
    geometry: &Geometry,
    displacement: &[f64],
    force: &mut [f64],
) -> usize {
    let dim = geometry.dim();
    let volumes = geometry.volumes();
    force.iter_mut().for_each(|f| *f = 0.0);

    let mut newly_broken = 0;
    for (b, bond) in topology.bonds().iter().enumerate() {
        if topology.is_broken(b) {
            continue;
        }
        let (i, j) = (bond.i as usize, bond.j as usize);
        let (dx, r, s) = stretch(geometry, displacement, i, j, bond.reference_length);
        if s > bond.critical_stretch {
            if topology.break_bond(b) {
                newly_broken += 1;
            }
            continue;
        }
        // Fully collapsed pair has no direction; it contributes nothing.
        if r <= 0.0 {
            continue;
        }
        let scale = bond.stiffness * s * volumes[i] * volumes[j] / r;
        for k in 0..dim {
            let f = scale * dx[k];
            force[i * dim + k] += f;
            force[j * dim + k] -= f;
        }
    }
    newly_broken
}

/// Per-particle gather on the current rayon pool. Same contract as
/// [`bond_forces_sequential`]; summation order differs per particle.
pub fn bond_forces_parallel(
    topology: &BondTopology,
    geometry: &Geometry,
    displacement: &[f64],
    force: &mut [f64],
) -> usize {
    let dim = geometry.dim();
    let volumes = geometry.volumes();
    let bonds = topology.bonds();

    force
        .par_chunks_mut(dim)
        .enumerate()
        .map(|(i, fi)| {
            fi.iter_mut().for_each(|f| *f = 0.0);
            let mut newly_broken = 0;
            for (&j, &b) in topology.family(i).iter().zip(topology.family_bond_ids(i)) {
                let (j, b) = (j as usize, b as usize);
                if topology.is_broken(b) {
                    continue;
                }
                let bond = &bonds[b];
                let (dx, r, s) = stretch(geometry, displacement, i, j, bond.reference_length);
                if s > bond.critical_stretch {
                    if topology.break_bond(b) {
                        newly_broken += 1;
                    }
                    continue;
                }
                if r <= 0.0 {
                    continue;
                }
                let scale = bond.stiffness * s * volumes[i] * volumes[j] / r;
                for k in 0..dim {
                    fi[k] += scale * dx[k];
                }
            }
            newly_broken
        })
        .sum()
}

/// Damage fraction of every particle from the live broken flags.
pub fn damage(topology: &BondTopology, out: &mut [f64]) {
    for (i, d) in out.iter_mut().enumerate() {
        *d = topology.damage(i);
    }
}

/// Parallel [`damage`].
pub fn damage_parallel(topology: &BondTopology, out: &mut [f64]) {
    out.par_iter_mut()
        .enumerate()
        .for_each(|(i, d)| *d = topology.damage(i));
}
