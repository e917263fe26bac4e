// SPDX-License-Identifier: AGPL-3.0-only

//! Particle reference geometry and boundary classification.
//!
//! The engine consumes an ordered list of D-dimensional reference
//! coordinates plus one volume per particle. Coordinates are stored flat
//! with stride `dim` (`coords[i * dim + k]`), the same layout the GPU
//! buffers use.

use crate::error::{PeridynError, Result};

/// Reference geometry of a particle body.
#[derive(Clone, Debug, PartialEq)]
#[must_use]
pub struct Geometry {
    dim: usize,
    coords: Vec<f64>,
    volumes: Vec<f64>,
}

impl Geometry {
    /// Wrap flat coordinates (`n * dim`) and volumes (`n`).
    pub fn new(dim: usize, coords: Vec<f64>, volumes: Vec<f64>) -> Result<Self> {
        if !(2..=3).contains(&dim) {
            return Err(PeridynError::UnsupportedDimension(dim));
        }
        if coords.len() != volumes.len() * dim {
            return Err(PeridynError::GeometryMismatch(format!(
                "{} coordinates for {} volumes in {dim}D",
                coords.len(),
                volumes.len()
            )));
        }
        if let Some(i) = coords.iter().position(|c| !c.is_finite()) {
            return Err(PeridynError::GeometryMismatch(format!(
                "non-finite coordinate on particle {}",
                i / dim
            )));
        }
        if let Some(i) = volumes.iter().position(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(PeridynError::GeometryMismatch(format!(
                "particle {i} has non-positive volume {}",
                volumes[i]
            )));
        }
        Ok(Self {
            dim,
            coords,
            volumes,
        })
    }

    /// Cell-centred regular grid filling `[0, extent[k]]` on each axis.
    ///
    /// Each particle owns one `spacing^dim` cell. Particle order is x-fastest.
    pub fn rectangular_grid(extent: &[f64], spacing: f64) -> Result<Self> {
        let dim = extent.len();
        if !(2..=3).contains(&dim) {
            return Err(PeridynError::UnsupportedDimension(dim));
        }
        if !(spacing.is_finite() && spacing > 0.0) {
            return Err(PeridynError::InvalidConfig(format!(
                "grid spacing must be positive, got {spacing}"
            )));
        }
        let counts: Vec<usize> = extent
            .iter()
            .map(|&e| (e / spacing).round().max(1.0) as usize)
            .collect();
        let n: usize = counts.iter().product();
        let mut coords = Vec::with_capacity(n * dim);
        let nz = if dim == 3 { counts[2] } else { 1 };
        for iz in 0..nz {
            for iy in 0..counts.get(1).copied().unwrap_or(1) {
                for ix in 0..counts[0] {
                    coords.push((ix as f64 + 0.5) * spacing);
                    coords.push((iy as f64 + 0.5) * spacing);
                    if dim == 3 {
                        coords.push((iz as f64 + 0.5) * spacing);
                    }
                }
            }
        }
        let volumes = vec![spacing.powi(dim as i32); n];
        Self::new(dim, coords, volumes)
    }

    /// Spatial dimension.
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Number of particles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    /// Whether the body has no particles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Reference coordinate of particle `i`.
    #[must_use]
    pub fn coord(&self, i: usize) -> &[f64] {
        &self.coords[i * self.dim..(i + 1) * self.dim]
    }

    /// Flat reference coordinates.
    #[must_use]
    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    /// Per-particle volumes.
    #[must_use]
    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    /// Axis-aligned bounding box as (min, max), each of length `dim`.
    #[must_use]
    pub fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let mut lo = vec![f64::INFINITY; self.dim];
        let mut hi = vec![f64::NEG_INFINITY; self.dim];
        for p in self.coords.chunks_exact(self.dim) {
            for k in 0..self.dim {
                lo[k] = lo[k].min(p[k]);
                hi[k] = hi[k].max(p[k]);
            }
        }
        (lo, hi)
    }
}

/// Boundary classification of one particle, fixed at setup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoundaryTag {
    /// No boundary condition.
    #[default]
    Free,
    /// Displacement-loaded in the negative load-axis direction.
    DisplacementNegative,
    /// Displacement-loaded in the positive load-axis direction.
    DisplacementPositive,
    /// Body force per axis: -1, 0 (none) or +1. Unused axes are ignored.
    Force([i8; 3]),
    /// Displacement and velocity held at zero.
    Clamped,
}

impl BoundaryTag {
    /// Whether every degree of freedom of the particle is prescribed.
    #[must_use]
    pub const fn is_prescribed(self) -> bool {
        matches!(
            self,
            Self::DisplacementNegative | Self::DisplacementPositive | Self::Clamped
        )
    }

    /// Load-axis direction for displacement-loaded particles.
    #[must_use]
    pub const fn displacement_sign(self) -> Option<f64> {
        match self {
            Self::DisplacementNegative => Some(-1.0),
            Self::DisplacementPositive => Some(1.0),
            _ => None,
        }
    }
}

/// Classify every particle once with a user predicate.
#[must_use]
pub fn classify<F>(geometry: &Geometry, mut is_boundary: F) -> Vec<BoundaryTag>
where
    F: FnMut(&[f64]) -> BoundaryTag,
{
    (0..geometry.len())
        .map(|i| is_boundary(geometry.coord(i)))
        .collect()
}

/// Left/right displacement bands used by the pull-apart scenarios:
/// particles within `band` of the low end of axis 0 are pulled negative,
/// those within `band` of `length` positive.
pub fn pull_apart_tags(length: f64, band: f64) -> impl Fn(&[f64]) -> BoundaryTag {
    move |x: &[f64]| {
        if x[0] < band {
            BoundaryTag::DisplacementNegative
        } else if x[0] > length - band {
            BoundaryTag::DisplacementPositive
        } else {
            BoundaryTag::Free
        }
    }
}

/// Straight vertical crack at `x = x_crack` spanning `y ∈ (y_lo, y_hi)`.
///
/// A pair is cut when the segment between the two reference points
/// crosses the crack line inside the crack's span. The small offset puts
/// a column of particles sitting exactly on the line on one side.
pub fn vertical_crack(x_crack: f64, y_lo: f64, y_hi: f64) -> impl Fn(&[f64], &[f64]) -> bool {
    let line = x_crack + 1e-6;
    move |a: &[f64], b: &[f64]| {
        let (p1, p2) = if a[0] > b[0] { (b, a) } else { (a, b) };
        if !(p1[0] < line && p2[0] > line) {
            return false;
        }
        let slope = (p2[1] - p1[1]) / (p2[0] - p1[0]);
        let height = p1[1] + slope * (x_crack - p1[0]);
        height > y_lo && height < y_hi
    }
}
