// SPDX-License-Identifier: AGPL-3.0-only

//! Boundary applicator: prescribed displacement, clamps and body forces.
//!
//! Particles are tagged once at setup ([`BoundaryTag`]). Every step the
//! applicator queries the load schedule exactly once, moves
//! displacement-tagged particles along the load axis, zeroes clamped
//! particles, then hands the displacement array to the optional user
//! callback. Force-tagged particles receive their external force after the
//! kernel has filled the bond forces.

use crate::error::{PeridynError, Result};
use crate::pd::config::{LoadSchedule, SimConfig};
use crate::pd::geometry::BoundaryTag;
use crate::pd::ramp::{RampController, RampState};
use serde::{Deserialize, Serialize};

/// When the applicator runs relative to the force kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryOrder {
    /// Boundary → kernel → integrate: the kernel sees this step's load.
    #[default]
    BeforeForce,
    /// Kernel → integrate → boundary: constraints win over the physical
    /// update, and the kernel sees the previous step's boundary state.
    AfterIntegration,
}

/// User boundary callback: `(displacement, step, rate)`.
pub type BoundaryCallback = dyn FnMut(&mut [f64], usize, f64) + Send;

#[derive(Clone, Debug)]
enum Schedule {
    Constant(f64),
    Ramp(RampController),
}

/// Applies the boundary tags and load schedule to the particle arrays.
pub struct BoundaryApplicator {
    tags: Vec<BoundaryTag>,
    dim: usize,
    load_axis: usize,
    force_magnitude: f64,
    schedule: Schedule,
    applied: f64,
    last_rate: f64,
    last_step: usize,
    callback: Option<Box<BoundaryCallback>>,
}

impl std::fmt::Debug for BoundaryApplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryApplicator")
            .field("particles", &self.tags.len())
            .field("load_axis", &self.load_axis)
            .field("schedule", &self.schedule)
            .field("applied", &self.applied)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl BoundaryApplicator {
    /// Build the applicator; a ramp schedule is sized against `config.steps`.
    pub fn new(
        tags: Vec<BoundaryTag>,
        config: &SimConfig,
        callback: Option<Box<BoundaryCallback>>,
    ) -> Result<Self> {
        let loading = &config.loading;
        let schedule = match loading.schedule {
            LoadSchedule::Constant { rate } => Schedule::Constant(rate),
            LoadSchedule::Ramp {
                build_displacement,
                max_displacement_rate,
                max_displacement,
            } => Schedule::Ramp(RampController::new(
                build_displacement,
                max_displacement_rate,
                max_displacement,
                config.steps,
            )?),
        };
        if let Some(i) = tags.iter().position(|t| match t {
            BoundaryTag::Force(signs) => signs.iter().any(|s| !(-1..=1).contains(s)),
            _ => false,
        }) {
            return Err(PeridynError::InvalidConfig(format!(
                "particle {i}: force tag signs must be -1, 0 or +1"
            )));
        }
        let (negative, positive, clamped, forced) = tags.iter().fold((0, 0, 0, 0), |acc, t| match t {
            BoundaryTag::DisplacementNegative => (acc.0 + 1, acc.1, acc.2, acc.3),
            BoundaryTag::DisplacementPositive => (acc.0, acc.1 + 1, acc.2, acc.3),
            BoundaryTag::Clamped => (acc.0, acc.1, acc.2 + 1, acc.3),
            BoundaryTag::Force(_) => (acc.0, acc.1, acc.2, acc.3 + 1),
            BoundaryTag::Free => acc,
        });
        log::info!(
            "boundary: {negative} pulled −, {positive} pulled +, {clamped} clamped, {forced} force-loaded"
        );
        Ok(Self {
            tags,
            dim: config.dimensions,
            load_axis: loading.load_axis,
            force_magnitude: loading.force_magnitude,
            schedule,
            applied: 0.0,
            last_rate: 0.0,
            last_step: 0,
            callback,
        })
    }

    /// Per-particle tags.
    #[must_use]
    pub fn tags(&self) -> &[BoundaryTag] {
        &self.tags
    }

    /// Particles the integrator must leave alone.
    #[must_use]
    pub fn pinned(&self) -> Vec<bool> {
        self.tags.iter().map(|t| t.is_prescribed()).collect()
    }

    /// Cumulative displacement applied along the load axis.
    #[must_use]
    pub const fn applied_displacement(&self) -> f64 {
        self.applied
    }

    /// Rate returned for the most recent step.
    #[must_use]
    pub const fn last_rate(&self) -> f64 {
        self.last_rate
    }

    /// Ramp state, when the schedule is a ramp.
    #[must_use]
    pub fn ramp_state(&self) -> Option<&RampState> {
        match &self.schedule {
            Schedule::Ramp(r) => Some(r.state()),
            Schedule::Constant(_) => None,
        }
    }

    /// Fraction of full load reached, in [0, 1]; always 1 for a constant rate.
    #[must_use]
    pub fn load_factor(&self) -> f64 {
        match &self.schedule {
            Schedule::Constant(_) => 1.0,
            Schedule::Ramp(r) => (self.applied / r.max_displacement()).clamp(0.0, 1.0),
        }
    }

    /// Advance the schedule to `step` and return its rate. Called once per step.
    fn advance(&mut self, step: usize) -> f64 {
        let rate = match &mut self.schedule {
            Schedule::Constant(rate) => *rate,
            Schedule::Ramp(ramp) => ramp.rate(step),
        };
        self.applied += rate;
        self.last_rate = rate;
        self.last_step = step;
        rate
    }

    /// Replay the schedule through `step` without touching particle arrays,
    /// so a model resumed from a checkpoint continues the same load curve.
    pub fn fast_forward(&mut self, step: usize) {
        for s in (self.last_step + 1)..=step {
            self.advance(s);
        }
    }

    /// Apply prescribed displacement and clamps for `step`, then the user callback.
    pub fn apply_displacement(&mut self, step: usize, displacement: &mut [f64], velocity: &mut [f64]) {
        let rate = self.advance(step);
        let dim = self.dim;
        for (i, tag) in self.tags.iter().enumerate() {
            let u = &mut displacement[i * dim..(i + 1) * dim];
            let v = &mut velocity[i * dim..(i + 1) * dim];
            match *tag {
                BoundaryTag::DisplacementNegative | BoundaryTag::DisplacementPositive => {
                    let sign = tag.displacement_sign().unwrap_or(0.0);
                    for k in 0..dim {
                        if k == self.load_axis {
                            u[k] += sign * rate;
                        } else {
                            u[k] = 0.0;
                        }
                        v[k] = 0.0;
                    }
                }
                BoundaryTag::Clamped => {
                    u.iter_mut().for_each(|x| *x = 0.0);
                    v.iter_mut().for_each(|x| *x = 0.0);
                }
                BoundaryTag::Free | BoundaryTag::Force(_) => {}
            }
        }
        if let Some(callback) = self.callback.as_mut() {
            callback(displacement, step, rate);
        }
    }

    /// Add external forces of force-tagged particles: `sign · F · V_i · load_factor`.
    pub fn apply_forces(&self, force: &mut [f64], volumes: &[f64]) {
        if self.force_magnitude == 0.0 {
            return;
        }
        let scale = self.force_magnitude * self.load_factor();
        let dim = self.dim;
        for (i, tag) in self.tags.iter().enumerate() {
            if let BoundaryTag::Force(signs) = tag {
                for k in 0..dim {
                    force[i * dim + k] += f64::from(signs[k]) * scale * volumes[i];
                }
            }
        }
    }
}
