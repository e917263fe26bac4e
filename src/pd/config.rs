// SPDX-License-Identifier: AGPL-3.0-only

//! Peridynamic model configuration.
//!
//! One `SimConfig` carries the whole configuration surface: material
//! (horizon, critical stretch, bond stiffness, density), integration (dt,
//! steps, damping), loading schedule, checkpoint interval, and backend
//! selection. Configs deserialize from TOML and are validated once,
//! before any topology is built.

use crate::error::{PeridynError, Result};
use crate::pd::backend::BackendKind;
use crate::pd::boundary::BoundaryOrder;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

/// A material constant given either once or per bond type.
///
/// In TOML: `critical_stretch = 0.005` or `critical_stretch = [0.005, 0.01]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaterialParam {
    /// Same value for every bond.
    Uniform(f64),
    /// Indexed by the bond type returned from the bond-type predicate.
    PerType(Vec<f64>),
}

impl MaterialParam {
    /// Value for a bond type, `None` if the type is out of range.
    #[must_use]
    pub fn value(&self, bond_type: usize) -> Option<f64> {
        match self {
            Self::Uniform(v) => Some(*v),
            Self::PerType(values) => values.get(bond_type).copied(),
        }
    }

    /// Number of distinct types; `None` for a uniform value.
    #[must_use]
    pub fn type_count(&self) -> Option<usize> {
        match self {
            Self::Uniform(_) => None,
            Self::PerType(values) => Some(values.len()),
        }
    }

    fn values(&self) -> &[f64] {
        match self {
            Self::Uniform(v) => std::slice::from_ref(v),
            Self::PerType(values) => values,
        }
    }
}

/// Time law of the boundary displacement rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadSchedule {
    /// Fixed displacement increment per step.
    Constant {
        /// Displacement per step (length units).
        rate: f64,
    },
    /// Quintic build-up, linear plateau, quintic ease-off.
    Ramp {
        /// Displacement covered by the two quintic phases together.
        build_displacement: f64,
        /// Rate cap, reached on the linear plateau (length per step).
        max_displacement_rate: f64,
        /// Total displacement at which the ramp eases off.
        max_displacement: f64,
    },
}

impl Default for LoadSchedule {
    fn default() -> Self {
        Self::Constant { rate: 0.0 }
    }
}

/// Boundary loading parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadingConfig {
    /// Displacement rate schedule for displacement-tagged particles.
    pub schedule: LoadSchedule,
    /// Axis along which displacement-tagged particles are driven.
    pub load_axis: usize,
    /// Force density applied to force-tagged particles at full load.
    pub force_magnitude: f64,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            schedule: LoadSchedule::default(),
            load_axis: 0,
            force_magnitude: 0.0,
        }
    }
}

/// Full simulation configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[must_use]
pub struct SimConfig {
    /// Label for logs and checkpoint provenance
    #[serde(default = "default_label")]
    pub label: String,
    /// Bond horizon radius (length units)
    pub horizon: f64,
    /// Critical stretch, scalar or per bond type
    pub critical_stretch: MaterialParam,
    /// Bond micromodulus c, scalar or per bond type
    pub bond_stiffness: MaterialParam,
    /// Spatial dimension, 2 or 3
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Mass density ρ
    #[serde(default = "default_density")]
    pub density: f64,
    /// Integrator time step
    pub dt: f64,
    /// Step budget of one `simulate` call
    pub steps: usize,
    /// Checkpoint every `write_interval` steps
    #[serde(default = "default_write_interval")]
    pub write_interval: usize,
    /// Execution backend
    #[serde(default)]
    pub backend: BackendKind,
    /// Whether boundaries are applied before the force kernel or after integration
    #[serde(default)]
    pub boundary_order: BoundaryOrder,
    /// Viscous damping coefficient (1/time); 0 disables damping
    #[serde(default)]
    pub damping: f64,
    /// Reject coincident particles instead of pre-cutting their bond
    #[serde(default)]
    pub strict_geometry: bool,
    /// Boundary loading
    #[serde(default)]
    pub loading: LoadingConfig,
}

fn default_label() -> String {
    String::from("peridynamics")
}

const fn default_dimensions() -> usize {
    2
}

const fn default_density() -> f64 {
    1.0
}

const fn default_write_interval() -> usize {
    50
}

impl SimConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| PeridynError::ConfigLoad(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PeridynError::ConfigLoad(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Number of bond types the material tables define (1 when both are uniform).
    #[must_use]
    pub fn bond_type_count(&self) -> usize {
        self.critical_stretch
            .type_count()
            .or_else(|| self.bond_stiffness.type_count())
            .unwrap_or(1)
    }

    /// Reject every configuration error before the step loop starts.
    pub fn validate(&self) -> Result<()> {
        if !(2..=3).contains(&self.dimensions) {
            return Err(PeridynError::UnsupportedDimension(self.dimensions));
        }
        positive("horizon", self.horizon)?;
        positive("dt", self.dt)?;
        positive("density", self.density)?;
        if self.steps == 0 {
            return Err(invalid("steps must be at least 1"));
        }
        if self.write_interval == 0 {
            return Err(invalid("write_interval must be at least 1"));
        }
        if !(self.damping.is_finite() && self.damping >= 0.0) {
            return Err(invalid(format!("damping must be >= 0, got {}", self.damping)));
        }

        for (name, param) in [
            ("critical_stretch", &self.critical_stretch),
            ("bond_stiffness", &self.bond_stiffness),
        ] {
            if param.values().is_empty() {
                return Err(invalid(format!("{name} needs at least one bond type")));
            }
            for &v in param.values() {
                positive(name, v)?;
            }
        }
        if let (Some(a), Some(b)) = (
            self.critical_stretch.type_count(),
            self.bond_stiffness.type_count(),
        ) {
            if a != b {
                return Err(invalid(format!(
                    "critical_stretch has {a} bond types but bond_stiffness has {b}"
                )));
            }
        }

        let loading = &self.loading;
        if loading.load_axis >= self.dimensions {
            return Err(invalid(format!(
                "load_axis {} out of range for {}D",
                loading.load_axis, self.dimensions
            )));
        }
        if !loading.force_magnitude.is_finite() {
            return Err(invalid("force_magnitude must be finite"));
        }
        match loading.schedule {
            LoadSchedule::Constant { rate } => {
                if !rate.is_finite() {
                    return Err(invalid("constant load rate must be finite"));
                }
            }
            LoadSchedule::Ramp {
                build_displacement,
                max_displacement_rate,
                max_displacement,
            } => {
                positive("build_displacement", build_displacement)?;
                positive("max_displacement_rate", max_displacement_rate)?;
                positive("max_displacement", max_displacement)?;
                if max_displacement < build_displacement {
                    return Err(invalid(format!(
                        "max_displacement {max_displacement} is below build_displacement {build_displacement}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> PeridynError {
    PeridynError::InvalidConfig(msg.into())
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be positive and finite, got {value}")))
    }
}

// ═══════════════════════════════════════════════════════════════════
// Reference cases
// ═══════════════════════════════════════════════════════════════════

/// Bond micromodulus of the reference 2D plate: c = 18·K/(π·δ⁴) with
/// K = 0.05 and δ = 0.1.
#[must_use]
pub fn reference_bond_stiffness(horizon: f64) -> f64 {
    18.0 * 0.05 / (PI * horizon.powi(4))
}

/// Symmetric pull-apart of an uncracked 2D plate.
///
/// Small enough for tests: 50 steps at a boundary rate that keeps every
/// bond well below the critical stretch.
pub fn pull_apart_2d() -> SimConfig {
    let horizon = 0.1;
    SimConfig {
        label: String::from("pull_apart_2d"),
        horizon,
        critical_stretch: MaterialParam::Uniform(0.005),
        bond_stiffness: MaterialParam::Uniform(reference_bond_stiffness(horizon)),
        dimensions: 2,
        density: 2.0,
        dt: 1e-3,
        steps: 50,
        write_interval: 10,
        backend: BackendKind::Sequential,
        boundary_order: BoundaryOrder::BeforeForce,
        damping: 0.0,
        strict_geometry: false,
        loading: LoadingConfig {
            schedule: LoadSchedule::Constant { rate: 1e-6 },
            load_axis: 0,
            force_magnitude: 0.0,
        },
    }
}

/// Pre-cracked plate pulled hard enough to break bonds.
pub fn crack_plate_2d() -> SimConfig {
    SimConfig {
        label: String::from("crack_plate_2d"),
        steps: 100,
        write_interval: 25,
        loading: LoadingConfig {
            schedule: LoadSchedule::Constant { rate: 1e-4 },
            load_axis: 0,
            force_magnitude: 0.0,
        },
        ..pull_apart_2d()
    }
}

/// Reference plate driven by the smooth ramp instead of a constant rate.
pub fn ramped_plate_2d() -> SimConfig {
    SimConfig {
        label: String::from("ramped_plate_2d"),
        steps: 400,
        write_interval: 100,
        loading: LoadingConfig {
            schedule: LoadSchedule::Ramp {
                build_displacement: 2e-4,
                max_displacement_rate: 5e-6,
                max_displacement: 1e-3,
            },
            load_axis: 0,
            force_magnitude: 0.0,
        },
        ..pull_apart_2d()
    }
}
