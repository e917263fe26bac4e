// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for peridynamics setup, stepping, and persistence.
//!
//! Callers pattern-match on failure modes instead of parsing strings:
//! configuration problems are raised before the step loop starts,
//! divergence aborts the loop, and a backend fault is its own kind so a
//! caller can fall back to the sequential backend.

use thiserror::Error;

/// Errors arising from model construction, the step loop, or I/O.
#[derive(Debug, Error)]
pub enum PeridynError {
    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Only 2D and 3D models are supported.
    #[error("unsupported dimensionality {0} (expected 2 or 3)")]
    UnsupportedDimension(usize),

    /// The smooth displacement ramp cannot complete within the step budget.
    #[error(
        "displacement build-up time {build_time} exceeds the {steps} step budget; \
         increase steps, decrease build_displacement, or increase max_displacement_rate"
    )]
    BuildTimeExceeded {
        /// First build time that did not fit.
        build_time: usize,
        /// Step budget of the run.
        steps: usize,
    },

    /// Two particles share a reference coordinate (zero-length bond).
    #[error("particles {i} and {j} have zero reference separation")]
    DegenerateBond {
        /// Lower particle index.
        i: usize,
        /// Higher particle index.
        j: usize,
    },

    /// Array lengths do not agree with the particle count or dimension.
    #[error("geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// A particle reached a non-finite state.
    #[error("non-finite {quantity} on particle {particle} at step {step}")]
    Divergence {
        /// Step at which the divergence was detected.
        step: usize,
        /// Offending particle index.
        particle: usize,
        /// Which array went non-finite (`force`, `velocity`, `displacement`).
        quantity: &'static str,
    },

    /// The selected execution backend cannot run on this host.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Checkpoint store read or write failed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Configuration file could not be read or parsed.
    #[error("config load failed: {0}")]
    ConfigLoad(String),
}

impl PeridynError {
    /// Whether this error is raised before the step loop from bad input.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::UnsupportedDimension(_)
                | Self::BuildTimeExceeded { .. }
                | Self::DegenerateBond { .. }
                | Self::GeometryMismatch(_)
                | Self::ConfigLoad(_)
        )
    }

    /// Whether a caller may retry the same input on the sequential backend.
    #[must_use]
    pub const fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PeridynError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_build_time_exceeded() {
        let err = PeridynError::BuildTimeExceeded {
            build_time: 1001,
            steps: 1000,
        };
        let msg = err.to_string();
        assert!(msg.contains("1001"), "{msg}");
        assert!(msg.contains("1000 step budget"), "{msg}");
    }

    #[test]
    fn display_divergence_names_particle_and_step() {
        let err = PeridynError::Divergence {
            step: 17,
            particle: 42,
            quantity: "velocity",
        };
        assert_eq!(
            err.to_string(),
            "non-finite velocity on particle 42 at step 17"
        );
    }

    #[test]
    fn taxonomy_is_disjoint() {
        let backend = PeridynError::BackendUnavailable("no adapter".into());
        assert!(backend.is_backend_unavailable());
        assert!(!backend.is_config_error());

        let config = PeridynError::UnsupportedDimension(4);
        assert!(config.is_config_error());
        assert!(!config.is_backend_unavailable());

        let diverged = PeridynError::Divergence {
            step: 1,
            particle: 0,
            quantity: "force",
        };
        assert!(!diverged.is_config_error());
        assert!(!diverged.is_backend_unavailable());
    }

    #[test]
    fn error_trait_works() {
        let err = PeridynError::Persistence("read-only".into());
        let dyn_err: &dyn std::error::Error = &err;
        assert_eq!(dyn_err.to_string(), "persistence failure: read-only");
    }
}
