// SPDX-License-Identifier: AGPL-3.0-only

//! peridyn: bond-based peridynamic fracture in f64
//!
//! Particles joined by bonds within a horizon; bonds break irreversibly
//! past a critical stretch and damage accumulates per particle. The same
//! step loop runs on a sequential reference path, a rayon pool, or a wgpu
//! f64 compute pipeline.
//!
//! ## Modules
//!   - `pd`: model, topology, force kernel, boundary loading, driver
//!   - `gpu`: f64 device, adapter selection, buffer helpers (`gpu` feature)
//!   - `validation`: pass/fail harness for the validation binary
//!   - `tolerances`: every numeric threshold the checks use
//!   - `error`: `PeridynError`
//!
//! ## Binaries
//!   - `validate_peridynamics`: physics and backend-parity checks, exit 0/1
//!   - `crack_plate`: configurable pre-cracked plate run with checkpoints

pub mod error;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod pd;
pub mod tolerances;
pub mod validation;
