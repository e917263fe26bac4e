// SPDX-License-Identifier: AGPL-3.0-only

//! Bond-based peridynamics on f64 particle arrays.
//!
//! A body is a cloud of particles with reference coordinates and volumes.
//! Every pair closer than the horizon is joined by a bond that carries a
//! force proportional to its stretch and breaks for good once the stretch
//! exceeds the critical value. Damage is the broken fraction of each
//! particle's family.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `config` | TOML-loadable `SimConfig`, reference cases |
//! | `geometry` | Particle cloud, boundary tags, crack helpers |
//! | `celllist` | Uniform grid for horizon search |
//! | `topology` | CSR families, bond table, irreversible broken flags |
//! | `kernel` | Bond force, breakage, damage (sequential and rayon) |
//! | `integrator` | Explicit Euler, divergence check |
//! | `ramp` | Quintic displacement-rate ramp |
//! | `boundary` | Prescribed displacement, clamps, body forces |
//! | `backend` | Backend trait and CPU backends |
//! | `gpu_backend` | wgpu f64 backend (`gpu` feature) |
//! | `store` | Append-only checkpoint stores |
//! | `observables` | Damage statistics, energies, symmetry |
//! | `simulation` | Step loop, checkpoints, resume |

pub mod backend;
pub mod boundary;
pub mod celllist;
pub mod config;
pub mod geometry;
#[cfg(feature = "gpu")]
pub mod gpu_backend;
pub mod integrator;
pub mod kernel;
pub mod observables;
pub mod ramp;
pub mod simulation;
pub mod store;
pub mod topology;

pub use backend::{create_backend, Backend, BackendKind};
pub use boundary::BoundaryOrder;
pub use config::SimConfig;
pub use geometry::{BoundaryTag, Geometry};
pub use simulation::{Model, ModelCallbacks, SimulationOutcome};
pub use topology::BondTopology;
