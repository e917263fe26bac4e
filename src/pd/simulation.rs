// SPDX-License-Identifier: AGPL-3.0-only

//! Simulation driver.
//!
//! One step, strictly after the previous one has finished:
//!
//!   1. boundary displacement (if `BoundaryOrder::BeforeForce`)
//!   2. bond forces, breakage, damage   (backend)
//!   3. external forces on force-tagged particles
//!   4. explicit Euler                  (backend)
//!   5. boundary displacement (if `BoundaryOrder::AfterIntegration`)
//!   6. divergence check
//!   7. checkpoint + load record every `write_interval` steps
//!
//! The driver owns all particle arrays; backends only see borrowed views.

use crate::error::{PeridynError, Result};
use crate::pd::backend::{create_backend, Backend, BackendKind, StepArrays};
use crate::pd::boundary::{BoundaryApplicator, BoundaryCallback, BoundaryOrder};
use crate::pd::config::SimConfig;
use crate::pd::geometry::{classify, BoundaryTag, Geometry};
use crate::pd::integrator::{check_finite, EulerStep, IntegratorView};
use crate::pd::kernel;
use crate::pd::observables::LoadRecord;
use crate::pd::store::{checkpoint_key, ArrayStore};
use crate::pd::topology::{BondTopology, BondTypeFn, CrackPredicate};
use std::time::Instant;

/// Boundary classification of one reference coordinate.
pub type ClassifyFn = dyn Fn(&[f64]) -> BoundaryTag + Send + Sync;

/// Marks particles whose load and displacement are tracked.
pub type TipPredicate = dyn Fn(&[f64]) -> bool + Send + Sync;

/// Late-bound behavior injected at model construction.
#[derive(Default)]
pub struct ModelCallbacks {
    crack: Option<Box<CrackPredicate>>,
    bond_type: Option<Box<BondTypeFn>>,
    classify: Option<Box<ClassifyFn>>,
    tip: Option<Box<TipPredicate>>,
    boundary: Option<Box<BoundaryCallback>>,
}

impl ModelCallbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial crack: pairs for which `cut(X_i, X_j)` is true never bond.
    #[must_use]
    pub fn with_crack(mut self, cut: impl Fn(&[f64], &[f64]) -> bool + Send + Sync + 'static) -> Self {
        self.crack = Some(Box::new(cut));
        self
    }

    /// Bond type used to index per-type material tables.
    #[must_use]
    pub fn with_bond_type(
        mut self,
        bond_type: impl Fn(&[f64], &[f64]) -> usize + Send + Sync + 'static,
    ) -> Self {
        self.bond_type = Some(Box::new(bond_type));
        self
    }

    /// Boundary tag per reference coordinate (default: all free).
    #[must_use]
    pub fn with_classifier(
        mut self,
        classify: impl Fn(&[f64]) -> BoundaryTag + Send + Sync + 'static,
    ) -> Self {
        self.classify = Some(Box::new(classify));
        self
    }

    /// Tip particles for the load-displacement record.
    #[must_use]
    pub fn with_tip(mut self, tip: impl Fn(&[f64]) -> bool + Send + Sync + 'static) -> Self {
        self.tip = Some(Box::new(tip));
        self
    }

    /// Per-step callback `(displacement, step, rate)`, run after the tag logic.
    #[must_use]
    pub fn with_boundary_callback(
        mut self,
        callback: impl FnMut(&mut [f64], usize, f64) + Send + 'static,
    ) -> Self {
        self.boundary = Some(Box::new(callback));
        self
    }
}

/// Mutable per-step state, owned by the driver.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationState {
    /// Last completed step (0 before the first).
    pub step: usize,
    pub dt: f64,
    pub displacement: Vec<f64>,
    pub velocity: Vec<f64>,
    pub force: Vec<f64>,
    pub damage: Vec<f64>,
}

impl SimulationState {
    fn zeroed(n: usize, dim: usize, dt: f64) -> Self {
        Self {
            step: 0,
            dt,
            displacement: vec![0.0; n * dim],
            velocity: vec![0.0; n * dim],
            force: vec![0.0; n * dim],
            damage: vec![0.0; n],
        }
    }
}

/// Result of one [`Model::simulate`] call.
#[derive(Clone, Debug)]
pub struct SimulationOutcome {
    pub displacement: Vec<f64>,
    pub damage: Vec<f64>,
    pub force: Vec<f64>,
    /// Load records taken at the checkpoint steps of this call.
    pub load_history: Vec<LoadRecord>,
    /// Broken bonds in the topology at the end of the call.
    pub broken_bonds: usize,
    /// Bonds broken during this call.
    pub newly_broken: usize,
    pub first_step: usize,
    pub last_step: usize,
    pub wall_time_s: f64,
    pub steps_per_sec: f64,
}

/// A peridynamic body ready to step.
pub struct Model {
    config: SimConfig,
    geometry: Geometry,
    topology: BondTopology,
    backend: Box<dyn Backend>,
    boundary: BoundaryApplicator,
    mass: Vec<f64>,
    inv_mass: Vec<f64>,
    pinned: Vec<bool>,
    tip: Vec<usize>,
    state: SimulationState,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("label", &self.config.label)
            .field("particles", &self.geometry.len())
            .field("bonds", &self.topology.bond_count())
            .field("backend", &self.backend.kind())
            .field("step", &self.state.step)
            .finish()
    }
}

impl Model {
    /// Validate `config`, create its backend, and build the topology.
    pub fn new(config: SimConfig, geometry: Geometry, callbacks: ModelCallbacks) -> Result<Self> {
        config.validate()?;
        let backend = create_backend(config.backend)?;
        Self::with_backend(config, geometry, callbacks, backend)
    }

    /// Same as [`Self::new`] with an explicit backend (the config's
    /// `backend` field is ignored).
    pub fn with_backend(
        config: SimConfig,
        geometry: Geometry,
        callbacks: ModelCallbacks,
        mut backend: Box<dyn Backend>,
    ) -> Result<Self> {
        config.validate()?;
        if geometry.dim() != config.dimensions {
            return Err(PeridynError::GeometryMismatch(format!(
                "geometry is {}D but config.dimensions = {}",
                geometry.dim(),
                config.dimensions
            )));
        }
        let t_build = Instant::now();
        let topology = backend.build_topology(
            &geometry,
            &config,
            callbacks.crack.as_deref(),
            callbacks.bond_type.as_deref(),
        )?;
        log::info!(
            "{}: topology built in {:.3}s on {} backend",
            config.label,
            t_build.elapsed().as_secs_f64(),
            backend.kind()
        );

        let tags: Vec<BoundaryTag> = match &callbacks.classify {
            Some(is_boundary) => classify(&geometry, |x| is_boundary(x)),
            None => vec![BoundaryTag::Free; geometry.len()],
        };
        let boundary = BoundaryApplicator::new(tags, &config, callbacks.boundary)?;
        let pinned = boundary.pinned();
        let tip: Vec<usize> = match &callbacks.tip {
            Some(is_tip) => (0..geometry.len()).filter(|&i| is_tip(geometry.coord(i))).collect(),
            None => Vec::new(),
        };

        let mass: Vec<f64> = geometry.volumes().iter().map(|v| config.density * v).collect();
        let inv_mass = mass.iter().map(|m| 1.0 / m).collect();
        let state = SimulationState::zeroed(geometry.len(), geometry.dim(), config.dt);
        Ok(Self {
            config,
            geometry,
            topology,
            backend,
            boundary,
            mass,
            inv_mass,
            pinned,
            tip,
            state,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[must_use]
    pub const fn topology(&self) -> &BondTopology {
        &self.topology
    }

    #[must_use]
    pub const fn boundary(&self) -> &BoundaryApplicator {
        &self.boundary
    }

    #[must_use]
    pub const fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Per-particle mass `ρ V_i`.
    #[must_use]
    pub fn mass(&self) -> &[f64] {
        &self.mass
    }

    /// Indices of the tracked tip particles.
    #[must_use]
    pub fn tip_particles(&self) -> &[usize] {
        &self.tip
    }

    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Run exactly `steps` steps, numbered `current + 1 ..= current + steps`.
    ///
    /// # Errors
    ///
    /// [`PeridynError::Divergence`] aborts the loop; the state keeps the
    /// diverged values for inspection. Checkpoint write failures are only
    /// logged.
    pub fn simulate(
        &mut self,
        steps: usize,
        mut store: Option<&mut dyn ArrayStore>,
    ) -> Result<SimulationOutcome> {
        let first_step = self.state.step + 1;
        let last_step = self.state.step + steps;
        log::info!(
            "{}: steps {first_step}..={last_step}, {} particles, {} bonds, {} backend",
            self.config.label,
            self.geometry.len(),
            self.topology.bond_count(),
            self.backend.kind()
        );

        let t_start = Instant::now();
        let mut load_history = Vec::new();
        let mut newly_broken = 0;
        for step in first_step..=last_step {
            newly_broken += self.advance(step)?;
            if step % self.config.write_interval == 0 {
                if let Some(record) = self.load_record(step) {
                    load_history.push(record);
                }
                if let Some(store) = store.as_deref_mut() {
                    self.checkpoint(store, step);
                }
            }
        }

        let wall_time_s = t_start.elapsed().as_secs_f64();
        let steps_per_sec = if wall_time_s > 0.0 {
            steps as f64 / wall_time_s
        } else {
            0.0
        };
        let broken_bonds = self.topology.broken_count();
        log::info!(
            "{}: {steps} steps in {wall_time_s:.2}s ({steps_per_sec:.1} steps/s), \
             {newly_broken} bonds broke, {broken_bonds} broken in total",
            self.config.label
        );
        Ok(SimulationOutcome {
            displacement: self.state.displacement.clone(),
            damage: self.state.damage.clone(),
            force: self.state.force.clone(),
            load_history,
            broken_bonds,
            newly_broken,
            first_step,
            last_step,
            wall_time_s,
            steps_per_sec,
        })
    }

    /// One full step; returns the number of bonds broken in it.
    fn advance(&mut self, step: usize) -> Result<usize> {
        let order = self.config.boundary_order;
        let state = &mut self.state;
        if order == BoundaryOrder::BeforeForce {
            self.boundary
                .apply_displacement(step, &mut state.displacement, &mut state.velocity);
        }

        let broken = self.backend.compute_step(
            &self.topology,
            &self.geometry,
            StepArrays {
                displacement: &state.displacement,
                force: &mut state.force,
                damage: &mut state.damage,
            },
        )?;
        if broken > 0 {
            log::debug!("step {step}: {broken} bonds broke");
        }
        self.boundary.apply_forces(&mut state.force, self.geometry.volumes());

        self.backend.integrate(
            EulerStep {
                dt: state.dt,
                damping: self.config.damping,
            },
            IntegratorView {
                dim: self.geometry.dim(),
                inv_mass: &self.inv_mass,
                pinned: &self.pinned,
                force: &state.force,
                velocity: &mut state.velocity,
                displacement: &mut state.displacement,
            },
        );

        if order == BoundaryOrder::AfterIntegration {
            self.boundary
                .apply_displacement(step, &mut state.displacement, &mut state.velocity);
        }
        check_finite(
            step,
            self.geometry.dim(),
            &state.force,
            &state.velocity,
            &state.displacement,
        )?;
        state.step = step;
        Ok(broken)
    }

    /// Tip load and displacement for the current state, if tips are tracked.
    fn load_record(&self, step: usize) -> Option<LoadRecord> {
        if self.tip.is_empty() {
            return None;
        }
        let dim = self.geometry.dim();
        let axis = self.config.loading.load_axis;
        let (u_sum, f_sum) = self.tip.iter().fold((0.0, 0.0), |(u, f), &i| {
            (
                u + self.state.displacement[i * dim + axis],
                f + self.state.force[i * dim + axis],
            )
        });
        Some(LoadRecord {
            step,
            tip_displacement: u_sum / self.tip.len() as f64,
            tip_force: f_sum,
        })
    }

    /// Write the four checkpoint arrays; failures are logged, never fatal.
    fn checkpoint(&self, store: &mut dyn ArrayStore, step: usize) {
        let broken = self.topology.broken_flags();
        let arrays: [(&str, &[f64]); 4] = [
            ("displacement", &self.state.displacement),
            ("damage", &self.state.damage),
            ("velocity", &self.state.velocity),
            ("broken", &broken),
        ];
        for (name, values) in arrays {
            let key = checkpoint_key(name, step);
            match store.write(&key, values) {
                Ok(()) => log::debug!("checkpoint {key}: {} values", values.len()),
                Err(e) => log::warn!("checkpoint {key} not written: {e}"),
            }
        }
    }

    /// Resume from the checkpoint written at `step`.
    ///
    /// `Ok(false)` if any of the four arrays is absent (recompute instead).
    /// Broken flags only ever go false → true, so bonds already broken in
    /// this model stay broken.
    ///
    /// # Errors
    ///
    /// [`PeridynError::Persistence`] when an array has the wrong length, the
    /// store fails, or `step` lies behind the model's current step.
    pub fn restore_checkpoint(&mut self, store: &dyn ArrayStore, step: usize) -> Result<bool> {
        if step < self.state.step {
            return Err(PeridynError::Persistence(format!(
                "cannot restore step {step} behind current step {}",
                self.state.step
            )));
        }
        let n = self.geometry.len();
        let dim = self.geometry.dim();
        let mut arrays = Vec::with_capacity(4);
        for (name, expected) in [
            ("displacement", n * dim),
            ("velocity", n * dim),
            ("damage", n),
            ("broken", self.topology.bond_count()),
        ] {
            let key = checkpoint_key(name, step);
            let Some(values) = store.read(&key)? else {
                log::debug!("checkpoint {key} absent; nothing restored");
                return Ok(false);
            };
            if values.len() != expected {
                return Err(PeridynError::Persistence(format!(
                    "checkpoint {key} has {} values, expected {expected}",
                    values.len()
                )));
            }
            arrays.push(values);
        }
        let mut arrays = arrays.into_iter();
        let (Some(displacement), Some(velocity), Some(_damage), Some(broken)) =
            (arrays.next(), arrays.next(), arrays.next(), arrays.next())
        else {
            return Ok(false);
        };

        self.topology.restore_broken(&broken)?;
        self.state.displacement = displacement;
        self.state.velocity = velocity;
        self.state.force.iter_mut().for_each(|f| *f = 0.0);
        kernel::damage(&self.topology, &mut self.state.damage);
        self.boundary.fast_forward(step);
        self.state.step = step;
        log::info!(
            "{}: restored step {step} ({} broken bonds)",
            self.config.label,
            self.topology.broken_count()
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pd::config::pull_apart_2d;
    use crate::pd::geometry::pull_apart_tags;
    use crate::pd::store::MemoryStore;

    fn small_model() -> Model {
        let mut config = pull_apart_2d();
        config.steps = 20;
        config.write_interval = 5;
        let g = Geometry::rectangular_grid(&[0.5, 0.25], 0.05).expect("grid");
        let callbacks = ModelCallbacks::new()
            .with_classifier(pull_apart_tags(0.5, 0.1))
            .with_tip(|x: &[f64]| x[0] > 0.4);
        Model::new(config, g, callbacks).expect("model")
    }

    #[test]
    fn step_numbering_is_continuous() {
        let mut model = small_model();
        let a = model.simulate(7, None).expect("first");
        assert_eq!((a.first_step, a.last_step), (1, 7));
        let b = model.simulate(3, None).expect("second");
        assert_eq!((b.first_step, b.last_step), (8, 10));
        assert_eq!(model.state().step, 10);
        assert_eq!(b.load_history.len(), 1, "only step 10 is a checkpoint");
        assert_eq!(b.load_history[0].step, 10);
    }

    #[test]
    fn checkpoints_hold_four_arrays() {
        let mut model = small_model();
        let mut store = MemoryStore::new();
        model.simulate(10, Some(&mut store)).expect("run");
        assert_eq!(
            store.keys(),
            vec![
                "broken_10", "broken_5", "damage_10", "damage_5", "displacement_10",
                "displacement_5", "velocity_10", "velocity_5"
            ]
        );
    }

    #[test]
    fn duplicate_checkpoint_does_not_abort() {
        let mut model = small_model();
        let mut store = MemoryStore::new();
        store.write("displacement_5", &[0.0]).expect("pre-seed");
        let outcome = model.simulate(5, Some(&mut store)).expect("run continues");
        assert_eq!(outcome.last_step, 5);
        assert_eq!(store.read("displacement_5").expect("read"), Some(vec![0.0]));
        assert!(store.read("damage_5").expect("read").is_some());
    }

    #[test]
    fn divergence_is_reported_with_step() {
        let mut config = pull_apart_2d();
        config.dt = 1e300;
        let g = Geometry::rectangular_grid(&[0.5, 0.25], 0.05).expect("grid");
        let callbacks = ModelCallbacks::new().with_classifier(pull_apart_tags(0.5, 0.1));
        let mut model = Model::new(config, g, callbacks).expect("model");
        let err = model.simulate(3, None).expect_err("must diverge");
        match err {
            PeridynError::Divergence { step, quantity, .. } => {
                assert_eq!(step, 1);
                assert_eq!(quantity, "displacement");
            }
            other => panic!("unexpected {other}"),
        }
        assert_eq!(model.state().step, 0);
    }

    #[test]
    fn per_type_materials_reach_the_model() {
        use crate::pd::config::{crack_plate_2d, MaterialParam};

        let mut config = crack_plate_2d();
        let c = config.bond_stiffness.value(0).expect("uniform");
        config.bond_stiffness = MaterialParam::PerType(vec![c, 2.0 * c]);
        config.critical_stretch = MaterialParam::PerType(vec![1e-9, 1.0]);
        let g = Geometry::rectangular_grid(&[0.5, 0.25], 0.05).expect("grid");
        // Type 1 (tough) when both ends sit in the right half.
        let callbacks = ModelCallbacks::new()
            .with_classifier(pull_apart_tags(0.5, 0.1))
            .with_bond_type(|a: &[f64], b: &[f64]| usize::from(a[0] > 0.25 && b[0] > 0.25));
        let mut model = Model::new(config, g, callbacks).expect("model");

        let topo = model.topology();
        assert!(topo.bonds().iter().any(|b| b.stiffness == 2.0 * c));
        for b in topo.bonds() {
            let tough = b.critical_stretch == 1.0;
            assert_eq!(tough, b.stiffness == 2.0 * c, "bond {}-{}", b.i, b.j);
        }

        let outcome = model.simulate(10, None).expect("run");
        assert!(outcome.broken_bonds > 0, "weak bonds break");
        let topo = model.topology();
        for (id, b) in topo.bonds().iter().enumerate() {
            if b.critical_stretch == 1.0 {
                assert!(!topo.is_broken(id), "tough bond {}-{} broke", b.i, b.j);
            }
        }
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let g = Geometry::rectangular_grid(&[0.2, 0.2, 0.2], 0.1).expect("grid");
        let err = Model::new(pull_apart_2d(), g, ModelCallbacks::new())
            .err()
            .expect("3D vs 2D");
        assert!(err.is_config_error());
    }

    #[test]
    fn restore_rejects_wrong_length_and_ignores_absent() {
        let mut model = small_model();
        let mut store = MemoryStore::new();
        assert!(!model.restore_checkpoint(&store, 5).expect("absent"));
        for name in ["displacement", "velocity", "damage", "broken"] {
            store.write(&checkpoint_key(name, 5), &[0.0; 3]).expect("seed");
        }
        let err = model.restore_checkpoint(&store, 5).expect_err("wrong length");
        assert!(matches!(err, PeridynError::Persistence(_)));
    }
}
