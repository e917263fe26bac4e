// SPDX-License-Identifier: AGPL-3.0-only

//! Peridynamics physics and backend-parity validation
//!
//! | Section | What is checked |
//! |---------|-----------------|
//! | Ramp | minimal build time, infeasible budget rejected |
//! | Pull-apart | zero damage, mirror symmetry, Newton's third law |
//! | Backends | rayon vs sequential displacement and damage |
//! | Crack plate | pre-cut bonds, damage grows and never heals |
//! | GPU (`gpu` feature) | f64 compute vs sequential, skipped without an adapter |
//!
//! Exit code 0 when every check passes, 1 otherwise.

use peridyn::error::PeridynError;
use peridyn::pd::backend::{Backend, ParallelBackend, SequentialBackend};
use peridyn::pd::config::{crack_plate_2d, pull_apart_2d};
use peridyn::pd::geometry::{pull_apart_tags, vertical_crack, Geometry};
use peridyn::pd::observables::{damage_stats, mirror_symmetry_error};
use peridyn::pd::ramp::{calc_build_time, midpoint_gradient};
use peridyn::pd::{Model, ModelCallbacks, SimConfig};
use peridyn::tolerances;
use peridyn::validation::ValidationHarness;

const PLATE: [f64; 2] = [1.0, 0.5];
const SPACING: f64 = 0.025;
const BAND: f64 = 0.15;

fn plate() -> Geometry {
    Geometry::rectangular_grid(&PLATE, SPACING).unwrap_or_else(|e| panic!("plate grid: {e}"))
}

fn pull_apart_model(config: SimConfig, backend: Box<dyn Backend>) -> Model {
    let callbacks = ModelCallbacks::new().with_classifier(pull_apart_tags(PLATE[0], BAND));
    Model::with_backend(config, plate(), callbacks, backend)
        .unwrap_or_else(|e| panic!("pull-apart model: {e}"))
}

fn crack_model(config: SimConfig) -> Model {
    let callbacks = ModelCallbacks::new()
        .with_classifier(pull_apart_tags(PLATE[0], BAND))
        .with_crack(vertical_crack(0.5, 0.0, 0.25))
        .with_tip(|x: &[f64]| x[0] > PLATE[0] - BAND);
    Model::new(config, plate(), callbacks).unwrap_or_else(|e| panic!("crack model: {e}"))
}

// ═══════════════════════════════════════════════════════════════════
// Ramp
// ═══════════════════════════════════════════════════════════════════

fn validate_ramp(harness: &mut ValidationHarness) {
    println!("═══ Ramp build time ═══");
    let (d, rmax) = (0.5, 1e-4);
    match calc_build_time(d, rmax, 100_000) {
        Ok((t, _)) => {
            println!("  D={d}, Rmax={rmax:e}: build_time={t}");
            let peak = midpoint_gradient(t, d).map_or(f64::INFINITY, |(g, _)| g);
            let below = midpoint_gradient(t - 1, d).map_or(f64::INFINITY, |(g, _)| g);
            harness.check_at_most("ramp peak rate within cap", peak, rmax);
            harness.check_bool("ramp build time is minimal", below > rmax);
            // Smoothstep quintic: peak rate 15 D / (8 T).
            harness.check_rel(
                "ramp build time vs 15D/(8 Rmax)",
                t as f64,
                15.0 * d / (8.0 * rmax),
                1e-3,
            );
        }
        Err(e) => {
            println!("  unexpected: {e}");
            harness.check_bool("ramp feasible with 100000 steps", false);
        }
    }
    let rejected = matches!(
        calc_build_time(d, rmax, 1000),
        Err(PeridynError::BuildTimeExceeded { build_time: 1001, steps: 1000 })
    );
    harness.check_bool("ramp rejects 1000-step budget", rejected);
    println!();
}

// ═══════════════════════════════════════════════════════════════════
// Pull-apart and CPU parity
// ═══════════════════════════════════════════════════════════════════

fn validate_pull_apart(harness: &mut ValidationHarness) -> Model {
    println!("═══ Pull-apart, uncracked plate ═══");
    let config = pull_apart_2d();
    let steps = config.steps;
    let mut model = pull_apart_model(config, Box::new(SequentialBackend));
    let outcome = model
        .simulate(steps, None)
        .unwrap_or_else(|e| panic!("pull-apart run: {e}"));
    println!(
        "  {} particles, {} bonds, {steps} steps in {:.3}s",
        model.geometry().len(),
        model.topology().bond_count(),
        outcome.wall_time_s
    );

    harness.check_abs("pull-apart max damage", damage_stats(&outcome.damage).max, 0.0, 0.0);
    harness.check_abs(
        "pull-apart broken bonds",
        outcome.broken_bonds as f64,
        0.0,
        0.0,
    );
    match mirror_symmetry_error(model.geometry(), &outcome.displacement, 0, PLATE[0] / 2.0) {
        Ok(err) => harness.check_at_most(
            "pull-apart mirror symmetry",
            err,
            tolerances::PULL_APART_SYMMETRY_ABS,
        ),
        Err(e) => {
            println!("  symmetry: {e}");
            harness.check_bool("pull-apart mirror symmetry", false);
        }
    }
    let dim = model.geometry().dim();
    for k in 0..dim {
        let net: f64 = outcome.force.iter().skip(k).step_by(dim).sum();
        harness.check_abs(
            &format!("net bond force axis {k}"),
            net,
            0.0,
            tolerances::NEWTON_3RD_LAW_ABS,
        );
    }
    println!();
    model
}

fn validate_parallel(harness: &mut ValidationHarness, reference: &Model) {
    println!("═══ Parallel vs sequential ═══");
    let backend = match ParallelBackend::new(None) {
        Ok(b) => b,
        Err(e) => {
            println!("  rayon pool unavailable: {e}");
            harness.check_bool("parallel backend available", false);
            return;
        }
    };
    println!("  rayon threads: {}", backend.threads());
    let config = reference.config().clone();
    let steps = config.steps;
    let mut model = pull_apart_model(config, Box::new(backend));
    let outcome = model
        .simulate(steps, None)
        .unwrap_or_else(|e| panic!("parallel run: {e}"));
    harness.check_arrays(
        "parallel displacement",
        &outcome.displacement,
        &reference.state().displacement,
        tolerances::CPU_PARALLEL_VS_SEQUENTIAL,
    );
    harness.check_arrays(
        "parallel damage",
        &outcome.damage,
        &reference.state().damage,
        0.0,
    );
    println!();
}

// ═══════════════════════════════════════════════════════════════════
// Crack plate
// ═══════════════════════════════════════════════════════════════════

fn validate_crack_plate(harness: &mut ValidationHarness) {
    println!("═══ Pre-cracked plate ═══");
    let config = crack_plate_2d();
    let half = config.steps / 2;
    let mut model = crack_model(config);
    println!(
        "  {} bonds, {} pre-cut by the crack",
        model.topology().bond_count(),
        model.topology().pre_cut_count()
    );
    harness.check_bool("crack pre-cuts bonds", model.topology().pre_cut_count() > 0);

    let first = model
        .simulate(half, None)
        .unwrap_or_else(|e| panic!("crack run (first half): {e}"));
    let second = model
        .simulate(half, None)
        .unwrap_or_else(|e| panic!("crack run (second half): {e}"));
    let stats = damage_stats(&second.damage);
    println!(
        "  damage: max={:.3}, mean={:.4}, {} damaged particles, {} broken bonds",
        stats.max, stats.mean, stats.damaged, second.broken_bonds
    );
    harness.check_bool("crack plate develops damage", stats.max > 0.0);
    harness.check_bool(
        "damage never decreases",
        first.damage.iter().zip(&second.damage).all(|(a, b)| b >= a),
    );
    harness.check_bool(
        "damage within [0, 1]",
        second.damage.iter().all(|d| (0.0..=1.0).contains(d)),
    );
    if let Some(last) = second.load_history.last() {
        println!(
            "  tip at step {}: u={:.4e}, F={:.4e}",
            last.step, last.tip_displacement, last.tip_force
        );
    }
    println!();
}

// ═══════════════════════════════════════════════════════════════════
// GPU
// ═══════════════════════════════════════════════════════════════════

#[cfg(feature = "gpu")]
fn validate_gpu(harness: &mut ValidationHarness, reference: &Model) {
    use peridyn::pd::gpu_backend::GpuBackend;

    println!("═══ GPU f64 vs sequential ═══");
    for info in peridyn::gpu::enumerate_adapters() {
        println!("  {info}");
    }
    let backend = match GpuBackend::new() {
        Ok(b) => b,
        Err(e) => {
            println!("  skipped: {e}");
            return;
        }
    };
    println!("  adapter: {}", backend.adapter_name());
    let config = reference.config().clone();
    let steps = config.steps;
    let mut model = pull_apart_model(config, Box::new(backend));
    let outcome = match model.simulate(steps, None) {
        Ok(o) => o,
        Err(e) => {
            println!("  gpu run failed: {e}");
            harness.check_bool("gpu run completes", false);
            return;
        }
    };
    harness.check_arrays(
        "gpu displacement",
        &outcome.displacement,
        &reference.state().displacement,
        tolerances::GPU_VS_CPU_F64,
    );
    harness.check_arrays(
        "gpu damage",
        &outcome.damage,
        &reference.state().damage,
        tolerances::GPU_DAMAGE_ABS,
    );
    println!();
}

#[cfg(not(feature = "gpu"))]
fn validate_gpu(_harness: &mut ValidationHarness, _reference: &Model) {
    println!("═══ GPU f64 ═══");
    println!("  skipped: built without the `gpu` feature");
    println!();
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Peridynamics validation: ramp, pull-apart, crack, backends  ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let mut harness = ValidationHarness::new("validate_peridynamics");
    validate_ramp(&mut harness);
    let reference = validate_pull_apart(&mut harness);
    validate_parallel(&mut harness, &reference);
    validate_crack_plate(&mut harness);
    validate_gpu(&mut harness, &reference);
    harness.finish();
}
