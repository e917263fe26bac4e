// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: smooth displacement ramp driving a full model.
//!
//! The ramp is sized against the run's step budget when the model is
//! built; displacement-tagged particles must follow the schedule exactly.

use peridyn::error::PeridynError;
use peridyn::pd::config::{ramped_plate_2d, LoadSchedule};
use peridyn::pd::geometry::{pull_apart_tags, BoundaryTag, Geometry};
use peridyn::pd::{Model, ModelCallbacks, SimConfig};
use peridyn::tolerances;

fn ramped_model(config: SimConfig) -> peridyn::error::Result<Model> {
    let g = Geometry::rectangular_grid(&[1.0, 0.5], 0.05)?;
    let callbacks = ModelCallbacks::new().with_classifier(pull_apart_tags(1.0, 0.15));
    Model::new(config, g, callbacks)
}

fn ramp_target(config: &SimConfig) -> f64 {
    match config.loading.schedule {
        LoadSchedule::Ramp { max_displacement, .. } => max_displacement,
        LoadSchedule::Constant { .. } => panic!("preset must use the ramp"),
    }
}

#[test]
fn infeasible_ramp_rejected_before_stepping() {
    let mut config = ramped_plate_2d();
    config.steps = 50;
    let err = ramped_model(config)
        .err()
        .expect("build time 75 exceeds 50 steps");
    assert!(err.is_config_error());
    match err {
        PeridynError::BuildTimeExceeded { build_time, steps } => {
            assert_eq!(steps, 50);
            assert_eq!(build_time, 51);
        }
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn loaded_particles_follow_the_schedule() {
    let config = ramped_plate_2d();
    let target = ramp_target(&config);
    let steps = config.steps;
    let mut model = ramped_model(config).expect("ramp fits");
    let outcome = model.simulate(steps, None).expect("run");

    let applied = model.boundary().applied_displacement();
    assert!(
        ((applied - target) / target).abs() < tolerances::RAMP_TOTAL_DISPLACEMENT_REL,
        "applied {applied} vs target {target}"
    );
    assert_eq!(model.boundary().last_rate(), 0.0, "ramp has settled");

    let dim = model.geometry().dim();
    for (i, tag) in model.boundary().tags().iter().enumerate() {
        let u = &outcome.displacement[i * dim..(i + 1) * dim];
        match tag {
            BoundaryTag::DisplacementPositive => {
                assert_eq!(u[0], applied, "particle {i}");
                assert_eq!(u[1], 0.0);
            }
            BoundaryTag::DisplacementNegative => {
                assert_eq!(u[0], -applied, "particle {i}");
                assert_eq!(u[1], 0.0);
            }
            _ => {}
        }
    }
}

#[test]
fn ramp_state_visible_through_the_model() {
    let config = ramped_plate_2d();
    let mut model = ramped_model(config).expect("ramp fits");
    let build_time = model
        .boundary()
        .ramp_state()
        .expect("ramp schedule")
        .build_time;
    // Smoothstep quintic: T = 15 D / (8 Rmax) = 75 for the preset.
    assert!((75..=76).contains(&build_time), "build time {build_time}");

    model.simulate(build_time / 2, None).expect("acceleration phase");
    let mid = model.boundary().load_factor();
    assert!(mid > 0.0 && mid < 0.5, "load factor {mid} mid-flank");
    assert!(model.boundary().ramp_state().expect("ramp").ease_off.is_none());
}

#[test]
fn ramp_from_toml_matches_preset() {
    let text = r#"
        label = "toml_ramp"
        horizon = 0.1
        critical_stretch = 0.005
        bond_stiffness = 2864.788975654116
        density = 2.0
        dt = 1e-3
        steps = 400
        write_interval = 100

        [loading]
        load_axis = 0

        [loading.schedule]
        kind = "ramp"
        build_displacement = 2e-4
        max_displacement_rate = 5e-6
        max_displacement = 1e-3
    "#;
    let config = SimConfig::from_toml_str(text).expect("valid toml");
    let mut from_toml = ramped_model(config).expect("model");
    let mut preset = ramped_model(ramped_plate_2d()).expect("model");
    from_toml.simulate(120, None).expect("run");
    preset.simulate(120, None).expect("run");
    assert_eq!(
        from_toml.boundary().applied_displacement(),
        preset.boundary().applied_displacement()
    );
}
