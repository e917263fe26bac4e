// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: checkpoint persistence and resume.
//!
//! A run split by a checkpoint round trip must land on the same state as
//! an uninterrupted run.

use peridyn::error::PeridynError;
use peridyn::pd::config::crack_plate_2d;
use peridyn::pd::geometry::{pull_apart_tags, vertical_crack, Geometry};
use peridyn::pd::store::{checkpoint_key, ArrayStore, JsonDirStore, MemoryStore};
use peridyn::pd::{Model, ModelCallbacks};

fn cracked_plate() -> Model {
    let g = Geometry::rectangular_grid(&[1.0, 0.5], 0.025).expect("plate grid");
    let callbacks = ModelCallbacks::new()
        .with_classifier(pull_apart_tags(1.0, 0.15))
        .with_crack(vertical_crack(0.5, 0.0, 0.25))
        .with_tip(|x: &[f64]| x[0] > 0.85);
    Model::new(crack_plate_2d(), g, callbacks).expect("crack model")
}

#[test]
fn json_store_round_trip_and_append_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = JsonDirStore::create(dir.path().join("ckpt")).expect("store");
    let values = [0.0, -1.5e-7, 3.25, f64::MAX];
    store.write("velocity_25", &values).expect("write");
    assert!(dir.path().join("ckpt").join("velocity_25.json").exists());
    assert_eq!(store.read("velocity_25").expect("read"), Some(values.to_vec()));
    assert!(store.write("velocity_25", &[1.0]).is_err(), "keys are write-once");
    assert_eq!(store.read("velocity_50").expect("read"), None);
    assert!(store.write("../outside", &[1.0]).is_err());
}

#[test]
fn run_writes_every_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = JsonDirStore::create(dir.path()).expect("store");
    let mut model = cracked_plate();
    model.simulate(50, Some(&mut store)).expect("run");
    for step in [25, 50] {
        for name in ["displacement", "damage", "velocity", "broken"] {
            let key = checkpoint_key(name, step);
            assert!(store.contains(&key).expect("contains"), "missing {key}");
        }
    }
    let broken = store.read("broken_50").expect("read").expect("present");
    assert_eq!(broken.len(), model.topology().bond_count());
    assert_eq!(
        broken.iter().filter(|&&f| f != 0.0).count(),
        model.topology().broken_count()
    );
}

#[test]
fn resume_matches_uninterrupted_run() {
    let mut straight = cracked_plate();
    let reference = straight.simulate(100, None).expect("straight run");

    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = JsonDirStore::create(dir.path()).expect("store");
    let mut first = cracked_plate();
    first.simulate(50, Some(&mut store)).expect("first half");

    let mut resumed = cracked_plate();
    assert!(resumed.restore_checkpoint(&store, 50).expect("restore"));
    assert_eq!(resumed.state().step, 50);
    assert_eq!(
        resumed.boundary().applied_displacement(),
        first.boundary().applied_displacement()
    );
    assert_eq!(resumed.state().damage, first.state().damage);
    let outcome = resumed.simulate(50, None).expect("second half");

    assert_eq!(outcome.first_step, 51);
    assert_eq!(outcome.last_step, 100);
    assert_eq!(outcome.displacement, reference.displacement);
    assert_eq!(outcome.damage, reference.damage);
    assert_eq!(outcome.broken_bonds, reference.broken_bonds);
}

#[test]
fn missing_checkpoint_is_not_an_error() {
    let store = MemoryStore::new();
    let mut model = cracked_plate();
    assert!(!model.restore_checkpoint(&store, 50).expect("absent is Ok"));
    assert_eq!(model.state().step, 0, "nothing restored");
}

#[test]
fn partial_checkpoint_is_treated_as_missing() {
    let mut store = MemoryStore::new();
    let mut source = cracked_plate();
    source.simulate(25, Some(&mut store)).expect("run");
    let mut partial = MemoryStore::new();
    for name in ["displacement", "velocity", "damage"] {
        let key = checkpoint_key(name, 25);
        let values = store.read(&key).expect("read").expect("present");
        partial.write(&key, &values).expect("copy");
    }
    let mut model = cracked_plate();
    assert!(!model.restore_checkpoint(&partial, 25).expect("incomplete"));
}

#[test]
fn wrong_length_checkpoint_is_rejected() {
    let mut store = MemoryStore::new();
    for name in ["displacement", "velocity", "damage", "broken"] {
        store.write(&checkpoint_key(name, 25), &[0.0; 7]).expect("seed");
    }
    let mut model = cracked_plate();
    let err = model.restore_checkpoint(&store, 25).expect_err("length mismatch");
    assert!(matches!(err, PeridynError::Persistence(_)));
}

#[test]
fn restore_cannot_rewind() {
    let mut store = MemoryStore::new();
    let mut model = cracked_plate();
    model.simulate(50, Some(&mut store)).expect("run");
    let err = model.restore_checkpoint(&store, 25).expect_err("behind current step");
    assert!(matches!(err, PeridynError::Persistence(_)));
}
