//! Consolidated tests for the entity module.

use std::collections::HashSet;

use super::{DerivativeAccumulator, EntityTable, FloatKey};
use crate::error::ModelError;
use crate::stage::Stage;

const X: FloatKey = FloatKey::new(0);
const Y: FloatKey = FloatKey::new(1);

#[test]
fn test_attribute_round_trip() {
    let mut table = EntityTable::new();
    let p = table.add_particle("p0").unwrap();
    table.add_attribute(p, X, 1.0).unwrap();
    table.set_attribute(p, X, 2.5).unwrap();
    assert_eq!(table.attribute(p, X).unwrap(), 2.5);
    assert!(table.has_attribute(p, X));
    assert!(!table.has_attribute(p, Y));
}

#[test]
fn test_missing_attribute_is_reported() {
    let mut table = EntityTable::new();
    let p = table.add_particle("p0").unwrap();
    let err = table.attribute(p, X).unwrap_err();
    assert!(matches!(err, ModelError::MissingAttribute { .. }));
}

#[test]
fn test_duplicate_attribute_is_a_usage_error() {
    let mut table = EntityTable::new();
    let p = table.add_particle("p0").unwrap();
    table.add_attribute(p, X, 0.0).unwrap();
    let err = table.add_attribute(p, X, 1.0).unwrap_err();
    assert!(matches!(err, ModelError::Usage(_)));
}

#[test]
fn test_set_attribute_marks_changed_until_cleared() {
    let mut table = EntityTable::new();
    let p = table.add_particle("p0").unwrap();
    table.add_attribute(p, X, 0.0).unwrap();
    assert!(!table.is_changed(p).unwrap());
    table.set_attribute(p, X, 1.0).unwrap();
    assert!(table.is_changed(p).unwrap());
    table.clear_changed_flags();
    assert!(!table.is_changed(p).unwrap());
}

#[test]
fn test_removed_particle_key_is_rejected() {
    let mut table = EntityTable::new();
    let p = table.add_particle("p0").unwrap();
    table.remove_particle(p).unwrap();
    assert!(!table.contains_particle(p));
    assert!(matches!(
        table.attribute(p, X).unwrap_err(),
        ModelError::UnknownParticle
    ));
}

#[test]
fn test_registration_rejected_mid_evaluation() {
    let mut table = EntityTable::new();
    table.set_stage(Stage::BeforeEvaluate);
    let err = table.add_particle("late").unwrap_err();
    assert!(matches!(err, ModelError::Usage(_)));
    table.set_stage(Stage::NotEvaluating);
    assert!(table.add_particle("on-time").is_ok());
}

#[test]
fn test_attribute_writes_rejected_during_scoring_stages() {
    let mut table = EntityTable::new();
    let p = table.add_particle("p0").unwrap();
    table.add_attribute(p, X, 0.0).unwrap();

    table.set_stage(Stage::Evaluate);
    assert!(matches!(
        table.set_attribute(p, X, 1.0).unwrap_err(),
        ModelError::Usage(_)
    ));

    table.set_stage(Stage::AfterEvaluate);
    assert!(matches!(
        table.set_attribute(p, X, 1.0).unwrap_err(),
        ModelError::Usage(_)
    ));

    // The before phase is where score states mutate state.
    table.set_stage(Stage::BeforeEvaluate);
    assert!(table.set_attribute(p, X, 1.0).is_ok());
}

#[test]
fn test_derivative_accumulation_applies_weight() {
    let mut table = EntityTable::new();
    let p = table.add_particle("p0").unwrap();
    table.add_attribute(p, X, 0.0).unwrap();

    let accum = DerivativeAccumulator::with_weight(2.0);
    table.add_derivative(p, X, 3.0, &accum).unwrap();
    table.add_derivative(p, X, 1.0, &accum.scaled(0.5)).unwrap();
    assert_eq!(table.derivative(p, X).unwrap(), 7.0);
}

#[test]
fn test_derivatives_rejected_during_before_phase() {
    let mut table = EntityTable::new();
    let p = table.add_particle("p0").unwrap();
    table.add_attribute(p, X, 0.0).unwrap();
    table.set_stage(Stage::BeforeEvaluate);
    let accum = DerivativeAccumulator::new();
    assert!(matches!(
        table.add_derivative(p, X, 1.0, &accum).unwrap_err(),
        ModelError::Usage(_)
    ));
    assert!(matches!(
        table.derivative(p, X).unwrap_err(),
        ModelError::Usage(_)
    ));
}

#[test]
fn test_shadow_derivative_cycle() {
    let mut table = EntityTable::new();
    let p = table.add_particle("p0").unwrap();
    table.add_attribute(p, X, 0.0).unwrap();
    let accum = DerivativeAccumulator::new();

    // Seed pass: full derivatives end up in the shadow.
    table.add_derivative(p, X, 2.0, &accum).unwrap();
    table.move_derivatives_to_shadow();
    assert_eq!(table.derivative(p, X).unwrap(), 0.0);
    table.accumulate_shadow_derivatives();
    assert_eq!(table.derivative(p, X).unwrap(), 2.0);

    // Next pass: a delta of 1.0 joins the shadow total.
    table.zero_derivatives(false);
    table.add_derivative(p, X, 1.0, &accum).unwrap();
    table.move_derivatives_to_shadow();
    table.accumulate_shadow_derivatives();
    assert_eq!(table.derivative(p, X).unwrap(), 3.0);
}

#[test]
fn test_snapshot_restore_and_compare() {
    let mut table = EntityTable::new();
    let p = table.add_particle("p0").unwrap();
    table.add_attribute(p, X, 0.0).unwrap();
    let accum = DerivativeAccumulator::new();

    table.add_derivative(p, X, 5.0, &accum).unwrap();
    let snapshot = table.snapshot_derivatives();
    table.zero_derivatives(false);
    table.add_derivative(p, X, 5.0004, &accum).unwrap();
    assert!(table.compare_derivatives(&snapshot, 0.01, 0.01).is_ok());

    table.zero_derivatives(false);
    assert!(matches!(
        table.compare_derivatives(&snapshot, 0.01, 0.01).unwrap_err(),
        ModelError::InconsistentDerivative { .. }
    ));

    table.restore_derivatives(&snapshot).unwrap();
    assert_eq!(table.derivative(p, X).unwrap(), 5.0);
}

#[test]
fn test_validate_finite_flags_nan() {
    let mut table = EntityTable::new();
    let p = table.add_particle("p0").unwrap();
    table.add_attribute(p, X, 0.0).unwrap();
    assert!(table.validate_finite().is_ok());
    table.set_attribute(p, X, f64::NAN).unwrap();
    assert!(matches!(
        table.validate_finite().unwrap_err(),
        ModelError::NonFinite { .. }
    ));
}

#[test]
fn test_access_marks_forbid_undeclared_particles() {
    let mut table = EntityTable::new();
    let allowed = table.add_particle("allowed").unwrap();
    let hidden = table.add_particle("hidden").unwrap();
    table.add_attribute(allowed, X, 1.0).unwrap();
    table.add_attribute(hidden, X, 1.0).unwrap();

    let readable: HashSet<_> = [allowed].into_iter().collect();
    let writable = HashSet::new();
    table.restrict_access(&readable, &writable);

    assert!(table.attribute(allowed, X).is_ok());
    assert!(matches!(
        table.attribute(hidden, X).unwrap_err(),
        ModelError::AccessViolation { .. }
    ));
    assert!(matches!(
        table.set_attribute(allowed, X, 2.0).unwrap_err(),
        ModelError::AccessViolation { .. }
    ));

    table.clear_access_restrictions();
    assert!(table.attribute(hidden, X).is_ok());
    assert!(table.set_attribute(allowed, X, 2.0).is_ok());
}

#[test]
fn test_container_flattening_recurses_and_dedups() {
    let mut table = EntityTable::new();
    let a = table.add_particle("a").unwrap();
    let b = table.add_particle("b").unwrap();
    let c = table.add_particle("c").unwrap();

    let inner = table.add_container("inner").unwrap();
    let outer = table.add_container("outer").unwrap();
    table.set_container_members(inner, &[b, c], &[]).unwrap();
    table
        .set_container_members(outer, &[a, b], &[inner])
        .unwrap();

    let flat = table.flattened_particles(outer).unwrap();
    assert_eq!(flat.len(), 3);
    assert!(flat.contains(&a) && flat.contains(&b) && flat.contains(&c));
}

#[test]
fn test_container_reference_cycle_is_tolerated() {
    let mut table = EntityTable::new();
    let p = table.add_particle("p").unwrap();
    let first = table.add_container("first").unwrap();
    let second = table.add_container("second").unwrap();
    table.set_container_members(first, &[p], &[second]).unwrap();
    table.set_container_members(second, &[], &[first]).unwrap();

    let flat = table.flattened_particles(first).unwrap();
    assert_eq!(flat, vec![p]);
}
