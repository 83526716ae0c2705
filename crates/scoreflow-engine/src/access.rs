//! Declared-access enforcement around hook calls.
//!
//! Debug builds mark every particle outside a unit's declared sets as
//! access-forbidden for the duration of the hook; the entity table's
//! accessors raise a violation on any touch. Release builds skip the marks
//! and are otherwise behaviorally identical. The marks are assertions, not
//! blocking primitives; execution is single-threaded.
//!
//! Allowed sets, with declared containers expanded to their member
//! particles:
//! - `before` hook: read inputs and outputs, write outputs
//! - `after` hook: the declared reverse of `before`; read and write inputs
//!   and outputs (derivatives flow back onto the inputs)
//! - restraint `evaluate`: read and write inputs (gradients land on the
//!   particles the restraint reads)

use std::collections::HashSet;

use scoreflow_core::{
    Containers, DerivativeAccumulator, EntityTable, ModelError, ParticleKey, Particles, Restraint,
    Result, ScoreState,
};

fn expand(
    table: &EntityTable,
    particles: &Particles,
    containers: &Containers,
    into: &mut HashSet<ParticleKey>,
) {
    into.extend(
        particles
            .iter()
            .copied()
            .filter(|&p| table.contains_particle(p)),
    );
    for &container in containers {
        if let Ok(flattened) = table.flattened_particles(container) {
            into.extend(flattened);
        }
    }
}

fn name_violation(err: ModelError, unit: &str) -> ModelError {
    match err {
        ModelError::AccessViolation { particle, mode, .. } => ModelError::AccessViolation {
            unit: unit.to_string(),
            particle,
            mode,
        },
        other => other,
    }
}

fn scoped<T>(
    table: &mut EntityTable,
    unit: &str,
    readable: &HashSet<ParticleKey>,
    writable: &HashSet<ParticleKey>,
    run: impl FnOnce(&mut EntityTable) -> Result<T>,
) -> Result<T> {
    table.restrict_access(readable, writable);
    let result = run(table);
    table.clear_access_restrictions();
    result.map_err(|err| name_violation(err, unit))
}

pub(crate) fn run_state_before(table: &mut EntityTable, state: &mut dyn ScoreState) -> Result<()> {
    if cfg!(debug_assertions) {
        let mut writable = HashSet::new();
        expand(
            table,
            &state.output_particles(),
            &state.output_containers(),
            &mut writable,
        );
        let mut readable = writable.clone();
        expand(
            table,
            &state.input_particles(),
            &state.input_containers(),
            &mut readable,
        );
        let name = state.name().to_string();
        scoped(table, &name, &readable, &writable, |t| {
            state.before_evaluate(t)
        })
    } else {
        state.before_evaluate(table)
    }
}

pub(crate) fn run_state_after(
    table: &mut EntityTable,
    state: &mut dyn ScoreState,
    accum: Option<&DerivativeAccumulator>,
) -> Result<()> {
    if cfg!(debug_assertions) {
        let mut allowed = HashSet::new();
        expand(
            table,
            &state.input_particles(),
            &state.input_containers(),
            &mut allowed,
        );
        expand(
            table,
            &state.output_particles(),
            &state.output_containers(),
            &mut allowed,
        );
        let name = state.name().to_string();
        scoped(table, &name, &allowed, &allowed, |t| {
            state.after_evaluate(t, accum)
        })
    } else {
        state.after_evaluate(table, accum)
    }
}

pub(crate) fn run_restraint(
    table: &mut EntityTable,
    restraint: &mut dyn Restraint,
    accum: Option<&DerivativeAccumulator>,
    incremental: bool,
) -> Result<f64> {
    if cfg!(debug_assertions) {
        let mut allowed = HashSet::new();
        expand(
            table,
            &restraint.input_particles(),
            &restraint.input_containers(),
            &mut allowed,
        );
        let name = restraint.name().to_string();
        scoped(table, &name, &allowed, &allowed, |t| {
            if incremental {
                restraint.incremental_evaluate(t, accum)
            } else {
                restraint.evaluate(t, accum)
            }
        })
    } else if incremental {
        restraint.incremental_evaluate(table, accum)
    } else {
        restraint.evaluate(table, accum)
    }
}
