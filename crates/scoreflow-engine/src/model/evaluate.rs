//! The evaluation lifecycle: phases, the incremental path, and validation.

use std::time::Instant;

use tracing::{debug, trace};

use scoreflow_core::{DerivativeAccumulator, ModelError, Result, Stage};

use super::{Model, RestraintKey, StateKey};
use crate::access;

/// Which restraints a scoring pass covers.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Selection {
    All,
    Incremental,
    NonIncremental,
}

impl Model {
    /// Evaluates every registered restraint and returns the total score.
    ///
    /// Rebuilds the cached schedule first if a registration change made it
    /// stale. Runs the selected score states' `before` hooks in dependency
    /// order, evaluates the restraints in registration order, then runs the
    /// `after` hooks in reverse dependency order. With
    /// `compute_derivatives`, restraints also accumulate gradients into the
    /// particles they read.
    ///
    /// On failure the error names the failing unit, the stage is reset, and
    /// the model stays usable; attribute mutations already performed are
    /// not rolled back.
    pub fn evaluate(&mut self, compute_derivatives: bool) -> Result<f64> {
        self.ensure_dependencies()?;
        let restraints = self.ordered_restraints.clone();
        let states = self.ordered_states.clone();
        let result = self.do_evaluate(&restraints, &states, compute_derivatives);
        // The stage is restored on every exit path, including failed ones.
        self.table.set_stage(Stage::NotEvaluating);
        result
    }

    /// Evaluates only `subset`, running just the score states in the union
    /// of their cached dependency bitsets.
    ///
    /// The partial score equals the sum of the subset's contributions under
    /// a full evaluation of the same entity states.
    pub fn evaluate_subset(
        &mut self,
        subset: &[RestraintKey],
        compute_derivatives: bool,
    ) -> Result<f64> {
        if subset.is_empty() {
            return Err(ModelError::Usage(
                "cannot evaluate an empty restraint subset".into(),
            ));
        }
        self.ensure_dependencies()?;
        let bits = self.union_dependencies(subset)?;
        let states = self.selected_states(&bits);
        let result = self.do_evaluate(subset, &states, compute_derivatives);
        self.table.set_stage(Stage::NotEvaluating);
        result
    }

    /// Runs every score state's hooks without scoring, bringing all
    /// derived state up to date.
    pub fn update(&mut self) -> Result<()> {
        self.ensure_dependencies()?;
        let states = self.ordered_states.clone();
        let result = self.do_update(&states);
        self.table.set_stage(Stage::NotEvaluating);
        result
    }

    fn do_update(&mut self, selected: &[StateKey]) -> Result<()> {
        debug!(event = "update", score_states = selected.len());
        self.before_phase(selected)?;
        self.after_phase(selected, false)?;
        self.table.set_stage(Stage::NotEvaluating);
        Ok(())
    }

    fn do_evaluate(
        &mut self,
        restraints: &[RestraintKey],
        states: &[StateKey],
        compute_derivatives: bool,
    ) -> Result<f64> {
        // Derivatives were not tracked on the previous call, so the shadow
        // totals are unusable and must be reseeded.
        if self.incremental && !self.last_had_derivatives && compute_derivatives {
            self.first_incremental = true;
        }
        self.last_had_derivatives = compute_derivatives;

        debug!(
            event = "evaluate_begin",
            incremental = self.incremental,
            seeding = self.first_incremental,
            derivatives = compute_derivatives,
            restraints = restraints.len(),
            score_states = states.len(),
        );

        self.before_phase(states)?;

        self.table.set_stage(Stage::Evaluate);
        let score = if self.incremental {
            let seeding = self.first_incremental;
            if compute_derivatives {
                self.table.zero_derivatives(seeding);
            }
            let mut total =
                self.evaluate_restraints(restraints, compute_derivatives, Selection::Incremental, !seeding)?;
            if compute_derivatives {
                self.table.move_derivatives_to_shadow();
            }
            total += self.evaluate_restraints(
                restraints,
                compute_derivatives,
                Selection::NonIncremental,
                false,
            )?;
            if compute_derivatives {
                self.table.accumulate_shadow_derivatives();
            }
            self.first_incremental = false;
            if self.config.validation.enabled && self.config.validation.check_incremental {
                self.validate_incremental(restraints, compute_derivatives, total)?;
            }
            total
        } else {
            if compute_derivatives {
                self.table.zero_derivatives(false);
            }
            self.evaluate_restraints(restraints, compute_derivatives, Selection::All, false)?
        };

        self.after_phase(states, compute_derivatives)?;

        if self.config.validation.enabled && self.config.validation.check_finite {
            self.table.validate_finite()?;
        }
        self.table.clear_changed_flags();
        self.table.set_stage(Stage::NotEvaluating);
        self.eval_count += 1;
        debug!(event = "evaluate_end", score);
        Ok(score)
    }

    fn before_phase(&mut self, selected: &[StateKey]) -> Result<()> {
        self.table.set_stage(Stage::BeforeEvaluate);
        for &key in selected {
            let Model { table, states, .. } = self;
            let state = states.get_mut(key).ok_or(ModelError::UnknownScoreState)?;
            trace!(state = state.name(), "before hook");
            let timer = Instant::now();
            access::run_state_before(table, state.as_mut())?;
            let stat_name = self
                .gather_statistics
                .then(|| state.name().to_string());
            let elapsed = timer.elapsed();
            if let Some(name) = stat_name {
                self.record_state_before(key, name, elapsed);
            }
        }
        Ok(())
    }

    fn after_phase(&mut self, selected: &[StateKey], compute_derivatives: bool) -> Result<()> {
        self.table.set_stage(Stage::AfterEvaluate);
        let accum = DerivativeAccumulator::new();
        for &key in selected.iter().rev() {
            let Model { table, states, .. } = self;
            let state = states.get_mut(key).ok_or(ModelError::UnknownScoreState)?;
            trace!(state = state.name(), "after hook");
            let timer = Instant::now();
            access::run_state_after(table, state.as_mut(), compute_derivatives.then_some(&accum))?;
            let stat_name = self
                .gather_statistics
                .then(|| state.name().to_string());
            let elapsed = timer.elapsed();
            if let Some(name) = stat_name {
                self.record_state_after(key, name, elapsed);
            }
        }
        Ok(())
    }

    fn evaluate_restraints(
        &mut self,
        selected: &[RestraintKey],
        compute_derivatives: bool,
        which: Selection,
        incremental_evaluation: bool,
    ) -> Result<f64> {
        let mut score = 0.0;
        for &key in selected {
            let weight = self.weights.get(key).copied().unwrap_or(1.0);
            let Model {
                table, restraints, ..
            } = self;
            let restraint = restraints.get_mut(key).ok_or(ModelError::UnknownRestraint)?;
            let eligible = restraint.is_incremental();
            let covered = match which {
                Selection::All => true,
                Selection::Incremental => eligible,
                Selection::NonIncremental => !eligible,
            };
            if !covered {
                continue;
            }
            let accum = DerivativeAccumulator::with_weight(weight);
            let accum_ref = compute_derivatives.then_some(&accum);
            let timer = Instant::now();
            let value = weight
                * access::run_restraint(
                    table,
                    restraint.as_mut(),
                    accum_ref,
                    incremental_evaluation,
                )?;
            trace!(restraint = restraint.name(), score = value);
            let stat_name = self
                .gather_statistics
                .then(|| restraint.name().to_string());
            let elapsed = timer.elapsed();
            if let Some(name) = stat_name {
                self.record_restraint(key, name, elapsed, value);
            }
            score += value;
        }
        Ok(score)
    }

    /// Shadow-checks the incremental result against a full recomputation.
    ///
    /// The incremental derivatives are kept as the committed result; the
    /// full pass only serves as the reference.
    fn validate_incremental(
        &mut self,
        restraints: &[RestraintKey],
        compute_derivatives: bool,
        score: f64,
    ) -> Result<()> {
        debug!(event = "validate_incremental", score);
        let saved = self.table.snapshot_derivatives();
        if compute_derivatives {
            self.table.zero_derivatives(false);
        }
        let gather = self.gather_statistics;
        self.gather_statistics = false;
        let full = self.evaluate_restraints(restraints, compute_derivatives, Selection::All, false);
        self.gather_statistics = gather;
        let full = full?;

        let v = &self.config.validation;
        if (full - score).abs()
            > v.score_absolute_tolerance + v.score_relative_tolerance * (full + score).abs()
        {
            return Err(ModelError::InconsistentIncremental {
                incremental: score,
                full,
            });
        }
        if compute_derivatives {
            self.table.compare_derivatives(
                &saved,
                v.derivative_absolute_tolerance,
                v.derivative_relative_tolerance,
            )?;
        }
        self.table.restore_derivatives(&saved)?;
        Ok(())
    }
}
