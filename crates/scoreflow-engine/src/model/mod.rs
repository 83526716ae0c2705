//! The model: owner of all entities and the evaluation scheduler.

mod dependencies;
mod evaluate;


use std::time::Duration;

use fixedbitset::FixedBitSet;
use scoreflow_config::EngineConfig;
use scoreflow_core::{
    ContainerKey, EntityTable, ModelError, ParticleKey, Restraint, Result, ScoreState, Stage,
};
use slotmap::{SecondaryMap, SlotMap};

use crate::stats::{RestraintStats, StateStats, StatisticsSummary};

slotmap::new_key_type! {
    /// Stable key of a score state registered on a [`Model`].
    pub struct StateKey;

    /// Stable key of a restraint registered on a [`Model`].
    pub struct RestraintKey;
}

/// Owner of particles, containers, score states, and restraints, and the
/// scheduler that evaluates them.
///
/// Registration changes invalidate the cached schedule; the next evaluation
/// rebuilds the dependency graph, re-sorts the score states, and recomputes
/// the per-restraint dependency index. Repeated evaluations on an unchanged
/// registration set reuse the cache.
///
/// There is no process-wide instance: a `Model` is an explicit context
/// object, and everything it caches dies with it.
///
/// # Example
///
/// ```
/// use scoreflow_engine::Model;
/// use scoreflow_test::ConstantRestraint;
///
/// let mut model = Model::new();
/// model
///     .add_restraint(Box::new(ConstantRestraint::new("one", 1.0)))
///     .unwrap();
/// model
///     .add_restraint(Box::new(ConstantRestraint::new("two", 2.0)))
///     .unwrap();
/// assert_eq!(model.evaluate(false).unwrap(), 3.0);
/// ```
pub struct Model {
    table: EntityTable,
    config: EngineConfig,

    states: SlotMap<StateKey, Box<dyn ScoreState>>,
    state_order: Vec<StateKey>,
    restraints: SlotMap<RestraintKey, Box<dyn Restraint>>,
    restraint_order: Vec<RestraintKey>,
    weights: SecondaryMap<RestraintKey, f64>,

    incremental: bool,
    /// A full pass must seed the incremental shadow state before the
    /// incremental path may run.
    first_incremental: bool,
    last_had_derivatives: bool,
    eval_count: u64,

    // Cached schedule, valid while `has_dependencies`.
    ordered_states: Vec<StateKey>,
    ordered_restraints: Vec<RestraintKey>,
    restraint_index: SecondaryMap<RestraintKey, usize>,
    dependencies: Vec<FixedBitSet>,
    has_dependencies: bool,

    gather_statistics: bool,
    state_stats: SecondaryMap<StateKey, StateStats>,
    restraint_stats: SecondaryMap<RestraintKey, RestraintStats>,
}

impl Model {
    /// Creates an empty model with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an empty model with an explicit configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            table: EntityTable::new(),
            gather_statistics: config.gather_statistics,
            config,
            states: SlotMap::with_key(),
            state_order: Vec::new(),
            restraints: SlotMap::with_key(),
            restraint_order: Vec::new(),
            weights: SecondaryMap::new(),
            incremental: false,
            first_incremental: true,
            last_had_derivatives: false,
            eval_count: 0,
            ordered_states: Vec::new(),
            ordered_restraints: Vec::new(),
            restraint_index: SecondaryMap::new(),
            dependencies: Vec::new(),
            has_dependencies: false,
            state_stats: SecondaryMap::new(),
            restraint_stats: SecondaryMap::new(),
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read access to the entity table.
    pub fn table(&self) -> &EntityTable {
        &self.table
    }

    /// Mutable access to the entity table, for attribute updates between
    /// evaluations. Attribute values are not part of the cached schedule,
    /// so mutating them does not invalidate it.
    pub fn table_mut(&mut self) -> &mut EntityTable {
        &mut self.table
    }

    /// Returns the current evaluation stage.
    pub fn stage(&self) -> Stage {
        self.table.stage()
    }

    /// Number of completed evaluations.
    pub fn evaluation_count(&self) -> u64 {
        self.eval_count
    }

    fn check_not_evaluating(&self, what: &str) -> Result<()> {
        if self.table.stage() != Stage::NotEvaluating {
            return Err(ModelError::Usage(format!(
                "{what} is not allowed during evaluation (stage is {})",
                self.table.stage()
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Adds a particle and invalidates the cached schedule.
    pub fn add_particle(&mut self, name: impl Into<String>) -> Result<ParticleKey> {
        let key = self.table.add_particle(name)?;
        self.reset_dependencies();
        Ok(key)
    }

    /// Removes a particle; any cached dependency data referencing it is
    /// invalidated.
    pub fn remove_particle(&mut self, particle: ParticleKey) -> Result<()> {
        self.table.remove_particle(particle)?;
        self.reset_dependencies();
        Ok(())
    }

    /// Adds a container with the given members.
    pub fn add_container(
        &mut self,
        name: impl Into<String>,
        particles: &[ParticleKey],
        subcontainers: &[ContainerKey],
    ) -> Result<ContainerKey> {
        let key = self.table.add_container(name)?;
        self.table
            .set_container_members(key, particles, subcontainers)?;
        self.reset_dependencies();
        Ok(key)
    }

    /// Removes a container.
    pub fn remove_container(&mut self, container: ContainerKey) -> Result<()> {
        self.table.remove_container(container)?;
        self.reset_dependencies();
        Ok(())
    }

    /// Registers a score state.
    pub fn add_score_state(&mut self, state: Box<dyn ScoreState>) -> Result<StateKey> {
        self.check_not_evaluating("adding a score state")?;
        let key = self.states.insert(state);
        self.state_order.push(key);
        self.reset_dependencies();
        Ok(key)
    }

    /// Unregisters a score state and returns it.
    pub fn remove_score_state(&mut self, state: StateKey) -> Result<Box<dyn ScoreState>> {
        self.check_not_evaluating("removing a score state")?;
        let unit = self
            .states
            .remove(state)
            .ok_or(ModelError::UnknownScoreState)?;
        self.state_order.retain(|&k| k != state);
        self.state_stats.remove(state);
        self.reset_dependencies();
        Ok(unit)
    }

    /// Registers a restraint with weight 1.
    pub fn add_restraint(&mut self, restraint: Box<dyn Restraint>) -> Result<RestraintKey> {
        self.check_not_evaluating("adding a restraint")?;
        let key = self.restraints.insert(restraint);
        self.restraint_order.push(key);
        self.weights.insert(key, 1.0);
        self.reset_dependencies();
        Ok(key)
    }

    /// Unregisters a restraint and returns it.
    pub fn remove_restraint(&mut self, restraint: RestraintKey) -> Result<Box<dyn Restraint>> {
        self.check_not_evaluating("removing a restraint")?;
        let unit = self
            .restraints
            .remove(restraint)
            .ok_or(ModelError::UnknownRestraint)?;
        self.restraint_order.retain(|&k| k != restraint);
        self.weights.remove(restraint);
        self.restraint_stats.remove(restraint);
        self.reset_dependencies();
        Ok(unit)
    }

    /// Number of registered score states.
    pub fn state_count(&self) -> usize {
        self.state_order.len()
    }

    /// Number of registered restraints.
    pub fn restraint_count(&self) -> usize {
        self.restraint_order.len()
    }

    /// Sets a restraint's weight, applied to its score and gradient
    /// contributions.
    pub fn set_restraint_weight(&mut self, restraint: RestraintKey, weight: f64) -> Result<()> {
        if !self.restraints.contains_key(restraint) {
            return Err(ModelError::UnknownRestraint);
        }
        self.weights.insert(restraint, weight);
        Ok(())
    }

    /// Returns a restraint's weight.
    pub fn restraint_weight(&self, restraint: RestraintKey) -> Result<f64> {
        self.weights
            .get(restraint)
            .copied()
            .ok_or(ModelError::UnknownRestraint)
    }

    // ------------------------------------------------------------------
    // Modes
    // ------------------------------------------------------------------

    /// Toggles incremental evaluation.
    ///
    /// Turning it on forces a full pass on the next evaluation to seed the
    /// incremental state.
    pub fn set_incremental(&mut self, enabled: bool) {
        if enabled && !self.incremental {
            self.first_incremental = true;
        }
        self.incremental = enabled;
    }

    /// Whether incremental evaluation is on.
    pub fn is_incremental(&self) -> bool {
        self.incremental
    }

    /// Toggles statistics gathering. Turning it off does not clear
    /// existing statistics.
    pub fn set_gather_statistics(&mut self, enabled: bool) {
        self.gather_statistics = enabled;
    }

    /// Whether statistics gathering is on.
    pub fn gather_statistics(&self) -> bool {
        self.gather_statistics
    }

    /// Returns everything gathered so far.
    pub fn statistics_summary(&self) -> StatisticsSummary {
        StatisticsSummary {
            states: self
                .state_order
                .iter()
                .filter_map(|&key| self.state_stats.get(key).cloned())
                .collect(),
            restraints: self
                .restraint_order
                .iter()
                .filter_map(|&key| self.restraint_stats.get(key).cloned())
                .collect(),
        }
    }

    // ------------------------------------------------------------------
    // Statistics recording
    // ------------------------------------------------------------------

    fn record_state_before(&mut self, key: StateKey, name: String, elapsed: Duration) {
        if !self.state_stats.contains_key(key) {
            self.state_stats.insert(
                key,
                StateStats {
                    name,
                    ..StateStats::default()
                },
            );
        }
        if let Some(stats) = self.state_stats.get_mut(key) {
            stats.record_before(elapsed);
        }
    }

    fn record_state_after(&mut self, key: StateKey, name: String, elapsed: Duration) {
        if !self.state_stats.contains_key(key) {
            self.state_stats.insert(
                key,
                StateStats {
                    name,
                    ..StateStats::default()
                },
            );
        }
        if let Some(stats) = self.state_stats.get_mut(key) {
            stats.record_after(elapsed);
        }
    }

    fn record_restraint(&mut self, key: RestraintKey, name: String, elapsed: Duration, score: f64) {
        if !self.restraint_stats.contains_key(key) {
            self.restraint_stats.insert(
                key,
                RestraintStats {
                    name,
                    ..RestraintStats::default()
                },
            );
        }
        if let Some(stats) = self.restraint_stats.get_mut(key) {
            stats.record(elapsed, score);
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}
