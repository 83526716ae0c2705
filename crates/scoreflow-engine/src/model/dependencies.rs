//! Cached dependency computation: graph, state order, and dependency index.

use fixedbitset::FixedBitSet;
use slotmap::SecondaryMap;
use tracing::debug;

use scoreflow_core::{ModelError, Restraint, Result, ScoreState};

use super::{Model, RestraintKey, StateKey};
use crate::graph::{DependencyGraph, DependencyNode};
use crate::{index, order};

impl Model {
    /// Drops the cached schedule. Called on every registration change.
    pub(super) fn reset_dependencies(&mut self) {
        self.ordered_states.clear();
        self.ordered_restraints.clear();
        self.restraint_index.clear();
        self.dependencies.clear();
        self.has_dependencies = false;
        // The incremental shadow totals assume a fixed entity set.
        self.first_incremental = true;
    }

    pub(super) fn ensure_dependencies(&mut self) -> Result<()> {
        if !self.has_dependencies {
            self.compute_dependencies()?;
        }
        Ok(())
    }

    fn compute_dependencies(&mut self) -> Result<()> {
        debug!(
            event = "compute_dependencies",
            restraints = self.restraint_order.len(),
            score_states = self.state_order.len(),
            particles = self.table.particle_count(),
        );
        let states: Vec<(StateKey, &dyn ScoreState)> = self
            .state_order
            .iter()
            .map(|&key| (key, self.states[key].as_ref()))
            .collect();
        let restraints: Vec<(RestraintKey, &dyn Restraint)> = self
            .restraint_order
            .iter()
            .map(|&key| (key, self.restraints[key].as_ref()))
            .collect();

        let graph = DependencyGraph::build(&states, &restraints, &self.table)?;
        let ordered_states = order::score_state_order(&graph, |node| self.describe(node))?;
        let ordered_restraints = self.restraint_order.clone();
        let dependencies =
            index::restraint_dependencies(&graph, &ordered_restraints, &ordered_states);

        let mut restraint_index = SecondaryMap::new();
        for (position, &key) in ordered_restraints.iter().enumerate() {
            restraint_index.insert(key, position);
        }

        self.ordered_states = ordered_states;
        self.ordered_restraints = ordered_restraints;
        self.restraint_index = restraint_index;
        self.dependencies = dependencies;
        self.has_dependencies = true;
        debug!(
            event = "dependencies_ready",
            ordered_states = self.ordered_states.len()
        );
        Ok(())
    }

    /// Returns the score states the given restraints need, in schedule
    /// order.
    pub fn required_score_states(&mut self, restraints: &[RestraintKey]) -> Result<Vec<StateKey>> {
        self.ensure_dependencies()?;
        let bits = self.union_dependencies(restraints)?;
        Ok(self.selected_states(&bits))
    }

    /// ORs the cached dependency bitsets of the given restraints.
    pub(super) fn union_dependencies(&self, restraints: &[RestraintKey]) -> Result<FixedBitSet> {
        let mut bits = FixedBitSet::with_capacity(self.ordered_states.len());
        for &key in restraints {
            let position = self
                .restraint_index
                .get(key)
                .copied()
                .ok_or(ModelError::UnknownRestraint)?;
            bits.union_with(&self.dependencies[position]);
        }
        Ok(bits)
    }

    /// Maps a bitset over the cached state order back to keys.
    pub(super) fn selected_states(&self, bits: &FixedBitSet) -> Vec<StateKey> {
        self.ordered_states
            .iter()
            .enumerate()
            .filter(|&(position, _)| bits.contains(position))
            .map(|(_, &key)| key)
            .collect()
    }

    fn describe(&self, node: DependencyNode) -> String {
        match node {
            DependencyNode::State(key) => self
                .states
                .get(key)
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| "<removed score state>".into()),
            DependencyNode::Restraint(key) => self
                .restraints
                .get(key)
                .map(|r| r.name().to_string())
                .unwrap_or_else(|| "<removed restraint>".into()),
            DependencyNode::Particle(particle) => self
                .table
                .particle_name(particle)
                .map(str::to_string)
                .unwrap_or_else(|_| "<removed particle>".into()),
            DependencyNode::Container(container) => self
                .table
                .container_name(container)
                .map(str::to_string)
                .unwrap_or_else(|_| "<removed container>".into()),
        }
    }
}
