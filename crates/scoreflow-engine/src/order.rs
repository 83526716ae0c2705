//! Topological ordering of score states.

use petgraph::algo::toposort;
use scoreflow_core::{ModelError, Result};

use crate::graph::{DependencyGraph, DependencyNode};
use crate::model::StateKey;

/// Produces the total score state order implied by the dependency graph.
///
/// For every path `a -> ... -> b` between two states, `a` comes first.
/// Ties between independent states are broken by graph insertion order,
/// which follows registration order, so the result is deterministic for a
/// fixed registration sequence.
///
/// Fails with [`ModelError::CyclicDependency`] if the graph has a cycle;
/// `name_of` supplies the entity name for the report. Edges are never
/// dropped to force an order.
pub fn score_state_order<F>(graph: &DependencyGraph, name_of: F) -> Result<Vec<StateKey>>
where
    F: Fn(DependencyNode) -> String,
{
    match toposort(graph.petgraph(), None) {
        Ok(sorted) => Ok(sorted
            .into_iter()
            .filter_map(|index| match graph.node_weight(index) {
                DependencyNode::State(key) => Some(key),
                _ => None,
            })
            .collect()),
        Err(cycle) => Err(ModelError::CyclicDependency {
            entity: name_of(graph.node_weight(cycle.node_id())),
        }),
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use scoreflow_core::{EntityTable, ScoreState};
    use scoreflow_test::{new_event_log, RecordingState, X};

    use super::*;

    fn build_order(
        table: &EntityTable,
        states: &SlotMap<StateKey, Box<dyn ScoreState>>,
    ) -> Result<Vec<StateKey>> {
        let list: Vec<(StateKey, &dyn ScoreState)> =
            states.iter().map(|(k, s)| (k, s.as_ref())).collect();
        let graph = DependencyGraph::build(&list, &[], table)?;
        score_state_order(&graph, |node| match node {
            DependencyNode::State(key) => states[key].name().to_string(),
            _ => "<entity>".to_string(),
        })
    }

    #[test]
    fn test_producers_come_before_consumers() {
        let mut table = EntityTable::new();
        let a = table.add_particle("a").unwrap();
        let b = table.add_particle("b").unwrap();
        let c = table.add_particle("c").unwrap();
        for p in [a, b, c] {
            table.add_attribute(p, X, 0.0).unwrap();
        }

        // Register the downstream state first; the order must still put
        // the producer of b ahead of its consumer.
        let log = new_event_log();
        let mut states: SlotMap<StateKey, Box<dyn ScoreState>> = SlotMap::with_key();
        let bc = states.insert(Box::new(RecordingState::new(
            "bc",
            vec![b],
            vec![c],
            log.clone(),
        )));
        let ab = states.insert(Box::new(RecordingState::new(
            "ab",
            vec![a],
            vec![b],
            log.clone(),
        )));

        let order = build_order(&table, &states).unwrap();
        assert_eq!(order, vec![ab, bc]);
    }

    #[test]
    fn test_tie_break_between_independent_states_is_deterministic() {
        let mut table = EntityTable::new();
        let a = table.add_particle("a").unwrap();
        let b = table.add_particle("b").unwrap();
        table.add_attribute(a, X, 0.0).unwrap();
        table.add_attribute(b, X, 0.0).unwrap();

        let log = new_event_log();
        let mut states: SlotMap<StateKey, Box<dyn ScoreState>> = SlotMap::with_key();
        let first = states.insert(Box::new(RecordingState::new(
            "first",
            vec![],
            vec![a],
            log.clone(),
        )));
        let second = states.insert(Box::new(RecordingState::new(
            "second",
            vec![],
            vec![b],
            log.clone(),
        )));

        // Independent states may land in either order, but the order is a
        // pure function of the registration sequence.
        let order = build_order(&table, &states).unwrap();
        assert_eq!(order.len(), 2);
        assert!(order.contains(&first));
        assert!(order.contains(&second));
        assert_eq!(build_order(&table, &states).unwrap(), order);
    }

    #[test]
    fn test_cycle_is_a_configuration_error() {
        let mut table = EntityTable::new();
        let p1 = table.add_particle("p1").unwrap();
        let p2 = table.add_particle("p2").unwrap();
        table.add_attribute(p1, X, 0.0).unwrap();
        table.add_attribute(p2, X, 0.0).unwrap();

        let log = new_event_log();
        let mut states: SlotMap<StateKey, Box<dyn ScoreState>> = SlotMap::with_key();
        states.insert(Box::new(RecordingState::new(
            "s1",
            vec![p2],
            vec![p1],
            log.clone(),
        )));
        states.insert(Box::new(RecordingState::new(
            "s2",
            vec![p1],
            vec![p2],
            log.clone(),
        )));

        let err = build_order(&table, &states).unwrap_err();
        assert!(matches!(err, ModelError::CyclicDependency { .. }));
    }
}
