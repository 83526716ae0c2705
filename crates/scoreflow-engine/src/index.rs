//! The dependency index: per-restraint upstream score state bitsets.

use std::collections::HashMap;

use fixedbitset::FixedBitSet;
use petgraph::visit::{Dfs, Reversed};

use crate::graph::{DependencyGraph, DependencyNode};
use crate::model::{RestraintKey, StateKey};

/// Computes, for each restraint, the bitset of score states in its upstream
/// closure, indexed by position in `state_order`.
///
/// A reverse reachability walk from the restraint's node collects every
/// state reachable through "consumes" edges, directly or via containers and
/// particles. The cost is linear in the restraint's upstream subgraph; the
/// caller caches the result until the state order changes.
pub fn restraint_dependencies(
    graph: &DependencyGraph,
    restraints: &[RestraintKey],
    state_order: &[StateKey],
) -> Vec<FixedBitSet> {
    let position: HashMap<StateKey, usize> = state_order
        .iter()
        .enumerate()
        .map(|(index, &key)| (key, index))
        .collect();

    restraints
        .iter()
        .map(|&restraint| {
            let mut bits = FixedBitSet::with_capacity(state_order.len());
            if let Some(start) = graph.node(DependencyNode::Restraint(restraint)) {
                let reversed = Reversed(graph.petgraph());
                let mut dfs = Dfs::new(reversed, start);
                while let Some(found) = dfs.next(reversed) {
                    if let DependencyNode::State(state) = graph.node_weight(found) {
                        if let Some(&index) = position.get(&state) {
                            bits.set(index, true);
                        }
                    }
                }
            }
            bits
        })
        .collect()
}
