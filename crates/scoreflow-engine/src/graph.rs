//! Dependency graph construction.
//!
//! The graph has one node per restraint, score state, container, and
//! particle referenced by some declared set, and an edge `a -> b` whenever
//! `a` must be up to date before `b` may run or be read. Restraint nodes
//! are always sinks: they consume state and produce only score.
//!
//! Edge rules:
//! - restraint inputs: `input -> restraint`
//! - score state inputs: `input -> state`; outputs: `state -> output`
//! - container membership: `member -> container`, discovered by expanding
//!   every referenced container to a fixed point
//!
//! Two score states declaring the same output is a configuration error and
//! is reported here, not silently resolved. Declarations referencing
//! removed entities are skipped; they surface when the unit touches them.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use scoreflow_core::{
    ContainerKey, EntityTable, ModelError, ParticleKey, Restraint, Result, ScoreState,
};

use crate::model::{RestraintKey, StateKey};

/// A node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyNode {
    /// A registered restraint.
    Restraint(RestraintKey),
    /// A registered score state.
    State(StateKey),
    /// A particle referenced by some declared set.
    Particle(ParticleKey),
    /// A container referenced by some declared set or membership list.
    Container(ContainerKey),
}

/// The directed producer/consumer graph over all registered units.
///
/// Rebuilt whenever the registered restraint or score state sets change,
/// reused otherwise. Node insertion follows registration order, which keeps
/// the downstream topological sort deterministic.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<DependencyNode, ()>,
    index: HashMap<DependencyNode, NodeIndex>,
}

impl DependencyGraph {
    /// Builds the graph from the registered units' declared sets.
    ///
    /// Fails only on conflicting output declarations; everything else about
    /// a malformed registration surfaces later, during the sort or when a
    /// unit runs.
    pub fn build(
        states: &[(StateKey, &dyn ScoreState)],
        restraints: &[(RestraintKey, &dyn Restraint)],
        table: &EntityTable,
    ) -> Result<Self> {
        let mut builder = Builder {
            graph: DiGraph::new(),
            index: HashMap::new(),
            discovered_containers: Vec::new(),
        };

        for &(key, _) in states {
            builder.intern(DependencyNode::State(key));
        }
        for &(key, _) in restraints {
            builder.intern(DependencyNode::Restraint(key));
        }

        // Outputs before inputs, so a conflict names the earlier registrant.
        let mut producers: HashMap<DependencyNode, usize> = HashMap::new();
        for (slot, &(key, state)) in states.iter().enumerate() {
            let sv = builder.index[&DependencyNode::State(key)];
            for container in state.output_containers() {
                if !table.contains_container(container) {
                    continue;
                }
                let node = DependencyNode::Container(container);
                claim_output(&mut producers, states, table, node, slot)?;
                let cv = builder.intern(node);
                builder.connect(sv, cv);
            }
            for particle in state.output_particles() {
                if !table.contains_particle(particle) {
                    continue;
                }
                let node = DependencyNode::Particle(particle);
                claim_output(&mut producers, states, table, node, slot)?;
                let pv = builder.intern(node);
                builder.connect(sv, pv);
            }
        }

        for &(key, state) in states {
            let sv = builder.index[&DependencyNode::State(key)];
            builder.connect_inputs(
                table,
                &state.input_particles(),
                &state.input_containers(),
                sv,
            );
        }
        for &(key, restraint) in restraints {
            let rv = builder.index[&DependencyNode::Restraint(key)];
            builder.connect_inputs(
                table,
                &restraint.input_particles(),
                &restraint.input_containers(),
                rv,
            );
        }

        // Expand every referenced container to its members, merging newly
        // discovered containers until the frontier is exhausted.
        let mut next = 0;
        while next < builder.discovered_containers.len() {
            let container = builder.discovered_containers[next];
            next += 1;
            let cv = builder.index[&DependencyNode::Container(container)];
            let members = table.container_particles(container)?.to_vec();
            for particle in members {
                if table.contains_particle(particle) {
                    let pv = builder.intern(DependencyNode::Particle(particle));
                    builder.connect(pv, cv);
                }
            }
            let subcontainers = table.container_subcontainers(container)?.to_vec();
            for sub in subcontainers {
                if table.contains_container(sub) {
                    let inner = builder.intern(DependencyNode::Container(sub));
                    builder.connect(inner, cv);
                }
            }
        }

        Ok(Self {
            graph: builder.graph,
            index: builder.index,
        })
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the entity has a node in the graph.
    pub fn contains(&self, node: DependencyNode) -> bool {
        self.index.contains_key(&node)
    }

    /// Whether the graph has the edge `from -> to`.
    pub fn has_edge(&self, from: DependencyNode, to: DependencyNode) -> bool {
        match (self.index.get(&from), self.index.get(&to)) {
            (Some(&a), Some(&b)) => self.graph.find_edge(a, b).is_some(),
            _ => false,
        }
    }

    pub(crate) fn node(&self, node: DependencyNode) -> Option<NodeIndex> {
        self.index.get(&node).copied()
    }

    pub(crate) fn node_weight(&self, index: NodeIndex) -> DependencyNode {
        self.graph[index]
    }

    pub(crate) fn petgraph(&self) -> &DiGraph<DependencyNode, ()> {
        &self.graph
    }
}

struct Builder {
    graph: DiGraph<DependencyNode, ()>,
    index: HashMap<DependencyNode, NodeIndex>,
    discovered_containers: Vec<ContainerKey>,
}

impl Builder {
    fn intern(&mut self, node: DependencyNode) -> NodeIndex {
        if let Some(&existing) = self.index.get(&node) {
            return existing;
        }
        let added = self.graph.add_node(node);
        self.index.insert(node, added);
        if let DependencyNode::Container(container) = node {
            self.discovered_containers.push(container);
        }
        added
    }

    fn connect(&mut self, from: NodeIndex, to: NodeIndex) {
        // update_edge dedups: declared sets may repeat entities.
        self.graph.update_edge(from, to, ());
    }

    fn connect_inputs(
        &mut self,
        table: &EntityTable,
        particles: &[ParticleKey],
        containers: &[ContainerKey],
        consumer: NodeIndex,
    ) {
        for &container in containers {
            if table.contains_container(container) {
                let cv = self.intern(DependencyNode::Container(container));
                self.connect(cv, consumer);
            }
        }
        for &particle in particles {
            if table.contains_particle(particle) {
                let pv = self.intern(DependencyNode::Particle(particle));
                self.connect(pv, consumer);
            }
        }
    }
}

fn claim_output(
    producers: &mut HashMap<DependencyNode, usize>,
    states: &[(StateKey, &dyn ScoreState)],
    table: &EntityTable,
    node: DependencyNode,
    slot: usize,
) -> Result<()> {
    match producers.get(&node) {
        Some(&earlier) if earlier != slot => Err(ModelError::OutputConflict {
            first: states[earlier].1.name().to_string(),
            second: states[slot].1.name().to_string(),
            target: describe_entity(table, node),
        }),
        Some(_) => Ok(()),
        None => {
            producers.insert(node, slot);
            Ok(())
        }
    }
}

fn describe_entity(table: &EntityTable, node: DependencyNode) -> String {
    match node {
        DependencyNode::Particle(particle) => table
            .particle_name(particle)
            .map(str::to_string)
            .unwrap_or_else(|_| "<removed particle>".into()),
        DependencyNode::Container(container) => table
            .container_name(container)
            .map(str::to_string)
            .unwrap_or_else(|_| "<removed container>".into()),
        DependencyNode::State(_) => "<score state>".into(),
        DependencyNode::Restraint(_) => "<restraint>".into(),
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use scoreflow_core::{EntityTable, Restraint, ScoreState};
    use scoreflow_test::{
        restraints::ContainerSumRestraint, AttributeSumRestraint, GatherState, ScaleState, X,
    };

    use super::*;

    #[test]
    fn test_edges_follow_declared_sets() {
        let mut table = EntityTable::new();
        let a = table.add_particle("a").unwrap();
        let b = table.add_particle("b").unwrap();
        table.add_attribute(a, X, 1.0).unwrap();
        table.add_attribute(b, X, 0.0).unwrap();

        let mut states: SlotMap<StateKey, Box<dyn ScoreState>> = SlotMap::with_key();
        let sk = states.insert(Box::new(ScaleState::new("scale", a, b, X, 2.0)));
        let mut restraints: SlotMap<RestraintKey, Box<dyn Restraint>> = SlotMap::with_key();
        let rk = restraints.insert(Box::new(AttributeSumRestraint::new("sum", vec![b], X)));

        let state_list: Vec<(StateKey, &dyn ScoreState)> =
            states.iter().map(|(k, s)| (k, s.as_ref())).collect();
        let restraint_list: Vec<(RestraintKey, &dyn Restraint)> =
            restraints.iter().map(|(k, r)| (k, r.as_ref())).collect();

        let graph = DependencyGraph::build(&state_list, &restraint_list, &table).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert!(graph.has_edge(
            DependencyNode::Particle(a),
            DependencyNode::State(sk)
        ));
        assert!(graph.has_edge(
            DependencyNode::State(sk),
            DependencyNode::Particle(b)
        ));
        assert!(graph.has_edge(
            DependencyNode::Particle(b),
            DependencyNode::Restraint(rk)
        ));
        // Restraints are sinks.
        assert!(!graph.has_edge(
            DependencyNode::Restraint(rk),
            DependencyNode::Particle(b)
        ));
    }

    #[test]
    fn test_output_conflict_is_fatal() {
        let mut table = EntityTable::new();
        let src = table.add_particle("src").unwrap();
        let shared = table.add_particle("shared").unwrap();
        table.add_attribute(src, X, 0.0).unwrap();
        table.add_attribute(shared, X, 0.0).unwrap();

        let mut states: SlotMap<StateKey, Box<dyn ScoreState>> = SlotMap::with_key();
        states.insert(Box::new(ScaleState::new("first", src, shared, X, 1.0)));
        states.insert(Box::new(ScaleState::new("second", src, shared, X, 2.0)));
        let state_list: Vec<(StateKey, &dyn ScoreState)> =
            states.iter().map(|(k, s)| (k, s.as_ref())).collect();

        let err = DependencyGraph::build(&state_list, &[], &table).unwrap_err();
        match err {
            ModelError::OutputConflict {
                first,
                second,
                target,
            } => {
                assert_eq!(first, "first");
                assert_eq!(second, "second");
                assert_eq!(target, "shared");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_containers_expand_to_members() {
        let mut table = EntityTable::new();
        let a = table.add_particle("a").unwrap();
        let b = table.add_particle("b").unwrap();
        table.add_attribute(a, X, 1.0).unwrap();
        table.add_attribute(b, X, 2.0).unwrap();
        let inner = table.add_container("inner").unwrap();
        let outer = table.add_container("outer").unwrap();
        table.set_container_members(inner, &[b], &[]).unwrap();
        table.set_container_members(outer, &[a], &[inner]).unwrap();

        let mut restraints: SlotMap<RestraintKey, Box<dyn Restraint>> = SlotMap::with_key();
        let rk = restraints.insert(Box::new(ContainerSumRestraint::new("sum", outer, X)));
        let restraint_list: Vec<(RestraintKey, &dyn Restraint)> =
            restraints.iter().map(|(k, r)| (k, r.as_ref())).collect();

        let graph = DependencyGraph::build(&[], &restraint_list, &table).unwrap();
        assert!(graph.has_edge(
            DependencyNode::Container(outer),
            DependencyNode::Restraint(rk)
        ));
        assert!(graph.has_edge(
            DependencyNode::Container(inner),
            DependencyNode::Container(outer)
        ));
        assert!(graph.has_edge(
            DependencyNode::Particle(b),
            DependencyNode::Container(inner)
        ));
        assert!(graph.has_edge(
            DependencyNode::Particle(a),
            DependencyNode::Container(outer)
        ));
    }

    #[test]
    fn test_computed_container_links_producer_to_consumer() {
        let mut table = EntityTable::new();
        let m = table.add_particle("m").unwrap();
        table.add_attribute(m, X, 1.0).unwrap();
        let computed = table.add_container("computed").unwrap();

        let mut states: SlotMap<StateKey, Box<dyn ScoreState>> = SlotMap::with_key();
        let sk = states.insert(Box::new(GatherState::new("gather", vec![m], computed)));
        let mut restraints: SlotMap<RestraintKey, Box<dyn Restraint>> = SlotMap::with_key();
        let rk = restraints.insert(Box::new(ContainerSumRestraint::new("sum", computed, X)));

        let state_list: Vec<(StateKey, &dyn ScoreState)> =
            states.iter().map(|(k, s)| (k, s.as_ref())).collect();
        let restraint_list: Vec<(RestraintKey, &dyn Restraint)> =
            restraints.iter().map(|(k, r)| (k, r.as_ref())).collect();

        let graph = DependencyGraph::build(&state_list, &restraint_list, &table).unwrap();
        assert!(graph.has_edge(
            DependencyNode::State(sk),
            DependencyNode::Container(computed)
        ));
        assert!(graph.has_edge(
            DependencyNode::Container(computed),
            DependencyNode::Restraint(rk)
        ));
        assert!(graph.has_edge(
            DependencyNode::Particle(m),
            DependencyNode::State(sk)
        ));
    }

    #[test]
    fn test_stale_declarations_are_skipped() {
        let mut table = EntityTable::new();
        let keep = table.add_particle("keep").unwrap();
        let gone = table.add_particle("gone").unwrap();
        table.add_attribute(keep, X, 0.0).unwrap();
        table.remove_particle(gone).unwrap();

        let mut restraints: SlotMap<RestraintKey, Box<dyn Restraint>> = SlotMap::with_key();
        let rk = restraints.insert(Box::new(AttributeSumRestraint::new(
            "sum",
            vec![keep, gone],
            X,
        )));
        let restraint_list: Vec<(RestraintKey, &dyn Restraint)> =
            restraints.iter().map(|(k, r)| (k, r.as_ref())).collect();

        let graph = DependencyGraph::build(&[], &restraint_list, &table).unwrap();
        assert!(graph.contains(DependencyNode::Particle(keep)));
        assert!(!graph.contains(DependencyNode::Particle(gone)));
        assert!(graph.has_edge(
            DependencyNode::Particle(keep),
            DependencyNode::Restraint(rk)
        ));
    }
}
