//! ScoreFlow Engine - dependency-graph evaluation scheduling
//!
//! This crate turns the declared input/output sets of registered score
//! states and restraints into a cached evaluation schedule:
//! - [`graph`] builds the producer/consumer dependency graph
//! - [`order`] topologically sorts the score states
//! - [`index`] caches, per restraint, the bitset of score states it needs
//! - [`model`] owns the entities and runs the evaluation lifecycle
//! - [`stats`] gathers optional per-unit timing and score statistics
//!
//! Scheduling is strictly single-threaded; the only shared-state discipline
//! is the declared-access contract enforced (in debug builds) around every
//! hook call.

mod access;

pub mod graph;
pub mod index;
pub mod model;
pub mod order;
pub mod stats;

pub use graph::{DependencyGraph, DependencyNode};
pub use model::{Model, RestraintKey, StateKey};
pub use stats::{RestraintStats, StateStats, StatisticsSummary};
