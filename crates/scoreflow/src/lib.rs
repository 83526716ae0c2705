//! ScoreFlow - dependency-graph incremental evaluation
//!
//! A model owns mutable state entities (particles and containers),
//! scheduled units that maintain derived state (score states), and scoring
//! units that consume all of that state to produce a scalar value and
//! optional gradients (restraints). The engine orders the score states by
//! their declared dependencies, runs only what the requested restraints
//! need, and can evaluate incrementally while staying numerically
//! consistent with full evaluation.
//!
//! # Example
//!
//! ```
//! use scoreflow::Model;
//! use scoreflow_test::{AttributeSumRestraint, ScaleState, X};
//!
//! let mut model = Model::new();
//! let a = model.add_particle("a").unwrap();
//! let b = model.add_particle("b").unwrap();
//! model.table_mut().add_attribute(a, X, 1.0).unwrap();
//! model.table_mut().add_attribute(b, X, 0.0).unwrap();
//!
//! // b is derived state: kept at 2 * a by a score state.
//! model
//!     .add_score_state(Box::new(ScaleState::new("double", a, b, X, 2.0)))
//!     .unwrap();
//! model
//!     .add_restraint(Box::new(AttributeSumRestraint::new("sum-b", vec![b], X)))
//!     .unwrap();
//!
//! assert_eq!(model.evaluate(false).unwrap(), 2.0);
//!
//! model.table_mut().set_attribute(a, X, 3.0).unwrap();
//! assert_eq!(model.evaluate(false).unwrap(), 6.0);
//! ```

pub use scoreflow_config::{ConfigError, EngineConfig, ValidationConfig};
pub use scoreflow_core::{
    AccessMode, ContainerKey, Containers, DerivativeAccumulator, EntityTable, FloatKey,
    ModelError, ParticleKey, Particles, Restraint, Result, ScoreState, Stage,
};
pub use scoreflow_engine::{
    DependencyGraph, DependencyNode, Model, RestraintKey, RestraintStats, StateKey, StateStats,
    StatisticsSummary,
};

/// Everything most client code needs.
pub mod prelude {
    pub use scoreflow_config::EngineConfig;
    pub use scoreflow_core::{
        DerivativeAccumulator, EntityTable, FloatKey, ModelError, Restraint, Result, ScoreState,
        Stage,
    };
    pub use scoreflow_engine::{Model, RestraintKey, StateKey};
}
