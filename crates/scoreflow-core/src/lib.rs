//! ScoreFlow Core - Entity storage and evaluation traits
//!
//! This crate provides the fundamental abstractions for ScoreFlow:
//! - Arena-backed storage for particles and containers
//! - The evaluation stage state machine
//! - `ScoreState` and `Restraint` traits for schedulable units
//! - The error taxonomy shared by all ScoreFlow crates

pub mod entity;
pub mod error;
pub mod stage;
pub mod unit;

pub use entity::{
    AccessMode, ContainerKey, Containers, DerivativeAccumulator, EntityTable, FloatKey,
    ParticleKey, Particles,
};
pub use error::{ModelError, Result};
pub use stage::Stage;
pub use unit::{Restraint, ScoreState};
