//! Shared test fixtures for ScoreFlow crates.
//!
//! This crate provides simple score states and restraints for testing the
//! evaluation engine. It depends only on `scoreflow-core` so that every
//! other crate can use it as a dev-dependency without cycles.
//!
//! - [`restraints`] - scoring fixtures (attribute sums, a harmonic distance
//!   potential, constants)
//! - [`states`] - scheduling fixtures (scaling, centroid, container
//!   gathering, pure recording)
//!
//! # Usage
//!
//! Add as a dev-dependency in your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! scoreflow-test = { workspace = true }
//! ```

use std::sync::{Arc, Mutex};

use scoreflow_core::FloatKey;

pub mod restraints;
pub mod states;

pub use restraints::{
    AttributeSumRestraint, ConstantRestraint, ContainerSumRestraint, HarmonicDistanceRestraint,
};
pub use states::{CentroidState, GatherState, RecordingState, ScaleState, TrespassingState};

/// Conventional coordinate attribute slots used by the fixtures.
pub const X: FloatKey = FloatKey::new(0);
/// See [`X`].
pub const Y: FloatKey = FloatKey::new(1);
/// See [`X`].
pub const Z: FloatKey = FloatKey::new(2);

/// A shared log of hook invocations, written by the recording fixtures.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Creates an empty event log.
pub fn new_event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Snapshots the events recorded so far.
pub fn recorded(log: &EventLog) -> Vec<String> {
    log.lock().expect("event log poisoned").clone()
}

/// Clears the recorded events.
pub fn clear_events(log: &EventLog) {
    log.lock().expect("event log poisoned").clear();
}

pub(crate) fn push_event(log: &Option<EventLog>, event: String) {
    if let Some(log) = log {
        log.lock().expect("event log poisoned").push(event);
    }
}
