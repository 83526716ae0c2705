//! Schedulable unit traits: score states and restraints.
//!
//! Score states maintain derived state around restraint evaluation; the
//! engine orders them by their declared dependencies. Restraints consume
//! state and contribute a scalar score plus optional gradients. Concrete
//! kinds (geometric potentials, image scores, ...) implement these traits;
//! the scheduling engine never needs to change when a new kind is added.

use crate::entity::{Containers, DerivativeAccumulator, EntityTable, Particles};
use crate::error::Result;

/// A scheduled unit with `before`/`after` hooks and declared input/output
/// sets, used to maintain derived state.
///
/// # Declared sets
///
/// The engine trusts the declared sets to build the dependency graph and,
/// in debug builds, enforces them: a hook touching an undeclared particle
/// fails the evaluation with an access violation.
///
/// The `after` hook is assumed to be the logical reverse of the `before`
/// hook: it reads what `before` wrote and writes (derivatives) into what
/// `before` read. A state whose update direction differs must be split into
/// two states.
///
/// # Implementation notes
///
/// - Mutate only the declared output particles and containers in
///   [`before_evaluate`](ScoreState::before_evaluate).
/// - Keep the declared sets stable between registrations; the engine
///   re-reads them only when the registration set changes.
pub trait ScoreState: Send {
    /// Human-readable name, used in logs and error reports.
    fn name(&self) -> &str;

    /// Called before restraints are evaluated, in dependency order.
    ///
    /// Updates the declared output particles/containers from the declared
    /// inputs.
    fn before_evaluate(&mut self, table: &mut EntityTable) -> Result<()>;

    /// Called after restraints are evaluated, in reverse dependency order.
    ///
    /// When `accum` is present, propagates derivatives from the declared
    /// outputs back onto the declared inputs.
    fn after_evaluate(
        &mut self,
        table: &mut EntityTable,
        accum: Option<&DerivativeAccumulator>,
    ) -> Result<()>;

    /// Particles read by [`before_evaluate`](ScoreState::before_evaluate).
    fn input_particles(&self) -> Particles;

    /// Containers read by [`before_evaluate`](ScoreState::before_evaluate).
    fn input_containers(&self) -> Containers {
        Containers::new()
    }

    /// Particles written by [`before_evaluate`](ScoreState::before_evaluate).
    fn output_particles(&self) -> Particles;

    /// Containers written by [`before_evaluate`](ScoreState::before_evaluate).
    fn output_containers(&self) -> Containers {
        Containers::new()
    }
}

/// A scoring unit that consumes state and produces a scalar contribution,
/// with optional gradients written into the particles it reads.
///
/// Restraints declare no outputs: they contribute score, not state. Their
/// relative evaluation order therefore never affects correctness.
pub trait Restraint: Send {
    /// Human-readable name, used in logs and error reports.
    fn name(&self) -> &str;

    /// Computes this restraint's score contribution.
    ///
    /// When `accum` is present, also accumulates first derivatives into the
    /// declared input particles through it.
    fn evaluate(
        &mut self,
        table: &mut EntityTable,
        accum: Option<&DerivativeAccumulator>,
    ) -> Result<f64>;

    /// Incremental variant of [`evaluate`](Restraint::evaluate).
    ///
    /// May reuse state accumulated since the previous call, recomputing only
    /// contributions of changed particles (see
    /// [`EntityTable::is_changed`]). The engine guarantees a full
    /// [`evaluate`](Restraint::evaluate) call seeds that state before the
    /// first incremental call. Defaults to a full evaluation.
    fn incremental_evaluate(
        &mut self,
        table: &mut EntityTable,
        accum: Option<&DerivativeAccumulator>,
    ) -> Result<f64> {
        self.evaluate(table, accum)
    }

    /// Particles read by [`evaluate`](Restraint::evaluate).
    fn input_particles(&self) -> Particles;

    /// Containers read by [`evaluate`](Restraint::evaluate).
    fn input_containers(&self) -> Containers {
        Containers::new()
    }

    /// Whether this restraint is eligible for the incremental path.
    fn is_incremental(&self) -> bool {
        false
    }
}
