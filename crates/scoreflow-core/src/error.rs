//! Error types for ScoreFlow.

use thiserror::Error;

use crate::entity::{AccessMode, FloatKey};

/// Main error type for ScoreFlow operations.
///
/// Variants fall into four families:
/// - usage errors (the caller violated the API contract),
/// - configuration errors (the registered units cannot be scheduled),
/// - internal-consistency errors (the engine or a unit drifted from ground
///   truth; only checked in validation builds but always fatal),
/// - declared-access violations (a unit touched a particle it never declared).
#[derive(Debug, Error)]
pub enum ModelError {
    /// The caller violated the API contract.
    #[error("usage error: {0}")]
    Usage(String),

    /// The registered score states form a dependency cycle.
    #[error("cyclic dependency involving \"{entity}\": the score states cannot be ordered")]
    CyclicDependency {
        /// Name of an entity on the cycle.
        entity: String,
    },

    /// Two score states both declared the same entity as an output.
    #[error("conflicting output declarations: \"{first}\" and \"{second}\" both produce \"{target}\"")]
    OutputConflict {
        /// Name of the score state that declared the output first.
        first: String,
        /// Name of the score state with the conflicting declaration.
        second: String,
        /// Name of the produced particle or container.
        target: String,
    },

    /// Incremental and full evaluation disagree on the total score.
    #[error(
        "incremental and non-incremental evaluation do not agree: \
         incremental gets {incremental} but non-incremental gets {full}"
    )]
    InconsistentIncremental {
        /// Score produced by the incremental path.
        incremental: f64,
        /// Score produced by the full recomputation.
        full: f64,
    },

    /// Incremental and full evaluation disagree on a derivative.
    #[error(
        "derivatives do not match in incremental vs non-incremental for \
         particle \"{particle}\" on attribute {attribute}: \
         incremental was {incremental} whereas regular was {full}"
    )]
    InconsistentDerivative {
        /// Name of the particle carrying the derivative.
        particle: String,
        /// The attribute slot that disagrees.
        attribute: FloatKey,
        /// Derivative accumulated by the incremental path.
        incremental: f64,
        /// Derivative produced by the full recomputation.
        full: f64,
    },

    /// A unit accessed a particle outside its declared sets.
    #[error("\"{unit}\" is not allowed to {mode} particle \"{particle}\": it is not in the declared {mode} set")]
    AccessViolation {
        /// Name of the offending score state or restraint.
        unit: String,
        /// Name of the particle that was touched.
        particle: String,
        /// Whether the forbidden access was a read or a write.
        mode: AccessMode,
    },

    /// A committed attribute or derivative is NaN or infinite.
    #[error("non-finite value {value} committed on particle \"{particle}\" attribute {attribute}")]
    NonFinite {
        /// Name of the particle carrying the bad value.
        particle: String,
        /// The attribute slot holding the bad value.
        attribute: FloatKey,
        /// The offending value.
        value: f64,
    },

    /// A particle key does not resolve to a live particle.
    #[error("unknown particle: the key does not refer to a particle in this model")]
    UnknownParticle,

    /// A container key does not resolve to a live container.
    #[error("unknown container: the key does not refer to a container in this model")]
    UnknownContainer,

    /// A restraint key does not resolve to a registered restraint.
    #[error("unknown restraint: restraints must be added to the model before evaluating them")]
    UnknownRestraint,

    /// A score state key does not resolve to a registered score state.
    #[error("unknown score state: score states must be added to the model before use")]
    UnknownScoreState,

    /// An attribute slot was read before being added to the particle.
    #[error("particle \"{particle}\" has no attribute {attribute}")]
    MissingAttribute {
        /// Name of the particle.
        particle: String,
        /// The missing attribute slot.
        attribute: FloatKey,
    },

    /// Internal error (should not occur in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for ScoreFlow operations.
pub type Result<T> = std::result::Result<T, ModelError>;
