//! The evaluation stage state machine.

use std::fmt;

/// Where the model currently is in an evaluation call.
///
/// Evaluation walks `NotEvaluating -> BeforeEvaluate -> Evaluate ->
/// AfterEvaluate -> NotEvaluating`. The stage is restored to
/// [`Stage::NotEvaluating`] on every exit path, including failed ones.
///
/// The stage gates what may be mutated: attribute values cannot change during
/// `Evaluate` or `AfterEvaluate`, and derivatives can only be accumulated
/// during `Evaluate`, `AfterEvaluate`, or outside evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// No evaluation in progress.
    #[default]
    NotEvaluating,
    /// Score state `before` hooks are running, in dependency order.
    BeforeEvaluate,
    /// Restraints are being evaluated.
    Evaluate,
    /// Score state `after` hooks are running, in reverse dependency order.
    AfterEvaluate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::NotEvaluating => "not-evaluating",
            Stage::BeforeEvaluate => "before-evaluate",
            Stage::Evaluate => "evaluate",
            Stage::AfterEvaluate => "after-evaluate",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stage_is_not_evaluating() {
        assert_eq!(Stage::default(), Stage::NotEvaluating);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::BeforeEvaluate.to_string(), "before-evaluate");
        assert_eq!(Stage::AfterEvaluate.to_string(), "after-evaluate");
    }
}
