//! Evaluation statistics.
//!
//! Gathering is toggled on the model and never changes evaluation results;
//! the report is read-only.

use std::fmt;
use std::time::Duration;

/// Timing totals for one score state.
#[derive(Debug, Clone, Default)]
pub struct StateStats {
    /// Name of the score state.
    pub name: String,
    /// Number of `before` hook invocations.
    pub before_calls: u64,
    /// Total wall time spent in the `before` hook.
    pub before_time: Duration,
    /// Number of `after` hook invocations.
    pub after_calls: u64,
    /// Total wall time spent in the `after` hook.
    pub after_time: Duration,
}

impl StateStats {
    /// Records one `before` hook invocation.
    pub fn record_before(&mut self, elapsed: Duration) {
        self.before_calls += 1;
        self.before_time += elapsed;
    }

    /// Records one `after` hook invocation.
    pub fn record_after(&mut self, elapsed: Duration) {
        self.after_calls += 1;
        self.after_time += elapsed;
    }
}

/// Timing and score aggregates for one restraint.
#[derive(Debug, Clone)]
pub struct RestraintStats {
    /// Name of the restraint.
    pub name: String,
    /// Number of evaluations.
    pub evaluations: u64,
    /// Total wall time spent evaluating.
    pub total_time: Duration,
    /// Smallest weighted score seen.
    pub min_score: f64,
    /// Largest weighted score seen.
    pub max_score: f64,
    /// Sum of all weighted scores seen.
    pub total_score: f64,
}

impl Default for RestraintStats {
    fn default() -> Self {
        Self {
            name: String::new(),
            evaluations: 0,
            total_time: Duration::ZERO,
            min_score: f64::INFINITY,
            max_score: f64::NEG_INFINITY,
            total_score: 0.0,
        }
    }
}

impl RestraintStats {
    /// Records one evaluation.
    pub fn record(&mut self, elapsed: Duration, score: f64) {
        self.evaluations += 1;
        self.total_time += elapsed;
        self.min_score = self.min_score.min(score);
        self.max_score = self.max_score.max(score);
        self.total_score += score;
    }

    /// Returns the mean score across all evaluations.
    pub fn average_score(&self) -> f64 {
        if self.evaluations == 0 {
            0.0
        } else {
            self.total_score / self.evaluations as f64
        }
    }
}

/// Read-only report of everything gathered so far.
#[derive(Debug, Clone, Default)]
pub struct StatisticsSummary {
    /// Per-state entries, in schedule order.
    pub states: Vec<StateStats>,
    /// Per-restraint entries, in registration order.
    pub restraints: Vec<RestraintStats>,
}

impl fmt::Display for StatisticsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "score states:")?;
        for s in &self.states {
            writeln!(
                f,
                "  \"{}\": before {} calls in {:?}, after {} calls in {:?}",
                s.name, s.before_calls, s.before_time, s.after_calls, s.after_time
            )?;
        }
        writeln!(f, "restraints:")?;
        for r in &self.restraints {
            writeln!(
                f,
                "  \"{}\": {} evaluations in {:?}, min {} max {} mean {}",
                r.name,
                r.evaluations,
                r.total_time,
                r.min_score,
                r.max_score,
                r.average_score()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restraint_stats_aggregates() {
        let mut stats = RestraintStats {
            name: "r".into(),
            ..Default::default()
        };
        stats.record(Duration::from_micros(5), 2.0);
        stats.record(Duration::from_micros(5), -1.0);
        assert_eq!(stats.evaluations, 2);
        assert_eq!(stats.min_score, -1.0);
        assert_eq!(stats.max_score, 2.0);
        assert_eq!(stats.average_score(), 0.5);
        assert_eq!(stats.total_time, Duration::from_micros(10));
    }

    #[test]
    fn test_state_stats_counts_hooks_separately() {
        let mut stats = StateStats {
            name: "s".into(),
            ..Default::default()
        };
        stats.record_before(Duration::from_micros(3));
        stats.record_before(Duration::from_micros(3));
        stats.record_after(Duration::from_micros(1));
        assert_eq!(stats.before_calls, 2);
        assert_eq!(stats.after_calls, 1);
        assert_eq!(stats.before_time, Duration::from_micros(6));
    }

    #[test]
    fn test_summary_display_names_units() {
        let summary = StatisticsSummary {
            states: vec![StateStats {
                name: "centroid".into(),
                ..Default::default()
            }],
            restraints: vec![RestraintStats {
                name: "distance".into(),
                ..Default::default()
            }],
        };
        let text = summary.to_string();
        assert!(text.contains("centroid"));
        assert!(text.contains("distance"));
    }
}
