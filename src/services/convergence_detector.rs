//! Convergence detection for automated refinement phases.
//!
//! The detector is a small state machine over `(open_count, high_ratio)`
//! observations. All of its state lives in [`ConvergenceSnapshot`], which is
//! persisted in the document header so a resumed pipeline continues exactly
//! where it stopped.

use crate::domain::models::{ConvergenceSnapshot, IterationOutcome, RefinementConfig};

/// Stop-condition thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceThresholds {
    pub max_iterations: u32,
    pub min_observations: u32,
    pub stable_threshold: u32,
    pub open_threshold: u32,
    pub high_ratio_threshold: f64,
}

impl Default for ConvergenceThresholds {
    fn default() -> Self {
        Self::from(&RefinementConfig::default())
    }
}

impl From<&RefinementConfig> for ConvergenceThresholds {
    fn from(config: &RefinementConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            min_observations: config.min_observations,
            stable_threshold: config.stable_threshold,
            open_threshold: config.open_threshold,
            high_ratio_threshold: config.high_ratio_threshold,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConvergenceDetector {
    thresholds: ConvergenceThresholds,
    snapshot: ConvergenceSnapshot,
}

impl ConvergenceDetector {
    /// A detector with no observations.
    pub fn new(thresholds: ConvergenceThresholds) -> Self {
        Self::from_snapshot(thresholds, ConvergenceSnapshot::default())
    }

    /// Continue from a persisted snapshot.
    pub fn from_snapshot(thresholds: ConvergenceThresholds, snapshot: ConvergenceSnapshot) -> Self {
        Self {
            thresholds,
            snapshot,
        }
    }

    /// A detector primed with the metrics a phase starts from.
    ///
    /// The baseline counts as an observation and becomes the predecessor of
    /// the first iteration, so an iteration that changes nothing already
    /// registers as stable.
    pub fn primed(thresholds: ConvergenceThresholds, open_count: u32, high_ratio: f64) -> Self {
        let mut detector = Self::new(thresholds);
        detector.observe(open_count, high_ratio);
        detector
    }

    pub fn snapshot(&self) -> ConvergenceSnapshot {
        self.snapshot
    }

    /// Record one observation and return the updated snapshot.
    pub fn observe(&mut self, open_count: u32, high_ratio: f64) -> ConvergenceSnapshot {
        let snapshot = &mut self.snapshot;
        snapshot.stable_count = if snapshot.observations == 0 {
            0
        } else if open_count == snapshot.open_count {
            snapshot.stable_count + 1
        } else {
            0
        };
        snapshot.open_count = open_count;
        snapshot.high_ratio = high_ratio.clamp(0.0, 1.0);
        snapshot.observations += 1;
        if open_count > 0 || high_ratio > 0.0 {
            snapshot.observed_non_empty = true;
        }
        *snapshot
    }

    /// Whether the stop condition currently holds.
    ///
    /// Never true before `min_observations` data points, nor while every
    /// observation so far described an empty document.
    pub fn should_stop(&self) -> bool {
        let s = &self.snapshot;
        let t = &self.thresholds;
        if s.observations < t.min_observations || !s.observed_non_empty {
            return false;
        }
        s.stable_count >= t.stable_threshold
            || s.open_count <= t.open_threshold
            || s.high_ratio > t.high_ratio_threshold
    }

    /// Observe the metrics after iteration `iteration` and decide the outcome.
    pub fn record_iteration(&mut self, iteration: u32, open_count: u32, high_ratio: f64) -> IterationOutcome {
        self.observe(open_count, high_ratio);
        if self.should_stop() {
            IterationOutcome::Converged
        } else if iteration >= self.thresholds.max_iterations {
            IterationOutcome::MaxIterationsReached
        } else {
            IterationOutcome::Continued
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(detector: &mut ConvergenceDetector, opens: &[u32], ratio: f64) -> Vec<IterationOutcome> {
        let mut outcomes = Vec::new();
        for (i, open) in opens.iter().enumerate() {
            let outcome = detector.record_iteration(i as u32 + 1, *open, ratio);
            outcomes.push(outcome);
            if outcome.ends_phase() {
                break;
            }
        }
        outcomes
    }

    #[test]
    fn test_stable_sequence_stops_at_third_iteration() {
        let mut detector = ConvergenceDetector::new(ConvergenceThresholds::default());
        let outcomes = run(&mut detector, &[10, 10, 10, 10], 0.1);
        assert_eq!(
            outcomes,
            vec![
                IterationOutcome::Continued,
                IterationOutcome::Continued,
                IterationOutcome::Converged
            ]
        );
        assert_eq!(detector.snapshot().stable_count, 2);
    }

    #[test]
    fn test_unstable_sequence_hits_ceiling() {
        let mut detector = ConvergenceDetector::new(ConvergenceThresholds::default());
        let outcomes = run(&mut detector, &[20, 18, 16, 14, 12, 10, 8], 0.1);
        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes[4], IterationOutcome::MaxIterationsReached);
        assert!(outcomes[..4].iter().all(|o| *o == IterationOutcome::Continued));
    }

    #[test]
    fn test_low_open_count_waits_for_minimum_observations() {
        let mut detector = ConvergenceDetector::new(ConvergenceThresholds::default());
        assert_eq!(detector.record_iteration(1, 1, 0.1), IterationOutcome::Continued);
        assert_eq!(detector.record_iteration(2, 2, 0.1), IterationOutcome::Converged);
    }

    #[test]
    fn test_empty_observations_never_converge() {
        let mut detector = ConvergenceDetector::new(ConvergenceThresholds::default());
        let outcomes = run(&mut detector, &[0, 0, 0, 0, 0], 0.0);
        assert!(!outcomes.contains(&IterationOutcome::Converged));
        assert_eq!(outcomes.last(), Some(&IterationOutcome::MaxIterationsReached));
    }

    #[test]
    fn test_primed_ratio_converges_after_one_iteration() {
        let mut detector = ConvergenceDetector::primed(ConvergenceThresholds::default(), 1, 8.0 / 9.0);
        assert_eq!(detector.record_iteration(1, 1, 8.0 / 9.0), IterationOutcome::Converged);
        assert_eq!(detector.snapshot().stable_count, 1);
    }

    #[test]
    fn test_ratio_alone_triggers_stop() {
        let thresholds = ConvergenceThresholds {
            open_threshold: 0,
            stable_threshold: 10,
            ..Default::default()
        };
        let mut detector = ConvergenceDetector::primed(thresholds, 12, 0.85);
        assert_eq!(detector.record_iteration(1, 11, 0.9), IterationOutcome::Converged);
    }

    #[test]
    fn test_stop_on_last_iteration_reports_converged() {
        let mut detector = ConvergenceDetector::new(ConvergenceThresholds::default());
        let outcomes = run(&mut detector, &[20, 18, 16, 14, 14], 0.1);
        assert_eq!(outcomes.last(), Some(&IterationOutcome::MaxIterationsReached));

        let mut detector = ConvergenceDetector::new(ConvergenceThresholds::default());
        let outcomes = run(&mut detector, &[20, 18, 16, 14, 2], 0.1);
        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes.last(), Some(&IterationOutcome::Converged));
    }

    #[test]
    fn test_resume_from_snapshot() {
        let mut first = ConvergenceDetector::new(ConvergenceThresholds::default());
        first.record_iteration(1, 10, 0.2);
        let mut resumed = ConvergenceDetector::from_snapshot(ConvergenceThresholds::default(), first.snapshot());
        assert_eq!(resumed.record_iteration(2, 10, 0.2), IterationOutcome::Continued);
        assert_eq!(resumed.record_iteration(3, 10, 0.2), IterationOutcome::Converged);
    }
}
