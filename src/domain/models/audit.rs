//! Iteration audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::Phase;
use super::subtask::SubtaskStep;

/// How an iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    /// Stop condition not met; another iteration follows
    Continued,
    /// Stop condition met; the automated phase ends
    Converged,
    /// Iteration ceiling reached without converging
    MaxIterationsReached,
    /// A sub-task or the save failed; the document was left untouched
    Failed,
    /// Cancelled or timed out while a sub-task was running
    Cancelled,
}

impl IterationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continued => "continued",
            Self::Converged => "converged",
            Self::MaxIterationsReached => "max_iterations_reached",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "continued" => Some(Self::Continued),
            "converged" => Some(Self::Converged),
            "max_iterations_reached" => Some(Self::MaxIterationsReached),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether this outcome ends the automated phase.
    pub fn ends_phase(&self) -> bool {
        matches!(self, Self::Converged | Self::MaxIterationsReached)
    }

    /// Whether the iteration produced a saved document.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Continued | Self::Converged | Self::MaxIterationsReached)
    }
}

impl std::fmt::Display for IterationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which step failed and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub step: Option<SubtaskStep>,
    pub reason: String,
}

/// Immutable record of one completed (or failed) iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based position in the audit log
    pub sequence: u32,
    pub phase_at_time: Phase,
    pub iteration_number: u32,
    pub timestamp: DateTime<Utc>,
    pub open_count_before: u32,
    pub open_count_after: u32,
    pub items_promoted: u32,
    pub items_added: u32,
    #[serde(default)]
    pub items_demoted: u32,
    pub outcome: IterationOutcome,
    /// Convergence anomalies observed during this iteration
    #[serde(default)]
    pub anomalies: Vec<String>,
    #[serde(default)]
    pub failure: Option<FailureDetail>,
}

impl IterationRecord {
    /// Record for an iteration that did not produce a new document.
    pub fn failed(
        sequence: u32,
        phase: Phase,
        iteration_number: u32,
        open_count: u32,
        outcome: IterationOutcome,
        failure: FailureDetail,
    ) -> Self {
        Self {
            sequence,
            phase_at_time: phase,
            iteration_number,
            timestamp: Utc::now(),
            open_count_before: open_count,
            open_count_after: open_count,
            items_promoted: 0,
            items_added: 0,
            items_demoted: 0,
            outcome,
            anomalies: Vec::new(),
            failure: Some(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classification() {
        assert!(IterationOutcome::Converged.ends_phase());
        assert!(IterationOutcome::MaxIterationsReached.ends_phase());
        assert!(!IterationOutcome::Continued.ends_phase());
        assert!(!IterationOutcome::Failed.is_success());
        assert!(!IterationOutcome::Cancelled.is_success());
        assert_eq!(
            IterationOutcome::from_str("max_iterations_reached"),
            Some(IterationOutcome::MaxIterationsReached)
        );
    }

    #[test]
    fn test_failed_record_keeps_open_count() {
        let record = IterationRecord::failed(
            3,
            Phase::AutoA,
            2,
            7,
            IterationOutcome::Failed,
            FailureDetail {
                step: Some(SubtaskStep::Research),
                reason: "timeout".to_string(),
            },
        );
        assert_eq!(record.open_count_before, record.open_count_after);
        assert_eq!(record.items_added, 0);
        assert_eq!(record.failure.unwrap().step, Some(SubtaskStep::Research));
    }
}
