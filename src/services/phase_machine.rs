//! Phase state machine.
//!
//! The transition table is total: every `(phase, event)` pair either maps to
//! exactly one target phase or is rejected with `InvalidStateTransition`.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ConvergenceSnapshot, Phase, SpecDocument};

/// Events that drive phase changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEvent {
    /// The initial document exists
    Seeded,
    /// The convergence detector ended the automated phase
    AutoPhaseCompleted,
    /// The operator skips the rest of the automated phase
    EscalateToReview,
    /// The reviewer accepts the document
    ReviewApproved,
    /// The reviewer asks for another automated round
    RequestMoreAutomation,
    /// The operator returns the document to `Seed`
    OperatorReset,
}

impl PhaseEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seeded => "seeded",
            Self::AutoPhaseCompleted => "auto_phase_completed",
            Self::EscalateToReview => "escalate_to_review",
            Self::ReviewApproved => "review_approved",
            Self::RequestMoreAutomation => "request_more_automation",
            Self::OperatorReset => "operator_reset",
        }
    }

    pub const ALL: [PhaseEvent; 6] = [
        Self::Seeded,
        Self::AutoPhaseCompleted,
        Self::EscalateToReview,
        Self::ReviewApproved,
        Self::RequestMoreAutomation,
        Self::OperatorReset,
    ];
}

impl std::fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target phase for `event` in `from`, if the table allows it.
pub fn next_phase(from: Phase, event: PhaseEvent) -> Option<Phase> {
    use Phase::*;
    use PhaseEvent::*;
    match (from, event) {
        (_, OperatorReset) => Some(Seed),
        (Seed, Seeded) => Some(AutoA),
        (AutoA, AutoPhaseCompleted | EscalateToReview) => Some(HumanA),
        (AutoB, AutoPhaseCompleted | EscalateToReview) => Some(HumanB),
        (HumanA, ReviewApproved) => Some(AutoB),
        (HumanB, ReviewApproved) => Some(Finalize),
        (HumanA, RequestMoreAutomation) => Some(AutoA),
        (HumanB, RequestMoreAutomation) => Some(AutoB),
        _ => None,
    }
}

/// Events accepted in `from`.
pub fn allowed_events(from: Phase) -> Vec<PhaseEvent> {
    PhaseEvent::ALL
        .into_iter()
        .filter(|event| next_phase(from, *event).is_some())
        .collect()
}

/// A phase change that has been applied to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Phase,
    pub event: PhaseEvent,
    pub to: Phase,
}

impl Transition {
    /// Only `HumanB → Finalize` yields a derived artifact.
    pub fn produces_artifact(&self) -> bool {
        self.from == Phase::HumanB && self.to == Phase::Finalize
    }

    /// Whether the document enters an automated phase and needs a fresh baseline.
    pub fn enters_automation(&self) -> bool {
        self.to.is_automated()
    }
}

/// Apply `event` to the document's phase.
///
/// Every transition resets `iteration` to 0. Entering an automated phase or
/// `Seed` clears the convergence snapshot; entering a review phase keeps the
/// last metrics for display.
pub fn apply(doc: &mut SpecDocument, event: PhaseEvent) -> DomainResult<Transition> {
    let from = doc.phase;
    let to = next_phase(from, event).ok_or_else(|| DomainError::InvalidStateTransition {
        from,
        event: event.to_string(),
        reason: format!(
            "allowed events: [{}]",
            allowed_events(from)
                .iter()
                .map(PhaseEvent::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    })?;

    doc.phase = to;
    doc.iteration = 0;
    if to.is_automated() || to == Phase::Seed {
        doc.convergence = ConvergenceSnapshot::default();
    }

    Ok(Transition { from, event, to })
}
