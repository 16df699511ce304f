//! Resumption from the persisted document header.
//!
//! Only the header is read. The audit log stays available for diagnostics
//! but is never replayed.

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DocumentHeader, Phase};
use crate::domain::ports::DocumentStore;
use crate::services::convergence_detector::ConvergenceThresholds;

/// What the pipeline should do next for a resumed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum NextAction {
    /// Back at `Seed` after a reset; the pipeline must be restarted
    Begin,
    /// Continue the automated phase with this iteration
    RunIteration { iteration: u32 },
    /// Waiting on a reviewer
    AwaitReview,
    Finished,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumePoint {
    pub header: DocumentHeader,
    pub next: NextAction,
}

/// Reconstruct pipeline state for `id` from its header alone.
pub async fn resume(
    store: &dyn DocumentStore,
    id: &str,
    thresholds: &ConvergenceThresholds,
) -> DomainResult<ResumePoint> {
    let header = store.load_header(id).await?;
    ensure_valid_header(&header, thresholds)?;

    let next = match header.phase {
        Phase::Seed => NextAction::Begin,
        Phase::AutoA | Phase::AutoB => NextAction::RunIteration {
            iteration: header.iteration + 1,
        },
        Phase::HumanA | Phase::HumanB => NextAction::AwaitReview,
        Phase::Finalize => NextAction::Finished,
    };
    info!(
        document = %id,
        phase = %header.phase,
        iteration = header.iteration,
        revision = header.revision,
        "resumed from header"
    );
    Ok(ResumePoint { header, next })
}

/// Reject a header that fails `validate_header` with `InvalidResumeState`.
pub fn ensure_valid_header(header: &DocumentHeader, thresholds: &ConvergenceThresholds) -> DomainResult<()> {
    validate_header(header, thresholds).map_err(|reason| {
        warn!(document = %header.id, %reason, "refusing malformed header");
        DomainError::InvalidResumeState {
            document_id: header.id.clone(),
            reason,
        }
    })
}

/// Consistency checks a header must pass before it drives the state machine.
pub fn validate_header(header: &DocumentHeader, thresholds: &ConvergenceThresholds) -> Result<(), String> {
    let c = &header.convergence;
    if !c.high_ratio.is_finite() || !(0.0..=1.0).contains(&c.high_ratio) {
        return Err(format!("high_ratio {} outside [0, 1]", c.high_ratio));
    }
    if c.stable_count > c.observations {
        return Err(format!(
            "stable_count {} exceeds observation count {}",
            c.stable_count, c.observations
        ));
    }
    if header.revision == 0 {
        return Err("document has never been saved".to_string());
    }
    if header.phase.is_automated() {
        if header.iteration >= thresholds.max_iterations {
            return Err(format!(
                "iteration {} already reached the ceiling of {}",
                header.iteration, thresholds.max_iterations
            ));
        }
    } else if header.iteration != 0 {
        return Err(format!("iteration {} recorded outside an automated phase", header.iteration));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ConvergenceSnapshot;
    use chrono::Utc;

    fn header(phase: Phase, iteration: u32) -> DocumentHeader {
        DocumentHeader {
            id: "doc".to_string(),
            title: "Doc".to_string(),
            phase,
            iteration,
            convergence: ConvergenceSnapshot {
                stable_count: 1,
                open_count: 4,
                high_ratio: 0.5,
                observations: 2,
                observed_non_empty: true,
            },
            revision: 3,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_header() {
        let t = ConvergenceThresholds::default();
        assert!(validate_header(&header(Phase::AutoA, 2), &t).is_ok());
        assert!(validate_header(&header(Phase::HumanB, 0), &t).is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_ratio() {
        let mut h = header(Phase::AutoA, 1);
        h.convergence.high_ratio = 1.5;
        assert!(validate_header(&h, &ConvergenceThresholds::default()).is_err());
        h.convergence.high_ratio = f64::NAN;
        assert!(validate_header(&h, &ConvergenceThresholds::default()).is_err());
    }

    #[test]
    fn test_rejects_iteration_past_ceiling() {
        let err = validate_header(&header(Phase::AutoB, 5), &ConvergenceThresholds::default()).unwrap_err();
        assert!(err.contains("ceiling"));
    }

    #[test]
    fn test_rejects_iteration_in_review() {
        assert!(validate_header(&header(Phase::HumanA, 2), &ConvergenceThresholds::default()).is_err());
    }
}
