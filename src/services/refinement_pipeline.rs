//! Refinement pipeline: the per-document controller.
//!
//! Drives the phase state machine, runs one orchestrated iteration at a time
//! and is the only component that saves documents. State is always loaded
//! from the store at the start of an operation, so any number of pipelines
//! can share one store as long as each document has a single driver.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    is_valid_document_id, ConvergenceSnapshot, DocumentHeader, FailureDetail, IterationOutcome, IterationRecord, Origin,
    Phase, SpecDocument, Tier,
};
use crate::domain::ports::DocumentStore;
use crate::services::artifact;
use crate::services::convergence_detector::{ConvergenceDetector, ConvergenceThresholds};
use crate::services::phase_machine::{self, PhaseEvent, Transition};
use crate::services::recovery::{self, ResumePoint};
use crate::services::subtask_orchestrator::SubtaskOrchestrator;
use crate::services::tier_model::{compute_high_ratio, open_count, promote, ChangeCounts};

/// Outcome of one `run_iteration` call.
#[derive(Debug, Clone, Serialize)]
pub struct IterationReport {
    pub document_id: String,
    pub record: IterationRecord,
    /// Phase after the iteration; differs from `record.phase_at_time` when
    /// the iteration ended the automated phase
    pub phase_after: Phase,
    pub convergence: ConvergenceSnapshot,
    pub partial_research: bool,
}

impl IterationReport {
    pub fn outcome(&self) -> IterationOutcome {
        self.record.outcome
    }
}

/// A live Open item presented to a reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenQuestion {
    pub section: String,
    pub item_id: Uuid,
    pub text: String,
    pub origin: Origin,
}

/// A reviewer's answer to one open question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanResolution {
    pub item_id: Uuid,
    pub resolution: String,
}

/// Result of an operator-driven phase change.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseChange {
    pub document_id: String,
    pub transition: Transition,
    /// Written only on `HumanB → Finalize`
    pub artifact: Option<PathBuf>,
    /// A reset found the header malformed and rewrote it
    pub repaired: bool,
}

pub struct RefinementPipeline {
    store: Arc<dyn DocumentStore>,
    orchestrator: SubtaskOrchestrator,
    thresholds: ConvergenceThresholds,
    artifact_dir: Option<PathBuf>,
}

impl RefinementPipeline {
    pub fn new(store: Arc<dyn DocumentStore>, orchestrator: SubtaskOrchestrator, thresholds: ConvergenceThresholds) -> Self {
        Self {
            store,
            orchestrator,
            thresholds,
            artifact_dir: None,
        }
    }

    /// Directory receiving the Markdown artifact on finalization.
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn thresholds(&self) -> &ConvergenceThresholds {
        &self.thresholds
    }

    pub async fn load(&self, id: &str) -> DomainResult<SpecDocument> {
        self.store.load(id).await
    }

    pub async fn list(&self) -> DomainResult<Vec<DocumentHeader>> {
        self.store.list().await
    }

    /// Persist a new document and enter `AutoA`.
    pub async fn seed(&self, mut doc: SpecDocument) -> DomainResult<DocumentHeader> {
        if !is_valid_document_id(&doc.id) {
            return Err(DomainError::ValidationFailed(format!(
                "invalid document id {:?}: use letters, digits, '-', '_' or '.' and do not start with '.'",
                doc.id
            )));
        }
        if doc.phase != Phase::Seed || doc.revision != 0 {
            return Err(DomainError::ValidationFailed(format!(
                "document {} is not a fresh seed (phase {}, revision {})",
                doc.id, doc.phase, doc.revision
            )));
        }
        if self.store.exists(&doc.id).await? {
            return Err(DomainError::ValidationFailed(format!("document {} already exists", doc.id)));
        }

        let transition = phase_machine::apply(&mut doc, PhaseEvent::Seeded)?;
        self.prime(&mut doc);
        doc.touch();
        self.persist(&doc).await?;

        info!(
            document = %doc.id,
            items = doc.item_count(),
            open = doc.convergence.open_count,
            to = %transition.to,
            "document seeded"
        );
        Ok(doc.header())
    }

    /// Run one analyze → research → integrate pass and save the result.
    ///
    /// Sub-task failures and cancellation do not return `Err`: they are
    /// recorded in the audit log and reported with a `Failed` or `Cancelled`
    /// outcome, leaving the document untouched. A failed save returns
    /// `PersistenceFailure`; the iteration can simply be run again.
    pub async fn run_iteration(&self, id: &str, cancel: &CancellationToken) -> DomainResult<IterationReport> {
        let mut doc = self.store.load(id).await?;
        recovery::ensure_valid_header(&doc.header(), &self.thresholds)?;
        if !doc.phase.is_automated() {
            return Err(DomainError::InvalidStateTransition {
                from: doc.phase,
                event: "run_iteration".to_string(),
                reason: "iterations only run in auto_a or auto_b".to_string(),
            });
        }

        let phase = doc.phase;
        let iteration = doc.iteration + 1;
        let sequence = doc.next_audit_sequence();
        let open_before = open_count(&doc.sections);
        let snapshot = Arc::new(doc.clone());

        let output = match self.orchestrator.run_iteration(Arc::clone(&snapshot), cancel).await {
            Ok(output) => output,
            Err(err) => return self.record_failure(&doc, sequence, iteration, open_before, err).await,
        };

        let counts = ChangeCounts::between(&snapshot.sections, &output.document.sections);
        doc.sections = output.document.sections;

        let open_after = open_count(&doc.sections);
        let high_ratio = compute_high_ratio(&doc.sections);

        let mut anomalies = Vec::new();
        if open_after > open_before && counts.added == 0 && counts.demoted == 0 {
            let anomaly = format!(
                "open count rose from {open_before} to {open_after} with no items added or demoted"
            );
            warn!(document = %id, iteration, %anomaly, "convergence anomaly");
            anomalies.push(anomaly);
        }

        let mut detector = ConvergenceDetector::from_snapshot(self.thresholds, doc.convergence);
        let outcome = detector.record_iteration(iteration, open_after, high_ratio);
        doc.convergence = detector.snapshot();
        doc.iteration = iteration;

        let record = IterationRecord {
            sequence,
            phase_at_time: phase,
            iteration_number: iteration,
            timestamp: chrono::Utc::now(),
            open_count_before: open_before,
            open_count_after: open_after,
            items_promoted: counts.promoted,
            items_added: counts.added,
            items_demoted: counts.demoted,
            outcome,
            anomalies,
            failure: None,
        };
        doc.audit_log.push(record.clone());

        if outcome.ends_phase() {
            phase_machine::apply(&mut doc, PhaseEvent::AutoPhaseCompleted)?;
        }
        doc.touch();
        self.persist(&doc).await?;

        info!(
            document = %id,
            phase = %phase,
            iteration,
            open_before,
            open_after,
            high_ratio,
            stable = doc.convergence.stable_count,
            added = counts.added,
            promoted = counts.promoted,
            demoted = counts.demoted,
            outcome = %outcome,
            "iteration complete"
        );

        Ok(IterationReport {
            document_id: doc.id.clone(),
            record,
            phase_after: doc.phase,
            convergence: doc.convergence,
            partial_research: output.partial_research,
        })
    }

    async fn record_failure(
        &self,
        doc: &SpecDocument,
        sequence: u32,
        iteration: u32,
        open_count: u32,
        err: DomainError,
    ) -> DomainResult<IterationReport> {
        let (outcome, step) = match &err {
            DomainError::Cancelled(step) | DomainError::SubtaskTimeout { step, .. } => {
                (IterationOutcome::Cancelled, Some(*step))
            }
            DomainError::SubtaskFailure { step, .. } => (IterationOutcome::Failed, Some(*step)),
            _ => (IterationOutcome::Failed, None),
        };
        error!(document = %doc.id, iteration, outcome = %outcome, error = %err, "iteration did not complete");

        let record = IterationRecord::failed(
            sequence,
            doc.phase,
            iteration,
            open_count,
            outcome,
            FailureDetail {
                step,
                reason: err.to_string(),
            },
        );
        self.store
            .append_audit_record(&doc.id, &record)
            .await
            .map_err(|e| persistence_failure(&doc.id, e))?;

        Ok(IterationReport {
            document_id: doc.id.clone(),
            record,
            phase_after: doc.phase,
            convergence: doc.convergence,
            partial_research: false,
        })
    }

    /// Iterate until the automated phase ends or an iteration does not complete.
    pub async fn run_auto_phase(&self, id: &str, cancel: &CancellationToken) -> DomainResult<Vec<IterationReport>> {
        let mut reports = Vec::new();
        loop {
            let report = self.run_iteration(id, cancel).await?;
            let outcome = report.outcome();
            reports.push(report);
            if !outcome.is_success() || outcome.ends_phase() || cancel.is_cancelled() {
                break;
            }
        }
        Ok(reports)
    }

    /// Live Open items of the document.
    pub async fn open_questions(&self, id: &str) -> DomainResult<Vec<OpenQuestion>> {
        let doc = self.store.load(id).await?;
        Ok(doc
            .open_items()
            .map(|(section, item)| OpenQuestion {
                section: section.to_string(),
                item_id: item.id,
                text: item.text.clone(),
                origin: item.origin,
            })
            .collect())
    }

    /// Apply reviewer decisions; each resolved question is replaced by a High item.
    ///
    /// The batch is validated as a whole before anything changes.
    pub async fn apply_human_input(&self, id: &str, resolutions: &[HumanResolution]) -> DomainResult<Vec<Uuid>> {
        let mut doc = self.store.load(id).await?;
        recovery::ensure_valid_header(&doc.header(), &self.thresholds)?;
        if !doc.phase.is_human_review() {
            return Err(DomainError::InvalidStateTransition {
                from: doc.phase,
                event: "human_input".to_string(),
                reason: "human input is only accepted in human_a or human_b".to_string(),
            });
        }
        if resolutions.is_empty() {
            return Err(DomainError::ValidationFailed("no resolutions supplied".to_string()));
        }

        let mut resolved = Vec::with_capacity(resolutions.len());
        let mut seen = std::collections::HashSet::new();
        for resolution in resolutions {
            if !seen.insert(resolution.item_id) {
                return Err(DomainError::ValidationFailed(format!(
                    "item {} resolved more than once",
                    resolution.item_id
                )));
            }
            if resolution.resolution.trim().is_empty() {
                return Err(DomainError::ValidationFailed(format!(
                    "empty resolution for item {}",
                    resolution.item_id
                )));
            }
            let (section, item) = doc.find_item(resolution.item_id).ok_or_else(|| DomainError::ItemNotFound {
                document_id: id.to_string(),
                item_id: resolution.item_id.to_string(),
            })?;
            if !item.is_open() {
                return Err(DomainError::ValidationFailed(format!(
                    "item {} is not an open question",
                    resolution.item_id
                )));
            }
            resolved.push((section.to_string(), resolution));
        }

        let mut created = Vec::with_capacity(resolved.len());
        for (section, resolution) in resolved {
            if let Some(item) = doc.find_item_mut(resolution.item_id) {
                item.superseded = true;
            }
            let existing = doc
                .find_live_by_text(&section, &resolution.resolution)
                .map(|item| item.id);
            let new_id = match existing {
                Some(existing) => {
                    if let Some(item) = doc.find_item_mut(existing) {
                        promote(item, Tier::High);
                    }
                    existing
                }
                None => doc.add_replacement(
                    &section,
                    resolution.resolution.trim(),
                    Tier::High,
                    Origin::HumanInput,
                    resolution.item_id,
                ),
            };
            created.push(new_id);
        }

        doc.convergence.open_count = open_count(&doc.sections);
        doc.convergence.high_ratio = compute_high_ratio(&doc.sections);
        doc.touch();
        self.persist(&doc).await?;

        info!(document = %id, resolved = created.len(), phase = %doc.phase, "human input applied");
        Ok(created)
    }

    /// Start automation on a document sitting in `Seed` after a reset.
    pub async fn begin(&self, id: &str) -> DomainResult<PhaseChange> {
        self.transition(id, PhaseEvent::Seeded).await
    }

    pub async fn escalate_to_review(&self, id: &str) -> DomainResult<PhaseChange> {
        self.transition(id, PhaseEvent::EscalateToReview).await
    }

    pub async fn request_more_automation(&self, id: &str) -> DomainResult<PhaseChange> {
        self.transition(id, PhaseEvent::RequestMoreAutomation).await
    }

    /// Approve the current review; from `HumanB` this finalizes the document.
    pub async fn approve_review(&self, id: &str) -> DomainResult<PhaseChange> {
        self.transition(id, PhaseEvent::ReviewApproved).await
    }

    /// Return the document to `Seed`, keeping its items and audit log.
    ///
    /// A header too malformed to load is rewritten in place; the phase it
    /// held is unknown, so the reported transition starts from `Seed`.
    pub async fn reset(&self, id: &str) -> DomainResult<PhaseChange> {
        match self.store.load_header(id).await {
            Err(DomainError::InvalidResumeState { reason, .. }) => {
                warn!(document = %id, %reason, "repairing malformed header");
                let header = self
                    .store
                    .reset_header(id)
                    .await
                    .map_err(|e| persistence_failure(id, e))?;
                info!(document = %id, revision = header.revision, "phase transition after header repair");
                Ok(PhaseChange {
                    document_id: header.id,
                    transition: Transition {
                        from: Phase::Seed,
                        event: PhaseEvent::OperatorReset,
                        to: Phase::Seed,
                    },
                    artifact: None,
                    repaired: true,
                })
            }
            Err(e) => Err(e),
            Ok(header) => {
                let repaired = recovery::validate_header(&header, &self.thresholds).is_err();
                let mut change = self.transition(id, PhaseEvent::OperatorReset).await?;
                change.repaired = repaired;
                Ok(change)
            }
        }
    }

    pub async fn resume(&self, id: &str) -> DomainResult<ResumePoint> {
        recovery::resume(self.store.as_ref(), id, &self.thresholds).await
    }

    async fn transition(&self, id: &str, event: PhaseEvent) -> DomainResult<PhaseChange> {
        let mut doc = self.store.load(id).await?;
        // A reset rewrites the convergence state, so it may start from a bad one.
        if event != PhaseEvent::OperatorReset {
            recovery::ensure_valid_header(&doc.header(), &self.thresholds)?;
        }
        let transition = phase_machine::apply(&mut doc, event)?;
        if transition.enters_automation() {
            self.prime(&mut doc);
        }

        // A failed write must leave the document in HumanB.
        let artifact = match (&self.artifact_dir, transition.produces_artifact()) {
            (Some(dir), true) => Some(artifact::write_artifact(dir, &doc).await?),
            _ => None,
        };

        doc.touch();
        self.persist(&doc).await?;

        info!(
            document = %id,
            from = %transition.from,
            to = %transition.to,
            event = %transition.event,
            "phase transition"
        );

        Ok(PhaseChange {
            document_id: doc.id,
            transition,
            artifact,
            repaired: false,
        })
    }

    /// Seed the detector with the metrics the phase starts from.
    fn prime(&self, doc: &mut SpecDocument) {
        let detector = ConvergenceDetector::primed(
            self.thresholds,
            open_count(&doc.sections),
            compute_high_ratio(&doc.sections),
        );
        doc.convergence = detector.snapshot();
    }

    async fn persist(&self, doc: &SpecDocument) -> DomainResult<()> {
        self.store
            .save(doc)
            .await
            .map_err(|e| persistence_failure(&doc.id, e))
    }
}

fn persistence_failure(document_id: &str, err: DomainError) -> DomainError {
    match err {
        DomainError::ConcurrencyConflict { .. } | DomainError::PersistenceFailure { .. } => err,
        other => DomainError::PersistenceFailure {
            document_id: document_id.to_string(),
            reason: other.to_string(),
        },
    }
}
