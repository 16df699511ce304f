//! Sub-task orchestration: Analyze → Research → Integrate.
//!
//! Each step runs in its own spawned task holding nothing but an `Arc`
//! snapshot of the document and the step's inputs. A step that fails,
//! panics or is aborted can therefore be retried from a clean slate, and
//! nothing it does can reach the persisted document: the orchestrator only
//! returns a candidate document, and the caller decides whether to save it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AmbiguityItem, FindingItem, Item, RefinementConfig, SpecDocument, SubtaskStep, Tier};
use crate::domain::ports::{Analyzer, FindingSink, Integrator, Researcher};

/// Retry, timeout and partial-result policy.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Retries after the first attempt of a failing step
    pub max_subtask_retries: u32,
    pub retry_delay: Duration,
    pub research_timeout: Duration,
    /// Keep findings delivered before a research timeout
    pub accept_partial_findings: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&RefinementConfig::default())
    }
}

impl From<&RefinementConfig> for OrchestratorConfig {
    fn from(config: &RefinementConfig) -> Self {
        Self {
            max_subtask_retries: config.max_subtask_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            research_timeout: Duration::from_secs(config.research_timeout_secs),
            accept_partial_findings: config.accept_partial_findings,
        }
    }
}

/// Candidate result of one iteration.
#[derive(Debug, Clone)]
pub struct IterationOutput {
    pub document: SpecDocument,
    pub ambiguities: usize,
    pub findings: usize,
    /// Research timed out and only the findings delivered so far were used
    pub partial_research: bool,
}

#[derive(Debug, Default)]
struct ResearchOutput {
    findings: Vec<FindingItem>,
    partial: bool,
}

enum ResearchEnd {
    Finished(Result<DomainResult<()>, tokio::task::JoinError>),
    TimedOut,
    Cancelled,
}

pub struct SubtaskOrchestrator {
    analyzer: Arc<dyn Analyzer>,
    researcher: Arc<dyn Researcher>,
    integrator: Arc<dyn Integrator>,
    config: OrchestratorConfig,
}

impl SubtaskOrchestrator {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        researcher: Arc<dyn Researcher>,
        integrator: Arc<dyn Integrator>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            analyzer,
            researcher,
            integrator,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_subtask_retries.saturating_add(1)
    }

    /// Run the three steps in order against `snapshot`.
    ///
    /// Ambiguities that research left unanswered are carried into integration
    /// as `Unresolved` findings.
    #[instrument(skip_all, fields(document = %snapshot.id, iteration = snapshot.iteration + 1))]
    pub async fn run_iteration(
        &self,
        snapshot: Arc<SpecDocument>,
        cancel: &CancellationToken,
    ) -> DomainResult<IterationOutput> {
        let ambiguities = self.analyze(&snapshot, cancel).await?;
        debug!(count = ambiguities.len(), analyzer = self.analyzer.name(), "analysis complete");

        let research = if ambiguities.is_empty() {
            debug!("no ambiguities, research skipped");
            ResearchOutput::default()
        } else {
            self.research(&ambiguities, &snapshot, cancel).await?
        };

        let mut findings = research.findings;
        let unresolved: Vec<FindingItem> = ambiguities
            .iter()
            .filter(|ambiguity| !findings.iter().any(|f| f.addresses(ambiguity)))
            .map(FindingItem::unresolved)
            .collect();
        if !unresolved.is_empty() {
            debug!(count = unresolved.len(), "carrying unresolved ambiguities");
        }
        findings.extend(unresolved);
        let finding_count = findings.len();

        let document = self.integrate(findings, &snapshot, cancel).await?;

        Ok(IterationOutput {
            document,
            ambiguities: ambiguities.len(),
            findings: finding_count,
            partial_research: research.partial,
        })
    }

    async fn analyze(&self, snapshot: &Arc<SpecDocument>, cancel: &CancellationToken) -> DomainResult<Vec<AmbiguityItem>> {
        let analyzer = Arc::clone(&self.analyzer);
        let snapshot = Arc::clone(snapshot);
        self.run_isolated(SubtaskStep::Analyze, cancel, move || {
            let analyzer = Arc::clone(&analyzer);
            let snapshot = Arc::clone(&snapshot);
            async move { analyzer.analyze(snapshot).await }
        })
        .await
    }

    async fn integrate(
        &self,
        findings: Vec<FindingItem>,
        snapshot: &Arc<SpecDocument>,
        cancel: &CancellationToken,
    ) -> DomainResult<SpecDocument> {
        let integrator = Arc::clone(&self.integrator);
        let snapshot = Arc::clone(snapshot);
        self.run_isolated(SubtaskStep::Integrate, cancel, move || {
            let integrator = Arc::clone(&integrator);
            let snapshot = Arc::clone(&snapshot);
            let findings = findings.clone();
            async move {
                let merged = integrator.integrate(findings, Arc::clone(&snapshot)).await?;
                guard_integration(&snapshot, &merged)?;
                Ok(merged)
            }
        })
        .await
    }

    /// Spawn `attempt` in a fresh task, retrying failures up to the bound.
    async fn run_isolated<T, F, Fut>(&self, step: SubtaskStep, cancel: &CancellationToken, mut attempt: F) -> DomainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DomainResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let max_attempts = self.max_attempts();
        let mut last_error = String::new();

        for n in 1..=max_attempts {
            let mut handle = tokio::spawn(attempt());
            let joined = tokio::select! {
                _ = cancel.cancelled() => None,
                joined = &mut handle => Some(joined),
            };
            let Some(joined) = joined else {
                handle.abort();
                return Err(DomainError::Cancelled(step));
            };

            match joined {
                Ok(Ok(value)) => {
                    if n > 1 {
                        info!(step = %step, attempt = n, "sub-task succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(DomainError::Cancelled(_))) => return Err(DomainError::Cancelled(step)),
                Ok(Err(err)) => last_error = err.to_string(),
                Err(join_err) => last_error = format!("sub-task aborted: {join_err}"),
            }

            if n < max_attempts {
                warn!(step = %step, attempt = n, error = %last_error, "sub-task failed, retrying");
                self.pause(step, cancel).await?;
            }
        }

        Err(DomainError::SubtaskFailure {
            step,
            attempts: max_attempts,
            reason: last_error,
        })
    }

    async fn research(
        &self,
        ambiguities: &[AmbiguityItem],
        snapshot: &Arc<SpecDocument>,
        cancel: &CancellationToken,
    ) -> DomainResult<ResearchOutput> {
        let step = SubtaskStep::Research;
        let max_attempts = self.max_attempts();
        let mut last_error = String::new();

        for n in 1..=max_attempts {
            let (sink, mut rx) = FindingSink::channel();
            let token = cancel.child_token();
            let researcher = Arc::clone(&self.researcher);
            let input = ambiguities.to_vec();
            let snap = Arc::clone(snapshot);
            let task_token = token.clone();
            let mut handle = tokio::spawn(async move { researcher.research(input, snap, sink, task_token).await });

            let deadline = sleep(self.config.research_timeout);
            tokio::pin!(deadline);
            let mut findings = Vec::new();

            let end = loop {
                tokio::select! {
                    Some(finding) = rx.recv() => findings.push(finding),
                    joined = &mut handle => break ResearchEnd::Finished(joined),
                    _ = &mut deadline => break ResearchEnd::TimedOut,
                    _ = cancel.cancelled() => break ResearchEnd::Cancelled,
                }
            };

            match end {
                ResearchEnd::Finished(Ok(Ok(()))) => {
                    drain(&mut rx, &mut findings);
                    debug!(findings = findings.len(), researcher = self.researcher.name(), "research complete");
                    return Ok(ResearchOutput {
                        findings,
                        partial: false,
                    });
                }
                ResearchEnd::Finished(Ok(Err(DomainError::Cancelled(_)))) | ResearchEnd::Cancelled => {
                    token.cancel();
                    handle.abort();
                    return Err(DomainError::Cancelled(step));
                }
                ResearchEnd::Finished(Ok(Err(err))) => last_error = err.to_string(),
                ResearchEnd::Finished(Err(join_err)) => last_error = format!("sub-task aborted: {join_err}"),
                ResearchEnd::TimedOut => {
                    token.cancel();
                    handle.abort();
                    drain(&mut rx, &mut findings);
                    let seconds = self.config.research_timeout.as_secs();
                    if self.config.accept_partial_findings && !findings.is_empty() {
                        warn!(seconds, delivered = findings.len(), "research timed out, keeping partial findings");
                        return Ok(ResearchOutput {
                            findings,
                            partial: true,
                        });
                    }
                    warn!(seconds, "research timed out without usable findings");
                    return Err(DomainError::SubtaskTimeout { step, seconds });
                }
            }

            if n < max_attempts {
                warn!(step = %step, attempt = n, error = %last_error, "sub-task failed, retrying");
                self.pause(step, cancel).await?;
            }
        }

        Err(DomainError::SubtaskFailure {
            step,
            attempts: max_attempts,
            reason: last_error,
        })
    }

    async fn pause(&self, step: SubtaskStep, cancel: &CancellationToken) -> DomainResult<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(DomainError::Cancelled(step)),
            _ = sleep(self.config.retry_delay) => Ok(()),
        }
    }
}

fn drain(rx: &mut UnboundedReceiver<FindingItem>, findings: &mut Vec<FindingItem>) {
    while let Ok(finding) = rx.try_recv() {
        findings.push(finding);
    }
}

/// Reject integrator output that breaks the document's mutation rules.
///
/// Items are never removed, superseded items stay superseded and High items
/// are only lowered by a human.
pub fn guard_integration(before: &SpecDocument, after: &SpecDocument) -> DomainResult<()> {
    if after.id != before.id {
        return Err(DomainError::ValidationFailed(format!(
            "integrator changed document id from {} to {}",
            before.id, after.id
        )));
    }

    let merged: HashMap<Uuid, &Item> = after.items().map(|(_, item)| (item.id, item)).collect();
    for (section, item) in before.items() {
        let Some(next) = merged.get(&item.id) else {
            return Err(DomainError::ValidationFailed(format!(
                "item {} in section '{section}' was removed",
                item.id
            )));
        };
        if item.superseded && !next.superseded {
            return Err(DomainError::ValidationFailed(format!(
                "superseded item {} was revived",
                item.id
            )));
        }
        if item.tier == Tier::High && next.tier < Tier::High {
            return Err(DomainError::ValidationFailed(format!(
                "high item {} was demoted to {}",
                item.id, next.tier
            )));
        }
    }
    Ok(())
}
