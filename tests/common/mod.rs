//! Shared fixtures for the integration tests.
//!
//! Sub-task doubles are deterministic so pipeline runs can be asserted
//! iteration by iteration.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use spec_refine::adapters::sqlite::{create_migrated_test_pool, SqliteDocumentStore};
use spec_refine::domain::errors::{DomainError, DomainResult};
use spec_refine::domain::models::{
    AmbiguityItem, DocumentHeader, FindingItem, FindingVerdict, IterationRecord, Origin, SpecDocument, Tier,
};
use spec_refine::domain::ports::{Analyzer, DocumentStore, FindingSink, Integrator, Researcher};
use spec_refine::services::{
    ConvergenceThresholds, MergeIntegrator, OpenItemAnalyzer, OrchestratorConfig, RefinementPipeline,
    SubtaskOrchestrator,
};

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub async fn setup_store() -> Arc<SqliteDocumentStore> {
    let pool = create_migrated_test_pool()
        .await
        .expect("Failed to create test pool");
    Arc::new(SqliteDocumentStore::new(pool))
}

/// Orchestrator settings with no retry pause and a short research timeout.
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_subtask_retries: 1,
        retry_delay: Duration::from_millis(1),
        research_timeout: Duration::from_millis(200),
        accept_partial_findings: true,
    }
}

pub fn pipeline_with(
    store: Arc<dyn DocumentStore>,
    researcher: Arc<dyn Researcher>,
    config: OrchestratorConfig,
    thresholds: ConvergenceThresholds,
) -> RefinementPipeline {
    let orchestrator = SubtaskOrchestrator::new(
        Arc::new(OpenItemAnalyzer::new()),
        researcher,
        Arc::new(MergeIntegrator::new()),
        config,
    );
    RefinementPipeline::new(store, orchestrator, thresholds)
}

pub fn pipeline(store: Arc<dyn DocumentStore>, researcher: Arc<dyn Researcher>) -> RefinementPipeline {
    pipeline_with(store, researcher, fast_config(), ConvergenceThresholds::default())
}

/// A document with `confirmed` High items and `open` open questions.
pub fn seed_document(id: &str, confirmed: usize, open: usize) -> SpecDocument {
    let mut doc = SpecDocument::new(id, format!("Document {id}"));
    for i in 0..confirmed {
        doc.add_item("goals", format!("Goal {i} is agreed"), Tier::High, Origin::Seed);
    }
    for i in 0..open {
        doc.add_item("questions", format!("Open question {i}?"), Tier::Open, Origin::Seed);
    }
    doc
}

/// Answers up to `per_iteration` ambiguities each call, at the given tier.
pub struct AnsweringResearcher {
    per_iteration: usize,
    tier: Tier,
    pub calls: AtomicU32,
}

impl AnsweringResearcher {
    pub fn new(per_iteration: usize, tier: Tier) -> Self {
        Self {
            per_iteration,
            tier,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Researcher for AnsweringResearcher {
    fn name(&self) -> &str {
        "answering"
    }

    async fn research(
        &self,
        ambiguities: Vec<AmbiguityItem>,
        _snapshot: Arc<SpecDocument>,
        sink: FindingSink,
        _cancel: CancellationToken,
    ) -> DomainResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for ambiguity in ambiguities.iter().take(self.per_iteration) {
            let Some(target) = ambiguity.item_id else { continue };
            let text = format!("Answer to: {}", ambiguity.question);
            sink.deliver(
                FindingItem::new(&ambiguity.section, text, FindingVerdict::Answers)
                    .targeting(target)
                    .with_hint(self.tier),
            )?;
        }
        Ok(())
    }
}

/// Finds nothing; every ambiguity stays open.
pub struct SilentResearcher;

#[async_trait]
impl Researcher for SilentResearcher {
    fn name(&self) -> &str {
        "silent"
    }

    async fn research(
        &self,
        _ambiguities: Vec<AmbiguityItem>,
        _snapshot: Arc<SpecDocument>,
        _sink: FindingSink,
        _cancel: CancellationToken,
    ) -> DomainResult<()> {
        Ok(())
    }
}

/// Adds one new open question per call without answering anything.
pub struct QuestionRaisingResearcher {
    pub calls: AtomicU32,
}

impl QuestionRaisingResearcher {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Researcher for QuestionRaisingResearcher {
    fn name(&self) -> &str {
        "raising"
    }

    async fn research(
        &self,
        _ambiguities: Vec<AmbiguityItem>,
        _snapshot: Arc<SpecDocument>,
        sink: FindingSink,
        _cancel: CancellationToken,
    ) -> DomainResult<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        sink.deliver(
            FindingItem::new("questions", format!("Follow-up question {n}?"), FindingVerdict::New)
                .with_hint(Tier::Open),
        )
    }
}

/// Fails every call.
pub struct FailingResearcher {
    pub calls: AtomicU32,
}

impl FailingResearcher {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Researcher for FailingResearcher {
    fn name(&self) -> &str {
        "failing"
    }

    async fn research(
        &self,
        _ambiguities: Vec<AmbiguityItem>,
        _snapshot: Arc<SpecDocument>,
        _sink: FindingSink,
        _cancel: CancellationToken,
    ) -> DomainResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DomainError::ValidationFailed("upstream source unavailable".to_string()))
    }
}

/// Delivers `deliver` findings, then hangs until cancelled.
pub struct StallingResearcher {
    deliver: usize,
}

impl StallingResearcher {
    pub fn new(deliver: usize) -> Self {
        Self { deliver }
    }
}

#[async_trait]
impl Researcher for StallingResearcher {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn research(
        &self,
        ambiguities: Vec<AmbiguityItem>,
        _snapshot: Arc<SpecDocument>,
        sink: FindingSink,
        cancel: CancellationToken,
    ) -> DomainResult<()> {
        for ambiguity in ambiguities.iter().take(self.deliver) {
            let Some(target) = ambiguity.item_id else { continue };
            sink.deliver(
                FindingItem::new(&ambiguity.section, "Partial answer", FindingVerdict::Answers)
                    .targeting(target)
                    .with_hint(Tier::Medium),
            )?;
        }
        cancel.cancelled().await;
        Err(DomainError::Cancelled(spec_refine::domain::models::SubtaskStep::Research))
    }
}

/// Analyzer that fails a fixed number of times before delegating.
pub struct FlakyAnalyzer {
    failures: u32,
    pub calls: AtomicU32,
}

impl FlakyAnalyzer {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Analyzer for FlakyAnalyzer {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn analyze(&self, snapshot: Arc<SpecDocument>) -> DomainResult<Vec<AmbiguityItem>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(DomainError::ValidationFailed(format!("transient failure {n}")));
        }
        Ok(OpenItemAnalyzer::ambiguities(&snapshot))
    }
}

/// Integrator that drops every item, which the orchestrator must reject.
pub struct DestructiveIntegrator;

#[async_trait]
impl Integrator for DestructiveIntegrator {
    fn name(&self) -> &str {
        "destructive"
    }

    async fn integrate(&self, _findings: Vec<FindingItem>, snapshot: Arc<SpecDocument>) -> DomainResult<SpecDocument> {
        let mut doc = (*snapshot).clone();
        for section in &mut doc.sections {
            section.items.clear();
        }
        Ok(doc)
    }
}

/// Store wrapper whose full saves can be switched to fail, simulating a
/// crash between computing an iteration and persisting it.
pub struct FailingStore {
    inner: Arc<SqliteDocumentStore>,
    fail_saves: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: Arc<SqliteDocumentStore>) -> Self {
        Self {
            inner,
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn load(&self, id: &str) -> DomainResult<SpecDocument> {
        self.inner.load(id).await
    }

    async fn save(&self, doc: &SpecDocument) -> DomainResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(DomainError::DatabaseError("disk I/O error".to_string()));
        }
        self.inner.save(doc).await
    }

    async fn append_audit_record(&self, id: &str, record: &IterationRecord) -> DomainResult<()> {
        self.inner.append_audit_record(id, record).await
    }

    async fn load_header(&self, id: &str) -> DomainResult<DocumentHeader> {
        self.inner.load_header(id).await
    }

    async fn list(&self) -> DomainResult<Vec<DocumentHeader>> {
        self.inner.list().await
    }

    async fn exists(&self, id: &str) -> DomainResult<bool> {
        self.inner.exists(id).await
    }

    async fn reset_header(&self, id: &str) -> DomainResult<DocumentHeader> {
        self.inner.reset_header(id).await
    }
}
