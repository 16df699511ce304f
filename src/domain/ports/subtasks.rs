//! Sub-task ports: analyze, research, integrate.
//!
//! Every sub-task receives an immutable snapshot of the document and never
//! writes to the store. The orchestrator validates what they return.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AmbiguityItem, FindingItem, SpecDocument, SubtaskStep};

/// Identifies open questions and gaps in a document.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, snapshot: Arc<SpecDocument>) -> DomainResult<Vec<AmbiguityItem>>;
}

/// Investigates ambiguities, delivering findings as they are produced.
///
/// Findings pushed into the sink before a timeout or cancellation may be kept
/// by the orchestrator, so implementations should deliver early and often.
#[async_trait]
pub trait Researcher: Send + Sync {
    fn name(&self) -> &str;

    async fn research(
        &self,
        ambiguities: Vec<AmbiguityItem>,
        snapshot: Arc<SpecDocument>,
        sink: FindingSink,
        cancel: CancellationToken,
    ) -> DomainResult<()>;
}

/// Merges findings into a new version of the document.
///
/// Must be idempotent: integrating the same findings twice yields the same
/// document as integrating them once.
#[async_trait]
pub trait Integrator: Send + Sync {
    fn name(&self) -> &str;

    async fn integrate(
        &self,
        findings: Vec<FindingItem>,
        snapshot: Arc<SpecDocument>,
    ) -> DomainResult<SpecDocument>;
}

/// Incremental delivery channel for research findings.
#[derive(Debug, Clone)]
pub struct FindingSink {
    tx: mpsc::UnboundedSender<FindingItem>,
}

impl FindingSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FindingItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hand one finding to the orchestrator.
    ///
    /// Fails with `Cancelled` once the orchestrator has stopped listening.
    pub fn deliver(&self, finding: FindingItem) -> DomainResult<()> {
        self.tx
            .send(finding)
            .map_err(|_| DomainError::Cancelled(SubtaskStep::Research))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
