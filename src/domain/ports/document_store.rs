//! Document store port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DocumentHeader, IterationRecord, SpecDocument};

/// Persistence interface for specification documents.
///
/// The store is the single writer of document state. Every save is atomic:
/// either the full header, all sections, all items and any new audit records
/// become durable together, or none of them do.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a full document, including its audit log.
    async fn load(&self, id: &str) -> DomainResult<SpecDocument>;

    /// Persist a document.
    ///
    /// A first save requires `revision == 1`. Later saves require the persisted
    /// revision to equal `doc.revision - 1`; anything else is a
    /// `ConcurrencyConflict`.
    async fn save(&self, doc: &SpecDocument) -> DomainResult<()>;

    /// Append one audit record without touching the rest of the document.
    ///
    /// Idempotent on `(document, sequence)`.
    async fn append_audit_record(&self, id: &str, record: &IterationRecord) -> DomainResult<()>;

    /// Load only the metadata header.
    async fn load_header(&self, id: &str) -> DomainResult<DocumentHeader>;

    /// All document headers, most recently updated first.
    async fn list(&self) -> DomainResult<Vec<DocumentHeader>>;

    async fn exists(&self, id: &str) -> DomainResult<bool>;

    /// Force the header back to `Seed` with cleared counters.
    ///
    /// Used by an operator reset when the header is too malformed to load.
    /// Sections, items and the audit log are left untouched.
    async fn reset_header(&self, id: &str) -> DomainResult<DocumentHeader>;
}
