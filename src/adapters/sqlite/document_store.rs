//! SQLite implementation of the DocumentStore.
//!
//! A document is spread over four tables: the header row, ordered sections,
//! ordered items and the append-only iteration records. `save` rewrites the
//! header, sections and items and inserts any new records inside one
//! transaction, guarded by the header's revision.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use super::{parse_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ConvergenceSnapshot, DocumentHeader, FailureDetail, IterationOutcome, IterationRecord, Item, Origin, Phase, Section,
    SpecDocument, Tier,
};
use crate::domain::ports::DocumentStore;

const HEADER_COLUMNS: &str = "id, title, phase, iteration, stable_count, open_count, high_ratio, \
     observations, observed_non_empty, revision, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_header(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
    ) -> DomainResult<(DocumentHeader, DateTime<Utc>)> {
        let row: Option<HeaderRow> = sqlx::query_as(&format!("SELECT {HEADER_COLUMNS} FROM spec_documents WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        row.ok_or_else(|| DomainError::DocumentNotFound(id.to_string()))?
            .into_parts()
    }

    async fn current_revision(tx: &mut Transaction<'_, Sqlite>, id: &str) -> DomainResult<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT revision FROM spec_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.map(|(revision,)| revision))
    }

    async fn write_header(tx: &mut Transaction<'_, Sqlite>, doc: &SpecDocument) -> DomainResult<()> {
        let expected = i64::try_from(doc.revision.saturating_sub(1))
            .map_err(|_| DomainError::ValidationFailed(format!("revision {} out of range", doc.revision)))?;
        let c = &doc.convergence;

        let result = if doc.revision == 1 {
            sqlx::query(
                r#"INSERT INTO spec_documents (id, title, phase, iteration, stable_count, open_count, high_ratio,
                   observations, observed_non_empty, revision, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&doc.id)
            .bind(&doc.title)
            .bind(doc.phase.as_str())
            .bind(i64::from(doc.iteration))
            .bind(i64::from(c.stable_count))
            .bind(i64::from(c.open_count))
            .bind(c.high_ratio)
            .bind(i64::from(c.observations))
            .bind(c.observed_non_empty)
            .bind(expected + 1)
            .bind(doc.created_at.to_rfc3339())
            .bind(doc.updated_at.to_rfc3339())
            .execute(&mut **tx)
            .await
        } else {
            sqlx::query(
                r#"UPDATE spec_documents SET title = ?, phase = ?, iteration = ?, stable_count = ?, open_count = ?,
                   high_ratio = ?, observations = ?, observed_non_empty = ?, revision = ?, updated_at = ?
                   WHERE id = ? AND revision = ?"#,
            )
            .bind(&doc.title)
            .bind(doc.phase.as_str())
            .bind(i64::from(doc.iteration))
            .bind(i64::from(c.stable_count))
            .bind(i64::from(c.open_count))
            .bind(c.high_ratio)
            .bind(i64::from(c.observations))
            .bind(c.observed_non_empty)
            .bind(expected + 1)
            .bind(doc.updated_at.to_rfc3339())
            .bind(&doc.id)
            .bind(expected)
            .execute(&mut **tx)
            .await
        };

        let conflict = match result {
            Ok(done) => done.rows_affected() == 0,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => true,
            Err(e) => return Err(e.into()),
        };
        if conflict {
            let found = Self::current_revision(tx, &doc.id).await?.unwrap_or(0);
            return Err(DomainError::ConcurrencyConflict {
                document_id: doc.id.clone(),
                expected: doc.revision.saturating_sub(1),
                found: u64::try_from(found).unwrap_or(0),
            });
        }
        Ok(())
    }

    async fn write_body(tx: &mut Transaction<'_, Sqlite>, doc: &SpecDocument) -> DomainResult<()> {
        sqlx::query("DELETE FROM spec_items WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM spec_sections WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut **tx)
            .await?;

        for (section_position, section) in (0_i64..).zip(&doc.sections) {
            sqlx::query("INSERT INTO spec_sections (document_id, position, name) VALUES (?, ?, ?)")
                .bind(&doc.id)
                .bind(section_position)
                .bind(&section.name)
                .execute(&mut **tx)
                .await?;

            for (position, item) in (0_i64..).zip(&section.items) {
                sqlx::query(
                    r#"INSERT INTO spec_items (document_id, id, section_position, position, key, text, tier, origin,
                       superseded, supersedes)
                       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                )
                .bind(&doc.id)
                .bind(item.id.to_string())
                .bind(section_position)
                .bind(position)
                .bind(&item.key)
                .bind(&item.text)
                .bind(item.tier.as_str())
                .bind(item.origin.as_str())
                .bind(item.superseded)
                .bind(item.supersedes.map(|id| id.to_string()))
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }

    async fn insert_record(tx: &mut Transaction<'_, Sqlite>, id: &str, record: &IterationRecord) -> DomainResult<bool> {
        let anomalies = serde_json::to_string(&record.anomalies)?;
        let failure = record.failure.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO iteration_records (document_id, sequence, phase_at_time, iteration_number,
               timestamp, open_count_before, open_count_after, items_promoted, items_added, items_demoted, outcome,
               anomalies, failure)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(i64::from(record.sequence))
        .bind(record.phase_at_time.as_str())
        .bind(i64::from(record.iteration_number))
        .bind(record.timestamp.to_rfc3339())
        .bind(i64::from(record.open_count_before))
        .bind(i64::from(record.open_count_after))
        .bind(i64::from(record.items_promoted))
        .bind(i64::from(record.items_added))
        .bind(i64::from(record.items_demoted))
        .bind(record.outcome.as_str())
        .bind(anomalies)
        .bind(failure)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn load(&self, id: &str) -> DomainResult<SpecDocument> {
        // Reading inside a transaction gives a consistent snapshot across tables.
        let mut tx = self.pool.begin().await?;
        let (header, created_at) = Self::fetch_header(&mut tx, id).await?;

        let section_rows: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM spec_sections WHERE document_id = ? ORDER BY position")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;
        let mut sections: Vec<Section> = section_rows.into_iter().map(|(name,)| Section::new(name)).collect();

        let item_rows: Vec<ItemRow> = sqlx::query_as(
            r#"SELECT section_position, id, key, text, tier, origin, superseded, supersedes
               FROM spec_items WHERE document_id = ? ORDER BY section_position, position"#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        for row in item_rows {
            let position = usize::try_from(row.section_position)
                .map_err(|_| DomainError::SerializationError(format!("bad section position {}", row.section_position)))?;
            let item = Item::try_from(row)?;
            let section = sections.get_mut(position).ok_or_else(|| {
                DomainError::SerializationError(format!("item {} references missing section {position}", item.id))
            })?;
            section.items.push(item);
        }

        let record_rows: Vec<RecordRow> = sqlx::query_as(
            r#"SELECT sequence, phase_at_time, iteration_number, timestamp, open_count_before, open_count_after,
               items_promoted, items_added, items_demoted, outcome, anomalies, failure
               FROM iteration_records WHERE document_id = ? ORDER BY sequence"#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        let audit_log = record_rows
            .into_iter()
            .map(IterationRecord::try_from)
            .collect::<DomainResult<Vec<_>>>()?;

        tx.commit().await?;

        Ok(SpecDocument {
            id: header.id,
            title: header.title,
            phase: header.phase,
            iteration: header.iteration,
            sections,
            convergence: header.convergence,
            audit_log,
            revision: header.revision,
            created_at,
            updated_at: header.updated_at,
        })
    }

    async fn save(&self, doc: &SpecDocument) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        Self::write_header(&mut tx, doc).await?;
        Self::write_body(&mut tx, doc).await?;
        let mut inserted = 0_usize;
        for record in &doc.audit_log {
            if Self::insert_record(&mut tx, &doc.id, record).await? {
                inserted += 1;
            }
        }

        tx.commit().await?;
        debug!(
            document = %doc.id,
            revision = doc.revision,
            items = doc.item_count(),
            new_records = inserted,
            "document saved"
        );
        Ok(())
    }

    async fn append_audit_record(&self, id: &str, record: &IterationRecord) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        if Self::current_revision(&mut tx, id).await?.is_none() {
            return Err(DomainError::DocumentNotFound(id.to_string()));
        }
        let inserted = Self::insert_record(&mut tx, id, record).await?;
        tx.commit().await?;
        debug!(document = %id, sequence = record.sequence, inserted, "audit record appended");
        Ok(())
    }

    async fn load_header(&self, id: &str) -> DomainResult<DocumentHeader> {
        let mut tx = self.pool.begin().await?;
        let (header, _) = Self::fetch_header(&mut tx, id).await?;
        tx.commit().await?;
        Ok(header)
    }

    async fn list(&self) -> DomainResult<Vec<DocumentHeader>> {
        let rows: Vec<HeaderRow> =
            sqlx::query_as(&format!("SELECT {HEADER_COLUMNS} FROM spec_documents ORDER BY updated_at DESC, id"))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|row| row.into_parts().map(|(header, _)| header))
            .collect()
    }

    async fn exists(&self, id: &str) -> DomainResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM spec_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn reset_header(&self, id: &str) -> DomainResult<DocumentHeader> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"UPDATE spec_documents SET phase = ?, iteration = 0, stable_count = 0, open_count = 0,
               high_ratio = 0.0, observations = 0, observed_non_empty = 0,
               revision = MAX(revision, 0) + 1, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(Phase::Seed.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::DocumentNotFound(id.to_string()));
        }

        let (header, _) = Self::fetch_header(&mut tx, id).await?;
        tx.commit().await?;
        debug!(document = %id, revision = header.revision, "header reset");
        Ok(header)
    }
}

#[derive(sqlx::FromRow)]
struct HeaderRow {
    id: String,
    title: String,
    phase: String,
    iteration: i64,
    stable_count: i64,
    open_count: i64,
    high_ratio: f64,
    observations: i64,
    observed_non_empty: bool,
    revision: i64,
    created_at: String,
    updated_at: String,
}

impl HeaderRow {
    /// Convert into a header; malformed values make the document unresumable.
    fn into_parts(self) -> DomainResult<(DocumentHeader, DateTime<Utc>)> {
        let id = self.id;
        let invalid = |reason: String| DomainError::InvalidResumeState {
            document_id: id.clone(),
            reason,
        };
        let counter = |name: &str, value: i64| {
            u32::try_from(value).map_err(|_| invalid(format!("{name} has invalid value {value}")))
        };

        let phase = Phase::from_str(&self.phase).ok_or_else(|| invalid(format!("unknown phase '{}'", self.phase)))?;
        let iteration = counter("iteration", self.iteration)?;
        let convergence = ConvergenceSnapshot {
            stable_count: counter("stable_count", self.stable_count)?,
            open_count: counter("open_count", self.open_count)?,
            high_ratio: self.high_ratio,
            observations: counter("observations", self.observations)?,
            observed_non_empty: self.observed_non_empty,
        };
        let revision = u64::try_from(self.revision).map_err(|_| invalid(format!("revision has invalid value {}", self.revision)))?;
        let created_at = parse_datetime(&self.created_at)?;
        let updated_at = parse_datetime(&self.updated_at)?;

        Ok((
            DocumentHeader {
                id: id.clone(),
                title: self.title,
                phase,
                iteration,
                convergence,
                revision,
                updated_at,
            },
            created_at,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    section_position: i64,
    id: String,
    key: String,
    text: String,
    tier: String,
    origin: String,
    superseded: bool,
    supersedes: Option<String>,
}

impl TryFrom<ItemRow> for Item {
    type Error = DomainError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let tier = Tier::from_str(&row.tier)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid tier: {}", row.tier)))?;
        let origin = Origin::from_str(&row.origin)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid origin: {}", row.origin)))?;

        Ok(Item {
            id: parse_uuid(&row.id)?,
            key: row.key,
            text: row.text,
            tier,
            origin,
            superseded: row.superseded,
            supersedes: parse_optional_uuid(row.supersedes)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    sequence: i64,
    phase_at_time: String,
    iteration_number: i64,
    timestamp: String,
    open_count_before: i64,
    open_count_after: i64,
    items_promoted: i64,
    items_added: i64,
    items_demoted: i64,
    outcome: String,
    anomalies: String,
    failure: Option<String>,
}

impl TryFrom<RecordRow> for IterationRecord {
    type Error = DomainError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let count = |value: i64| {
            u32::try_from(value).map_err(|_| DomainError::SerializationError(format!("Invalid count: {value}")))
        };
        let phase_at_time = Phase::from_str(&row.phase_at_time)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid phase: {}", row.phase_at_time)))?;
        let outcome = IterationOutcome::from_str(&row.outcome)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid outcome: {}", row.outcome)))?;
        let failure: Option<FailureDetail> = row.failure.map(|f| serde_json::from_str(&f)).transpose()?;

        Ok(IterationRecord {
            sequence: count(row.sequence)?,
            phase_at_time,
            iteration_number: count(row.iteration_number)?,
            timestamp: parse_datetime(&row.timestamp)?,
            open_count_before: count(row.open_count_before)?,
            open_count_after: count(row.open_count_after)?,
            items_promoted: count(row.items_promoted)?,
            items_added: count(row.items_added)?,
            items_demoted: count(row.items_demoted)?,
            outcome,
            anomalies: serde_json::from_str(&row.anomalies)?,
            failure,
        })
    }
}
