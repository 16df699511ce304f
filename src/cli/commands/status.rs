//! Read-only commands: `status`, `list` and `log`.

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;

use crate::cli::context::CliContext;
use crate::cli::output::table::{create_table, outcome_cell, phase_cell};
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{DocumentHeader, IterationRecord};
use crate::services::phase_machine::allowed_events;
use crate::services::tier_model::TierCounts;
use crate::services::NextAction;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Document id
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Document id
    pub id: String,

    /// Show only the most recent records
    #[arg(short, long)]
    pub limit: Option<usize>,
}

#[derive(Debug, serde::Serialize)]
pub struct StatusOutput {
    pub header: DocumentHeader,
    pub next: NextAction,
    pub counts: TierCounts,
    pub allowed_events: Vec<String>,
    pub audit_records: usize,
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        let h = &self.header;
        let c = &h.convergence;
        let next = match self.next {
            NextAction::Begin => "run `step` to restart automation".to_string(),
            NextAction::RunIteration { iteration } => format!("run iteration {iteration} (`step` or `run`)"),
            NextAction::AwaitReview => "review open questions (`questions`, `answer`, `approve`, `more`)".to_string(),
            NextAction::Finished => "finished; `export` renders the document".to_string(),
        };
        [
            format!("Document: {} ({})", h.id, h.title),
            format!("Phase: {} (iteration {})", h.phase, h.iteration),
            format!(
                "Items: {} confirmed, {} assumed, {} open",
                self.counts.high, self.counts.medium, self.counts.open
            ),
            format!(
                "Convergence: open {}, high ratio {:.2}, stable for {} observation(s)",
                c.open_count, c.high_ratio, c.stable_count
            ),
            format!("Audit records: {}", self.audit_records),
            format!("Revision: {} (updated {})", h.revision, h.updated_at.format("%Y-%m-%d %H:%M:%S")),
            format!("Next: {next}"),
            format!("Allowed events: {}", self.allowed_events.join(", ")),
        ]
        .join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ListOutput {
    pub documents: Vec<DocumentHeader>,
    pub total: usize,
}

impl CommandOutput for ListOutput {
    fn to_human(&self) -> String {
        if self.documents.is_empty() {
            return "No documents found. Use `spec-refine seed <file>` to add one.".to_string();
        }
        let mut table = create_table(["ID", "TITLE", "PHASE", "ITER", "OPEN", "HIGH RATIO", "UPDATED"]);
        for doc in &self.documents {
            table.add_row(vec![
                Cell::new(&doc.id),
                Cell::new(truncate(&doc.title, 32)),
                phase_cell(doc.phase),
                Cell::new(doc.iteration),
                Cell::new(doc.convergence.open_count),
                Cell::new(format!("{:.2}", doc.convergence.high_ratio)),
                Cell::new(doc.updated_at.format("%Y-%m-%d %H:%M").to_string()),
            ]);
        }
        format!("Found {} document(s):\n{table}", self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct LogOutput {
    pub document_id: String,
    pub records: Vec<IterationRecord>,
}

impl CommandOutput for LogOutput {
    fn to_human(&self) -> String {
        if self.records.is_empty() {
            return format!("No iterations recorded for '{}'.", self.document_id);
        }
        let mut table = create_table(["#", "PHASE", "ITER", "OPEN", "+ADDED", "PROMOTED", "DEMOTED", "OUTCOME", "NOTES"]);
        for r in &self.records {
            let mut notes: Vec<String> = r.anomalies.clone();
            if let Some(failure) = &r.failure {
                let step = failure.step.map_or_else(|| "pipeline".to_string(), |s| s.to_string());
                notes.push(format!("{step}: {}", truncate(&failure.reason, 60)));
            }
            table.add_row(vec![
                Cell::new(r.sequence),
                phase_cell(r.phase_at_time),
                Cell::new(r.iteration_number),
                Cell::new(format!("{} -> {}", r.open_count_before, r.open_count_after)),
                Cell::new(r.items_added),
                Cell::new(r.items_promoted),
                Cell::new(r.items_demoted),
                outcome_cell(r.outcome),
                Cell::new(notes.join("; ")),
            ]);
        }
        format!("Audit log for '{}':\n{table}", self.document_id)
    }
}

pub async fn status(args: StatusArgs, ctx: &CliContext) -> Result<()> {
    let pipeline = ctx.pipeline().await?;
    let resume_point = pipeline.resume(&args.id).await?;
    let doc = pipeline.load(&args.id).await?;

    let out = StatusOutput {
        allowed_events: allowed_events(resume_point.header.phase)
            .iter()
            .map(|e| e.as_str().to_string())
            .collect(),
        counts: TierCounts::of(&doc.sections),
        audit_records: doc.audit_log.len(),
        header: resume_point.header,
        next: resume_point.next,
    };
    output(&out, ctx.json);
    Ok(())
}

pub async fn list(_args: ListArgs, ctx: &CliContext) -> Result<()> {
    let pipeline = ctx.pipeline().await?;
    let documents = pipeline.list().await?;
    let out = ListOutput {
        total: documents.len(),
        documents,
    };
    output(&out, ctx.json);
    Ok(())
}

pub async fn log(args: LogArgs, ctx: &CliContext) -> Result<()> {
    let pipeline = ctx.pipeline().await?;
    let doc = pipeline.load(&args.id).await?;
    let mut records = doc.audit_log;
    if let Some(limit) = args.limit {
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
    }
    let out = LogOutput {
        document_id: doc.id,
        records,
    };
    output(&out, ctx.json);
    Ok(())
}
