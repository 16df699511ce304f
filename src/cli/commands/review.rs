//! Human review commands and operator phase controls.

use anyhow::{bail, Context, Result};
use clap::Args;
use comfy_table::Cell;
use serde::Deserialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::cli::context::CliContext;
use crate::cli::id_resolver::resolve_item_id;
use crate::cli::output::table::create_table;
use crate::cli::output::{output, short_id, CommandOutput};
use crate::services::{HumanResolution, OpenQuestion, PhaseChange};

#[derive(Args, Debug)]
pub struct QuestionsArgs {
    /// Document id
    pub id: String,
}

#[derive(Args, Debug)]
pub struct AnswerArgs {
    /// Document id
    pub id: String,

    /// Resolution as ITEM=TEXT, where ITEM is any unique prefix of the question id
    #[arg(short, long = "resolve", value_name = "ITEM=TEXT")]
    pub resolutions: Vec<String>,

    /// YAML file with a list of `{item, resolution}` entries
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DocumentArgs {
    /// Document id
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct AnswerEntry {
    item: String,
    resolution: String,
}

#[derive(Debug, serde::Serialize)]
pub struct QuestionsOutput {
    pub document_id: String,
    pub questions: Vec<OpenQuestion>,
}

impl CommandOutput for QuestionsOutput {
    fn to_human(&self) -> String {
        if self.questions.is_empty() {
            return format!("No open questions for '{}'.", self.document_id);
        }
        let mut table = create_table(["ID", "SECTION", "QUESTION", "FROM"]);
        for q in &self.questions {
            table.add_row(vec![
                Cell::new(short_id(&q.item_id)),
                Cell::new(&q.section),
                Cell::new(&q.text),
                Cell::new(q.origin.as_str()),
            ]);
        }
        format!(
            "{} open question(s) for '{}':\n{table}\nAnswer with: spec-refine answer {} --resolve ID=TEXT",
            self.questions.len(),
            self.document_id,
            self.document_id
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct AnswerOutput {
    pub document_id: String,
    pub resolved: Vec<Uuid>,
    pub remaining_open: usize,
}

impl CommandOutput for AnswerOutput {
    fn to_human(&self) -> String {
        format!(
            "Recorded {} answer(s) for '{}'; {} open question(s) remain.",
            self.resolved.len(),
            self.document_id,
            self.remaining_open
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct PhaseChangeOutput {
    #[serde(flatten)]
    pub change: PhaseChange,
}

impl CommandOutput for PhaseChangeOutput {
    fn to_human(&self) -> String {
        let t = &self.change.transition;
        let mut lines = Vec::new();
        if self.change.repaired {
            lines.push(format!(
                "Header of '{}' was malformed and has been rewritten.",
                self.change.document_id
            ));
        }
        lines.push(format!("'{}': {} -> {} ({})", self.change.document_id, t.from, t.to, t.event));
        if let Some(path) = &self.change.artifact {
            lines.push(format!("Final document written to {}", path.display()));
        }
        lines.join("\n")
    }
}

fn parse_resolution(raw: &str) -> Result<(String, String)> {
    let Some((item, text)) = raw.split_once('=') else {
        bail!("Invalid resolution '{raw}': expected ITEM=TEXT");
    };
    Ok((item.trim().to_string(), text.trim().to_string()))
}

pub async fn questions(args: QuestionsArgs, ctx: &CliContext) -> Result<()> {
    let pipeline = ctx.pipeline().await?;
    let questions = pipeline.open_questions(&args.id).await?;
    output(
        &QuestionsOutput {
            document_id: args.id,
            questions,
        },
        ctx.json,
    );
    Ok(())
}

pub async fn answer(args: AnswerArgs, ctx: &CliContext) -> Result<()> {
    let mut raw: Vec<(String, String)> = args
        .resolutions
        .iter()
        .map(|r| parse_resolution(r))
        .collect::<Result<_>>()?;
    if let Some(path) = &args.file {
        let yaml = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let entries: Vec<AnswerEntry> = serde_yaml::from_str(&yaml).context("Invalid answers file")?;
        raw.extend(entries.into_iter().map(|e| (e.item, e.resolution)));
    }
    if raw.is_empty() {
        bail!("Nothing to answer. Pass --resolve ITEM=TEXT or --file.");
    }

    let pipeline = ctx.pipeline().await?;
    let open: Vec<Uuid> = pipeline
        .open_questions(&args.id)
        .await?
        .into_iter()
        .map(|q| q.item_id)
        .collect();
    let resolutions = raw
        .into_iter()
        .map(|(prefix, resolution)| {
            Ok(HumanResolution {
                item_id: resolve_item_id(&open, &prefix)?,
                resolution,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let resolved = pipeline.apply_human_input(&args.id, &resolutions).await?;
    let remaining_open = pipeline.open_questions(&args.id).await?.len();
    output(
        &AnswerOutput {
            document_id: args.id,
            resolved,
            remaining_open,
        },
        ctx.json,
    );
    Ok(())
}

pub async fn more(args: DocumentArgs, ctx: &CliContext) -> Result<()> {
    let change = ctx.pipeline().await?.request_more_automation(&args.id).await?;
    output(&PhaseChangeOutput { change }, ctx.json);
    Ok(())
}

pub async fn escalate(args: DocumentArgs, ctx: &CliContext) -> Result<()> {
    let change = ctx.pipeline().await?.escalate_to_review(&args.id).await?;
    output(&PhaseChangeOutput { change }, ctx.json);
    Ok(())
}

pub async fn approve(args: DocumentArgs, ctx: &CliContext) -> Result<()> {
    let change = ctx.pipeline().await?.approve_review(&args.id).await?;
    output(&PhaseChangeOutput { change }, ctx.json);
    Ok(())
}

pub async fn reset(args: DocumentArgs, ctx: &CliContext) -> Result<()> {
    let change = ctx.pipeline().await?.reset(&args.id).await?;
    output(&PhaseChangeOutput { change }, ctx.json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        let (item, text) = parse_resolution("a1b2 = Use Postgres 16 = latest").unwrap();
        assert_eq!(item, "a1b2");
        assert_eq!(text, "Use Postgres 16 = latest");
        assert!(parse_resolution("no separator").is_err());
    }
}
