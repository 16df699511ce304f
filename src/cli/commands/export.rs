//! `spec-refine export`: render the document as Markdown.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::cli::context::CliContext;
use crate::cli::output::{output, CommandOutput};
use crate::services::artifact::render_markdown;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Document id
    pub id: String,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, serde::Serialize)]
pub struct ExportOutput {
    pub document_id: String,
    pub phase: String,
    pub path: Option<PathBuf>,
    pub markdown: String,
}

impl CommandOutput for ExportOutput {
    fn to_human(&self) -> String {
        match &self.path {
            Some(path) => format!("Exported '{}' to {}", self.document_id, path.display()),
            None => self.markdown.clone(),
        }
    }
}

pub async fn execute(args: ExportArgs, ctx: &CliContext) -> Result<()> {
    let doc = ctx.pipeline().await?.load(&args.id).await?;
    if !doc.phase.is_terminal() {
        tracing::info!(document = %doc.id, phase = %doc.phase, "exporting a document that is not finalized");
    }
    let markdown = render_markdown(&doc);

    if let Some(path) = &args.output {
        tokio::fs::write(path, &markdown)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let out = ExportOutput {
        document_id: doc.id,
        phase: doc.phase.to_string(),
        path: args.output,
        markdown,
    };
    output(&out, ctx.json);
    Ok(())
}
