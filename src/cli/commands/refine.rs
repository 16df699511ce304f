//! Automated refinement: `step` runs one iteration, `run` iterates until the
//! automated phase ends.

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;

use crate::cli::context::{cancel_on_ctrl_c, CliContext};
use crate::cli::output::progress::create_spinner;
use crate::cli::output::table::{create_table, outcome_cell, phase_cell};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Phase, SpecDocument};
use crate::services::{IterationReport, RefinementPipeline};

#[derive(Args, Debug)]
pub struct StepArgs {
    /// Document id
    pub id: String,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Document id
    pub id: String,
}

#[derive(Debug, serde::Serialize)]
pub struct RefineOutput {
    pub document_id: String,
    /// The document was in `Seed` and automation was restarted first
    pub restarted: bool,
    pub iterations: Vec<IterationReport>,
    pub phase: Phase,
}

impl CommandOutput for RefineOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if self.restarted {
            lines.push(format!("Restarted automation for '{}'.", self.document_id));
        }
        let mut table = create_table(["ITER", "PHASE", "OPEN", "HIGH RATIO", "STABLE", "OUTCOME", "NOTES"]);
        for report in &self.iterations {
            let r = &report.record;
            let mut notes = r.anomalies.clone();
            if report.partial_research {
                notes.push("partial research".to_string());
            }
            if let Some(failure) = &r.failure {
                notes.push(failure.reason.clone());
            }
            table.add_row(vec![
                Cell::new(r.iteration_number),
                phase_cell(r.phase_at_time),
                Cell::new(format!("{} -> {}", r.open_count_before, r.open_count_after)),
                Cell::new(format!("{:.2}", report.convergence.high_ratio)),
                Cell::new(report.convergence.stable_count),
                outcome_cell(r.outcome),
                Cell::new(notes.join("; ")),
            ]);
        }
        lines.push(table.to_string());

        let last = self.iterations.last().map(IterationReport::outcome);
        match last {
            Some(outcome) if !outcome.is_success() => lines.push(format!(
                "Iteration did not complete ({outcome}); the document is unchanged. \
                 Retry with `step`, or `escalate` to human review."
            )),
            _ if self.phase.is_human_review() => lines.push(format!(
                "Automated phase finished; '{}' is now in {} awaiting review.",
                self.document_id, self.phase
            )),
            _ => lines.push(format!("Phase: {}", self.phase)),
        }
        lines.join("\n")
    }
}

/// Restart automation for a document sitting in `Seed` after a reset.
async fn ensure_automated(pipeline: &RefinementPipeline, id: &str) -> Result<(SpecDocument, bool)> {
    let doc = pipeline.load(id).await?;
    if doc.phase == Phase::Seed {
        pipeline.begin(id).await?;
        return Ok((pipeline.load(id).await?, true));
    }
    Ok((doc, false))
}

pub async fn step(args: StepArgs, ctx: &CliContext) -> Result<()> {
    ctx.require_research()?;
    let pipeline = ctx.pipeline().await?;
    let (doc, restarted) = ensure_automated(&pipeline, &args.id).await?;

    let cancel = cancel_on_ctrl_c();
    let spinner = create_spinner(
        format!("{}: iteration {} of {}", doc.id, doc.iteration + 1, doc.phase),
        ctx.json,
    );
    let result = pipeline.run_iteration(&args.id, &cancel).await;
    spinner.finish_and_clear();
    let report = result?;

    let out = RefineOutput {
        document_id: report.document_id.clone(),
        restarted,
        phase: report.phase_after,
        iterations: vec![report],
    };
    output(&out, ctx.json);
    Ok(())
}

pub async fn run(args: RunArgs, ctx: &CliContext) -> Result<()> {
    ctx.require_research()?;
    let pipeline = ctx.pipeline().await?;
    let (doc, restarted) = ensure_automated(&pipeline, &args.id).await?;

    let cancel = cancel_on_ctrl_c();
    let spinner = create_spinner(format!("{}: refining in {}", doc.id, doc.phase), ctx.json);
    let result = pipeline.run_auto_phase(&args.id, &cancel).await;
    spinner.finish_and_clear();
    let iterations = result?;

    let phase = iterations.last().map_or(doc.phase, |r| r.phase_after);
    let out = RefineOutput {
        document_id: doc.id,
        restarted,
        iterations,
        phase,
    };
    output(&out, ctx.json);
    Ok(())
}
