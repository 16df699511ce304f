//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::export::ExportArgs;
use super::commands::init::InitArgs;
use super::commands::refine::{RunArgs, StepArgs};
use super::commands::review::{AnswerArgs, DocumentArgs, QuestionsArgs};
use super::commands::seed::SeedArgs;
use super::commands::status::{ListArgs, LogArgs, StatusArgs};

#[derive(Parser, Debug)]
#[command(name = "spec-refine")]
#[command(about = "Iterative specification refinement with convergence detection and review gates", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .spec-refine/config.yaml and local.yaml)
    #[arg(short, long, global = true, env = "SPEC_REFINE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .spec-refine/ with a default config and an empty database
    Init(InitArgs),
    /// Load a YAML seed document and start automated refinement
    Seed(SeedArgs),
    /// Show phase, convergence metrics and the next action for a document
    Status(StatusArgs),
    /// List all documents
    List(ListArgs),
    /// Run a single analyze, research and integrate iteration
    Step(StepArgs),
    /// Iterate until the automated phase converges or hits its ceiling
    Run(RunArgs),
    /// Show open questions awaiting review
    Questions(QuestionsArgs),
    /// Resolve open questions with confirmed answers
    Answer(AnswerArgs),
    /// Send the document back for another automated round
    More(DocumentArgs),
    /// Skip the rest of the automated phase and go to review
    Escalate(DocumentArgs),
    /// Approve the current review; the second approval finalizes the document
    Approve(DocumentArgs),
    /// Return the document to Seed, keeping its items and history
    Reset(DocumentArgs),
    /// Show the iteration audit log
    Log(LogArgs),
    /// Render the document as Markdown
    Export(ExportArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_answer_with_global_flags() {
        let cli = Cli::try_parse_from([
            "spec-refine",
            "answer",
            "billing",
            "--resolve",
            "a1b2=Postgres",
            "-r",
            "ffee=Daily",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Answer(args) => {
                assert_eq!(args.id, "billing");
                assert_eq!(args.resolutions, vec!["a1b2=Postgres", "ffee=Daily"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
