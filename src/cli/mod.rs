//! Command-line interface.

pub mod commands;
pub mod context;
pub mod id_resolver;
pub mod output;
pub mod types;

pub use context::CliContext;
pub use types::{Cli, Commands};

use crate::domain::errors::DomainError;

/// Print a failed command's error and exit with a non-zero status.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    let hint = err.downcast_ref::<DomainError>().and_then(hint_for);
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
            "hint": hint,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", console::style("Error:").red().bold());
        if let Some(hint) = hint {
            eprintln!("{} {hint}", console::style("Hint:").yellow());
        }
    }
    std::process::exit(1);
}

fn hint_for(err: &DomainError) -> Option<&'static str> {
    match err {
        DomainError::InvalidResumeState { .. } => Some("run `spec-refine reset <id>` to return the document to seed"),
        DomainError::PersistenceFailure { .. } => Some("the previous saved state is intact; retry the command"),
        DomainError::ConcurrencyConflict { .. } => {
            Some("another process updated this document; check `status` and retry")
        }
        DomainError::InvalidStateTransition { .. } => Some("`spec-refine status <id>` lists the allowed events"),
        DomainError::DocumentNotFound(_) => Some("`spec-refine list` shows known documents"),
        _ => None,
    }
}
