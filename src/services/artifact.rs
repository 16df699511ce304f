//! Markdown rendering of a finalized document.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{is_valid_document_id, SpecDocument, Tier};
use crate::services::tier_model::TierCounts;

/// Render the live items of `doc` grouped by section and tier.
pub fn render_markdown(doc: &SpecDocument) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", doc.title);

    let counts = TierCounts::of(&doc.sections);
    let _ = writeln!(
        out,
        "_{} confirmed, {} assumed, {} open; {} automated iteration(s) completed._\n",
        counts.high,
        counts.medium,
        counts.open,
        doc.audit_log.iter().filter(|r| r.outcome.is_success()).count()
    );

    for section in &doc.sections {
        let live: Vec<_> = section.items.iter().filter(|i| i.is_live()).collect();
        if live.is_empty() {
            continue;
        }
        let _ = writeln!(out, "## {}\n", section.name);
        for (tier, heading) in [
            (Tier::High, "Confirmed"),
            (Tier::Medium, "Assumed"),
            (Tier::Open, "Open questions"),
        ] {
            let items: Vec<_> = live.iter().filter(|i| i.tier == tier).collect();
            if items.is_empty() {
                continue;
            }
            let _ = writeln!(out, "### {heading}\n");
            for item in items {
                let _ = writeln!(out, "- {}", item.text);
            }
            out.push('\n');
        }
    }
    out
}

/// Write the rendered artifact to `<dir>/<id>.md` via a temporary file and rename.
pub async fn write_artifact(dir: &Path, doc: &SpecDocument) -> DomainResult<PathBuf> {
    let io_err = |e: std::io::Error| DomainError::PersistenceFailure {
        document_id: doc.id.clone(),
        reason: format!("failed to write artifact: {e}"),
    };

    if !is_valid_document_id(&doc.id) {
        return Err(DomainError::ValidationFailed(format!(
            "document id {:?} cannot be used as an artifact file name",
            doc.id
        )));
    }

    tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
    let path = dir.join(format!("{}.md", doc.id));
    let temp_path = path.with_extension("md.tmp");
    tokio::fs::write(&temp_path, render_markdown(doc)).await.map_err(io_err)?;
    tokio::fs::rename(&temp_path, &path).await.map_err(io_err)?;

    info!(document = %doc.id, path = %path.display(), "artifact written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FailureDetail, IterationOutcome, IterationRecord, Origin, Phase};

    fn document() -> SpecDocument {
        let mut doc = SpecDocument::new("billing", "Billing Service");
        doc.add_item("storage", "Use Postgres", Tier::High, Origin::HumanInput);
        doc.add_item("storage", "Nightly backups", Tier::Medium, Origin::Research);
        let stale = doc.add_item("storage", "Which database?", Tier::Open, Origin::Seed);
        doc.find_item_mut(stale).unwrap().superseded = true;
        doc.add_item("api", "Rate limits?", Tier::Open, Origin::Analysis);
        doc
    }

    #[test]
    fn test_render_skips_superseded() {
        let md = render_markdown(&document());
        assert!(md.starts_with("# Billing Service"));
        assert!(md.contains("### Confirmed\n\n- Use Postgres"));
        assert!(md.contains("### Assumed\n\n- Nightly backups"));
        assert!(md.contains("## api"));
        assert!(!md.contains("Which database?"));
    }

    #[tokio::test]
    async fn test_write_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let doc = document();
        let path = write_artifact(&dir.path().join("out"), &doc).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "billing.md");
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, render_markdown(&doc));
        assert!(!path.with_extension("md.tmp").exists());
    }

    #[test]
    fn test_summary_counts_completed_iterations_only() {
        let mut doc = document();
        let failed = |sequence, outcome| {
            IterationRecord::failed(
                sequence,
                Phase::AutoA,
                1,
                1,
                outcome,
                FailureDetail {
                    step: None,
                    reason: "stopped".to_string(),
                },
            )
        };
        doc.audit_log.push(failed(1, IterationOutcome::Failed));
        doc.audit_log.push(failed(2, IterationOutcome::Cancelled));
        let mut converged = failed(3, IterationOutcome::Converged);
        converged.failure = None;
        doc.audit_log.push(converged);

        let md = render_markdown(&doc);
        assert!(md.contains("1 automated iteration(s) completed"), "{md}");
    }

    #[tokio::test]
    async fn test_write_artifact_rejects_path_like_id() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut doc = document();
        doc.id = "../escape".to_string();

        let err = write_artifact(&out, &doc).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
        assert!(!dir.path().join("escape.md").exists());
    }
}
