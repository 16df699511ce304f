//! Short item id resolution.
//!
//! Reviewers may type any unique prefix of an item id, like git short hashes.
//! Dashes are ignored so both the table form and the full form work.

use anyhow::{bail, Result};
use uuid::Uuid;

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("ID prefix must not be empty");
    }
    if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        bail!("Invalid ID prefix '{prefix}': must contain only hex characters and dashes");
    }
    Ok(())
}

/// Resolve `prefix` against `candidates`, requiring exactly one match.
pub fn resolve_item_id(candidates: &[Uuid], prefix: &str) -> Result<Uuid> {
    validate_prefix(prefix)?;
    let needle: String = prefix.chars().filter(|c| *c != '-').collect::<String>().to_lowercase();

    let matches: Vec<Uuid> = candidates
        .iter()
        .copied()
        .filter(|id| id.simple().to_string().starts_with(&needle))
        .collect();

    match matches.as_slice() {
        [] => bail!("No open question matches '{prefix}'"),
        [id] => Ok(*id),
        _ => bail!(
            "Ambiguous ID prefix '{prefix}' matches {} open questions. Use a longer prefix.",
            matches.len()
        ),
    }
}
