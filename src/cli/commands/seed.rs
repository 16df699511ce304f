//! `spec-refine seed <file>`: load a seed document and enter automation.
//!
//! Seed files are YAML:
//!
//! ```yaml
//! id: billing
//! title: Billing Service
//! sections:
//!   - name: storage
//!     items:
//!       - Which database backs invoices?      # plain text is an open question
//!       - text: Invoices are immutable once issued
//!         tier: high
//! ```

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::cli::context::CliContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Origin, SpecDocument, Tier};
use crate::services::tier_model::TierCounts;

#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Path to the YAML seed file
    pub file: PathBuf,

    /// Override the document id from the file
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sections: Vec<SeedSection>,
}

#[derive(Debug, Deserialize)]
pub struct SeedSection {
    pub name: String,
    #[serde(default)]
    pub items: Vec<SeedItem>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SeedItem {
    Question(String),
    Tiered {
        text: String,
        #[serde(default = "open_tier")]
        tier: Tier,
    },
}

fn open_tier() -> Tier {
    Tier::Open
}

impl SeedFile {
    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid seed file")
    }

    /// Build the unsaved document; repeated items within a section are dropped.
    pub fn into_document(self) -> Result<SpecDocument> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            bail!("Seed file has an empty id");
        }
        let mut doc = SpecDocument::new(id.clone(), self.title.unwrap_or(id));

        let mut names = HashSet::new();
        for section in self.sections {
            let name = section.name.trim().to_string();
            if name.is_empty() {
                bail!("Seed file has a section with an empty name");
            }
            if !names.insert(name.clone()) {
                bail!("Section '{name}' appears more than once");
            }
            doc.section_mut(&name);

            for item in section.items {
                let (text, tier) = match item {
                    SeedItem::Question(text) => (text, Tier::Open),
                    SeedItem::Tiered { text, tier } => (text, tier),
                };
                let text = text.trim();
                if text.is_empty() || doc.find_live_by_text(&name, text).is_some() {
                    continue;
                }
                doc.add_item(&name, text, tier, Origin::Seed);
            }
        }
        Ok(doc)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct SeedOutput {
    pub document_id: String,
    pub title: String,
    pub phase: String,
    pub sections: usize,
    pub high: u32,
    pub medium: u32,
    pub open: u32,
}

impl CommandOutput for SeedOutput {
    fn to_human(&self) -> String {
        format!(
            "Seeded '{}' ({}) with {} section(s): {} confirmed, {} assumed, {} open.\nPhase: {}",
            self.document_id, self.title, self.sections, self.high, self.medium, self.open, self.phase
        )
    }
}

pub async fn execute(args: SeedArgs, ctx: &CliContext) -> Result<()> {
    let yaml = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let mut seed = SeedFile::parse(&yaml)?;
    if let Some(id) = args.id {
        seed.id = id;
    }
    let doc = seed.into_document()?;
    let counts = TierCounts::of(&doc.sections);
    let sections = doc.sections.len();

    let pipeline = ctx.pipeline().await?;
    let header = pipeline.seed(doc).await?;

    let out = SeedOutput {
        document_id: header.id,
        title: header.title,
        phase: header.phase.to_string(),
        sections,
        high: counts.high,
        medium: counts.medium,
        open: counts.open,
    };
    output(&out, ctx.json);
    Ok(())
}
