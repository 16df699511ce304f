//! The specification document under refinement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::audit::IterationRecord;
use super::item::{content_key, Item, Origin, Tier};

/// Top-level stage of the pipeline.
///
/// ```text
/// Seed → AutoA → HumanA → AutoB → HumanB → Finalize
///          ↖______↙         ↖______↙
///        (more automation)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Seed,
    AutoA,
    HumanA,
    AutoB,
    HumanB,
    Finalize,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::AutoA => "auto_a",
            Self::HumanA => "human_a",
            Self::AutoB => "auto_b",
            Self::HumanB => "human_b",
            Self::Finalize => "finalize",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "seed" => Some(Self::Seed),
            "auto_a" => Some(Self::AutoA),
            "human_a" => Some(Self::HumanA),
            "auto_b" => Some(Self::AutoB),
            "human_b" => Some(Self::HumanB),
            "finalize" => Some(Self::Finalize),
            _ => None,
        }
    }

    /// Automated refinement phases run sub-task iterations.
    pub fn is_automated(&self) -> bool {
        matches!(self, Self::AutoA | Self::AutoB)
    }

    /// Review phases accept human input.
    pub fn is_human_review(&self) -> bool {
        matches!(self, Self::HumanA | Self::HumanB)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalize)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last computed convergence metrics for the current automated phase.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConvergenceSnapshot {
    /// Consecutive observations with an unchanged open count
    pub stable_count: u32,
    pub open_count: u32,
    /// High items over all live items, in `[0, 1]`
    pub high_ratio: f64,
    /// Observations seen in this phase, including the phase-entry baseline
    #[serde(default)]
    pub observations: u32,
    /// Whether any observation in this phase had content
    #[serde(default)]
    pub observed_non_empty: bool,
}

/// A named, ordered group of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }
}

/// Whether `id` can name a document: ASCII letters, digits, `-`, `_` and `.`,
/// not starting with a dot. Ids double as artifact file names.
pub fn is_valid_document_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Metadata header persisted alongside the document.
///
/// This alone is enough to resume the phase state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub id: String,
    pub title: String,
    pub phase: Phase,
    pub iteration: u32,
    pub convergence: ConvergenceSnapshot,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

/// A specification document being refined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDocument {
    pub id: String,
    pub title: String,
    pub phase: Phase,
    pub iteration: u32,
    pub sections: Vec<Section>,
    pub convergence: ConvergenceSnapshot,
    #[serde(default)]
    pub audit_log: Vec<IterationRecord>,
    /// Save counter; the store only accepts `revision = persisted + 1`
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SpecDocument {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            phase: Phase::Seed,
            iteration: 0,
            sections: Vec::new(),
            convergence: ConvergenceSnapshot::default(),
            audit_log: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn header(&self) -> DocumentHeader {
        DocumentHeader {
            id: self.id.clone(),
            title: self.title.clone(),
            phase: self.phase,
            iteration: self.iteration,
            convergence: self.convergence,
            revision: self.revision,
            updated_at: self.updated_at,
        }
    }

    /// Mark the document as a new revision ready to be saved.
    pub fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Get a section by name, appending it if missing.
    pub fn section_mut(&mut self, name: &str) -> &mut Section {
        let index = match self.sections.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }

    /// All items with the name of the section holding them.
    pub fn items(&self) -> impl Iterator<Item = (&str, &Item)> {
        self.sections
            .iter()
            .flat_map(|s| s.items.iter().map(move |i| (s.name.as_str(), i)))
    }

    pub fn live_items(&self) -> impl Iterator<Item = (&str, &Item)> {
        self.items().filter(|(_, item)| item.is_live())
    }

    /// Live Open items, the questions presented to a reviewer.
    pub fn open_items(&self) -> impl Iterator<Item = (&str, &Item)> {
        self.items().filter(|(_, item)| item.is_open())
    }

    pub fn find_item(&self, id: Uuid) -> Option<(&str, &Item)> {
        self.items().find(|(_, item)| item.id == id)
    }

    pub fn find_item_mut(&mut self, id: Uuid) -> Option<&mut Item> {
        self.sections
            .iter_mut()
            .flat_map(|s| s.items.iter_mut())
            .find(|item| item.id == id)
    }

    /// Find the live item in `section` whose content identity matches `text`.
    pub fn find_live_by_text(&self, section: &str, text: &str) -> Option<&Item> {
        let key = content_key(text);
        self.section(section)?
            .items
            .iter()
            .find(|item| item.is_live() && item.key == key)
    }

    /// Append a new item, returning its id.
    pub fn add_item(&mut self, section: &str, text: impl Into<String>, tier: Tier, origin: Origin) -> Uuid {
        self.push_item(section, text.into(), tier, origin, None)
    }

    /// Append an item replacing `previous`, which must already be superseded.
    pub fn add_replacement(
        &mut self,
        section: &str,
        text: impl Into<String>,
        tier: Tier,
        origin: Origin,
        previous: Uuid,
    ) -> Uuid {
        self.push_item(section, text.into(), tier, origin, Some(previous))
    }

    fn push_item(
        &mut self,
        section: &str,
        text: String,
        tier: Tier,
        origin: Origin,
        previous: Option<Uuid>,
    ) -> Uuid {
        let key = content_key(&text);
        let target = self.section_mut(section);
        let generation = target.items.iter().filter(|i| i.key == key).count();
        let generation = u32::try_from(generation).unwrap_or(u32::MAX);
        let mut item = Item::new(section, text, tier, origin, generation);
        if let Some(previous) = previous {
            item = item.with_supersedes(previous);
        }
        let id = item.id;
        target.items.push(item);
        id
    }

    /// Sequence number for the next audit record.
    pub fn next_audit_sequence(&self) -> u32 {
        self.audit_log
            .last()
            .map_or(1, |record| record.sequence + 1)
    }

    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_roundtrip() {
        for phase in [
            Phase::Seed,
            Phase::AutoA,
            Phase::HumanA,
            Phase::AutoB,
            Phase::HumanB,
            Phase::Finalize,
        ] {
            assert_eq!(Phase::from_str(phase.as_str()), Some(phase));
        }
        assert_eq!(Phase::from_str("auto_c"), None);
        assert!(Phase::AutoB.is_automated());
        assert!(Phase::HumanA.is_human_review());
        assert!(Phase::Finalize.is_terminal());
    }

    #[test]
    fn test_add_item_creates_section_in_order() {
        let mut doc = SpecDocument::new("doc", "Doc");
        doc.add_item("goals", "Ship it", Tier::High, Origin::Seed);
        doc.add_item("storage", "Which database?", Tier::Open, Origin::Seed);
        doc.add_item("goals", "Keep it small", Tier::Medium, Origin::Seed);

        let names: Vec<_> = doc.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["goals", "storage"]);
        assert_eq!(doc.item_count(), 3);
        assert_eq!(doc.open_items().count(), 1);
    }

    #[test]
    fn test_replacement_gets_new_generation() {
        let mut doc = SpecDocument::new("doc", "Doc");
        let first = doc.add_item("storage", "Use Postgres", Tier::Medium, Origin::Seed);
        if let Some(item) = doc.find_item_mut(first) {
            item.superseded = true;
        }
        let second = doc.add_replacement("storage", "use postgres", Tier::High, Origin::HumanInput, first);

        assert_ne!(first, second);
        let live = doc.find_live_by_text("storage", "Use Postgres").unwrap();
        assert_eq!(live.id, second);
        assert_eq!(live.supersedes, Some(first));
    }

    #[test]
    fn test_touch_increments_revision() {
        let mut doc = SpecDocument::new("doc", "Doc");
        doc.touch();
        doc.touch();
        assert_eq!(doc.revision, 2);
        assert_eq!(doc.header().revision, 2);
    }

    #[test]
    fn test_document_id_rules() {
        assert!(is_valid_document_id("orders-v2.1"));
        assert!(is_valid_document_id("billing_service"));
        assert!(!is_valid_document_id(""));
        assert!(!is_valid_document_id("../escape"));
        assert!(!is_valid_document_id("nested/doc"));
        assert!(!is_valid_document_id("back\\slash"));
        assert!(!is_valid_document_id(".hidden"));
        assert!(!is_valid_document_id("has space"));
    }
}
