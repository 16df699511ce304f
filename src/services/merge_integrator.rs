//! Built-in integrator applying research findings to a document.
//!
//! Findings are keyed by content identity so that replaying a batch is a
//! no-op: an existing live item with the same key is updated instead of a
//! second one being inserted. High items are never demoted here; a
//! contradiction against one is surfaced as an Open conflict item.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{content_key, FindingItem, FindingVerdict, Item, Origin, SpecDocument, Tier};
use crate::domain::ports::Integrator;
use crate::services::tier_model::{demote, promote};

const DEFAULT_FINDING_TIER: Tier = Tier::Medium;

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeIntegrator;

impl MergeIntegrator {
    pub fn new() -> Self {
        Self
    }

    /// Produce a new document with `findings` applied to `snapshot`.
    pub fn merge(findings: &[FindingItem], snapshot: &SpecDocument) -> SpecDocument {
        let mut doc = snapshot.clone();
        let batch_tiers = lowest_tier_per_key(findings);

        let mut ordered: Vec<&FindingItem> = findings.iter().collect();
        ordered.sort_by_key(|finding| apply_rank(finding.verdict));

        for finding in ordered {
            let tier = batch_tiers
                .get(&(finding.section.clone(), content_key(&finding.text)))
                .copied()
                .unwrap_or_else(|| finding.confidence_hint.unwrap_or(DEFAULT_FINDING_TIER));
            apply_finding(&mut doc, finding, tier);
        }
        doc
    }
}

#[async_trait]
impl Integrator for MergeIntegrator {
    fn name(&self) -> &str {
        "merge"
    }

    async fn integrate(&self, findings: Vec<FindingItem>, snapshot: Arc<SpecDocument>) -> DomainResult<SpecDocument> {
        Ok(Self::merge(&findings, &snapshot))
    }
}

/// Answers land first and contradictions last, so a replayed batch sees the
/// same intermediate states as the first application.
fn apply_rank(verdict: FindingVerdict) -> u8 {
    match verdict {
        FindingVerdict::Answers => 0,
        FindingVerdict::New | FindingVerdict::Unresolved => 1,
        FindingVerdict::Confirms => 2,
        FindingVerdict::Contradicts => 3,
    }
}

/// Within one batch, proposals for the same content resolve to the lowest tier.
fn lowest_tier_per_key(findings: &[FindingItem]) -> HashMap<(String, String), Tier> {
    let mut tiers: HashMap<(String, String), Tier> = HashMap::new();
    for finding in findings {
        if !matches!(finding.verdict, FindingVerdict::Answers | FindingVerdict::New) {
            continue;
        }
        let tier = finding.confidence_hint.unwrap_or(DEFAULT_FINDING_TIER);
        tiers
            .entry((finding.section.clone(), content_key(&finding.text)))
            .and_modify(|current| *current = (*current).min(tier))
            .or_insert(tier);
    }
    tiers
}

fn apply_finding(doc: &mut SpecDocument, finding: &FindingItem, tier: Tier) {
    let target = finding
        .target
        .and_then(|id| doc.find_item(id).map(|(section, item)| (section.to_string(), item.clone())));

    match (finding.verdict, target) {
        (FindingVerdict::Unresolved, Some(_)) => {}
        (FindingVerdict::Unresolved, None) => {
            if doc.find_live_by_text(&finding.section, &finding.text).is_none() {
                doc.add_item(&finding.section, finding.text.clone(), Tier::Open, finding.origin);
            }
        }
        (FindingVerdict::Answers, Some((section, item))) => {
            answer(doc, &section, &item, finding, tier);
        }
        (FindingVerdict::Confirms, Some((section, item))) => match live_successor(doc, &section, &item) {
            Some(id) => {
                if let Some(live) = doc.find_item_mut(id) {
                    promote(live, finding.confidence_hint.unwrap_or(DEFAULT_FINDING_TIER));
                }
            }
            None => add_or_promote(doc, &finding.section, finding, tier),
        },
        (FindingVerdict::Contradicts, Some((section, item))) => match live_successor(doc, &section, &item) {
            Some(id) => contradict(doc, &section, id, finding),
            None => add_or_promote(doc, &finding.section, finding, tier),
        },
        (_, _) => add_or_promote(doc, &finding.section, finding, tier),
    }
}

/// Supersede the answered item and record the answer in its place.
fn answer(doc: &mut SpecDocument, section: &str, target: &Item, finding: &FindingItem, tier: Tier) {
    if target.is_live() {
        if let Some(item) = doc.find_item_mut(target.id) {
            item.superseded = true;
        }
    }

    let existing = doc.find_live_by_text(section, &finding.text).map(|item| item.id);
    match existing {
        Some(id) => {
            if let Some(item) = doc.find_item_mut(id) {
                promote(item, tier);
            }
        }
        None => {
            debug!(section, target = %target.id, "adding answer");
            doc.add_replacement(section, finding.text.clone(), tier, finding.origin, target.id);
        }
    }
}

fn contradict(doc: &mut SpecDocument, section: &str, target: Uuid, finding: &FindingItem) {
    let Some(tier) = doc.find_item(target).map(|(_, item)| item.tier) else {
        return;
    };
    match tier {
        Tier::Medium => {
            if let Some(item) = doc.find_item_mut(target) {
                demote(item, Tier::Open);
            }
        }
        Tier::High => {
            if doc.find_live_by_text(section, &finding.text).is_none() {
                debug!(section, target = %target, "high item contradicted, raising conflict");
                doc.add_item(section, finding.text.clone(), Tier::Open, Origin::Integration);
            }
        }
        Tier::Open => {}
    }
}

fn add_or_promote(doc: &mut SpecDocument, section: &str, finding: &FindingItem, tier: Tier) {
    let existing = doc.find_live_by_text(section, &finding.text).map(|item| item.id);
    match existing {
        Some(id) => {
            if let Some(item) = doc.find_item_mut(id) {
                promote(item, tier);
            }
        }
        None => {
            doc.add_item(section, finding.text.clone(), tier, finding.origin);
        }
    }
}

/// Follow the supersession chain from `item` to its live replacement.
fn live_successor(doc: &SpecDocument, section: &str, item: &Item) -> Option<Uuid> {
    let items = &doc.section(section)?.items;
    let mut current = item;
    for _ in 0..items.len() {
        if current.is_live() {
            return Some(current.id);
        }
        current = items.iter().find(|next| next.supersedes == Some(current.id))?;
    }
    None
}
