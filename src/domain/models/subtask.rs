//! Values exchanged with the analyze, research and integrate sub-tasks.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::SpecDocument;
use super::item::{Origin, Tier};
use crate::domain::errors::{DomainError, DomainResult};

/// The three ordered steps of an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStep {
    Analyze,
    Research,
    Integrate,
}

impl SubtaskStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Research => "research",
            Self::Integrate => "integrate",
        }
    }

    /// Result kind a sub-task of this step must return.
    pub fn expected_kind(&self) -> SubtaskKind {
        match self {
            Self::Analyze => SubtaskKind::Ambiguity,
            Self::Research => SubtaskKind::Finding,
            Self::Integrate => SubtaskKind::Merge,
        }
    }
}

impl std::fmt::Display for SubtaskStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unresolved point raised by analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguityItem {
    pub section: String,
    pub question: String,
    /// Existing item the question concerns
    #[serde(default)]
    pub item_id: Option<Uuid>,
}

impl AmbiguityItem {
    pub fn new(section: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            question: question.into(),
            item_id: None,
        }
    }

    pub fn about(mut self, item_id: Uuid) -> Self {
        self.item_id = Some(item_id);
        self
    }
}

/// What a finding says about its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingVerdict {
    /// Resolves an open question with new content
    Answers,
    /// Supports an existing item
    Confirms,
    /// Invalidates an existing item
    Contradicts,
    /// Adds content not tied to an existing item
    New,
    /// Research produced nothing for an ambiguity
    Unresolved,
}

/// A result produced by research.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingItem {
    pub section: String,
    pub text: String,
    #[serde(default)]
    pub target: Option<Uuid>,
    pub verdict: FindingVerdict,
    /// Advisory tier; the integrator makes the final call
    #[serde(default)]
    pub confidence_hint: Option<Tier>,
    #[serde(default = "default_finding_origin")]
    pub origin: Origin,
}

fn default_finding_origin() -> Origin {
    Origin::Research
}

impl FindingItem {
    pub fn new(section: impl Into<String>, text: impl Into<String>, verdict: FindingVerdict) -> Self {
        Self {
            section: section.into(),
            text: text.into(),
            target: None,
            verdict,
            confidence_hint: None,
            origin: Origin::Research,
        }
    }

    pub fn targeting(mut self, target: Uuid) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_hint(mut self, tier: Tier) -> Self {
        self.confidence_hint = Some(tier);
        self
    }

    /// Carry an unanswered ambiguity into integration as an open question.
    pub fn unresolved(ambiguity: &AmbiguityItem) -> Self {
        Self {
            section: ambiguity.section.clone(),
            text: ambiguity.question.clone(),
            target: ambiguity.item_id,
            verdict: FindingVerdict::Unresolved,
            confidence_hint: Some(Tier::Open),
            origin: Origin::Analysis,
        }
    }

    /// Whether this finding responds to the given ambiguity.
    pub fn addresses(&self, ambiguity: &AmbiguityItem) -> bool {
        match (self.target, ambiguity.item_id) {
            (Some(target), Some(item_id)) => target == item_id,
            _ => {
                self.section == ambiguity.section
                    && crate::domain::models::content_key(&self.text)
                        == crate::domain::models::content_key(&ambiguity.question)
            }
        }
    }
}

/// Kind of structured result a sub-task returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskKind {
    Ambiguity,
    Finding,
    Merge,
}

/// Envelope returned by sub-tasks across a process boundary.
///
/// The payload is opaque to the pipeline beyond item extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskResult {
    pub kind: SubtaskKind,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub confidence_hint: Option<Tier>,
}

impl SubtaskResult {
    pub fn ambiguities(items: &[AmbiguityItem]) -> DomainResult<Self> {
        Ok(Self {
            kind: SubtaskKind::Ambiguity,
            payload: serde_json::to_value(items)?,
            confidence_hint: None,
        })
    }

    pub fn findings(items: &[FindingItem]) -> DomainResult<Self> {
        Ok(Self {
            kind: SubtaskKind::Finding,
            payload: serde_json::to_value(items)?,
            confidence_hint: None,
        })
    }

    pub fn merge(document: &SpecDocument) -> DomainResult<Self> {
        Ok(Self {
            kind: SubtaskKind::Merge,
            payload: serde_json::to_value(document)?,
            confidence_hint: None,
        })
    }

    fn expect_kind(&self, kind: SubtaskKind) -> DomainResult<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(DomainError::ValidationFailed(format!(
                "expected {kind:?} result, got {:?}",
                self.kind
            )))
        }
    }

    pub fn into_ambiguities(self) -> DomainResult<Vec<AmbiguityItem>> {
        self.expect_kind(SubtaskKind::Ambiguity)?;
        Ok(serde_json::from_value(self.payload)?)
    }

    /// Extract findings; a single object or a list are both accepted.
    ///
    /// The envelope hint applies to findings that carry none of their own.
    pub fn into_findings(self) -> DomainResult<Vec<FindingItem>> {
        self.expect_kind(SubtaskKind::Finding)?;
        let mut findings: Vec<FindingItem> = if self.payload.is_array() {
            serde_json::from_value(self.payload)?
        } else {
            vec![serde_json::from_value(self.payload)?]
        };
        if let Some(hint) = self.confidence_hint {
            for finding in &mut findings {
                finding.confidence_hint.get_or_insert(hint);
            }
        }
        Ok(findings)
    }

    pub fn into_document(self) -> DomainResult<SpecDocument> {
        self.expect_kind(SubtaskKind::Merge)?;
        Ok(serde_json::from_value(self.payload)?)
    }
}
