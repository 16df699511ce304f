//! Built-in analyzer: every live Open item is an ambiguity.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AmbiguityItem, SpecDocument};
use crate::domain::ports::Analyzer;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenItemAnalyzer;

impl OpenItemAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn ambiguities(snapshot: &SpecDocument) -> Vec<AmbiguityItem> {
        snapshot
            .open_items()
            .map(|(section, item)| AmbiguityItem::new(section, item.text.clone()).about(item.id))
            .collect()
    }
}

#[async_trait]
impl Analyzer for OpenItemAnalyzer {
    fn name(&self) -> &str {
        "open-items"
    }

    async fn analyze(&self, snapshot: Arc<SpecDocument>) -> DomainResult<Vec<AmbiguityItem>> {
        Ok(Self::ambiguities(&snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Origin, Tier};

    #[tokio::test]
    async fn test_open_items_become_ambiguities() {
        let mut doc = SpecDocument::new("doc", "Doc");
        doc.add_item("goals", "Ship it", Tier::High, Origin::Seed);
        let q = doc.add_item("storage", "Which database?", Tier::Open, Origin::Seed);
        let stale = doc.add_item("storage", "Which region?", Tier::Open, Origin::Seed);
        doc.find_item_mut(stale).unwrap().superseded = true;

        let ambiguities = OpenItemAnalyzer::new().analyze(Arc::new(doc)).await.unwrap();
        assert_eq!(ambiguities, vec![AmbiguityItem::new("storage", "Which database?").about(q)]);
    }
}
