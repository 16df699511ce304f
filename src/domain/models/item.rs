//! Specification items and their confidence tiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for content-derived item ids.
const ITEM_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b8e_4d3a_5e27_9a41_c0d5_e8f3_1b62);

/// Confidence classification of an item.
///
/// Ordering is `Open < Medium < High`; promotion moves up, demotion moves down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Unresolved question or gap
    Open,
    /// Inferred or assumed, not yet verified
    Medium,
    /// Verified or confirmed
    High,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Seed,
    Analysis,
    Research,
    Integration,
    HumanInput,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Analysis => "analysis",
            Self::Research => "research",
            Self::Integration => "integration",
            Self::HumanInput => "human_input",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "seed" => Some(Self::Seed),
            "analysis" => Some(Self::Analysis),
            "research" => Some(Self::Research),
            "integration" => Some(Self::Integration),
            "human_input" => Some(Self::HumanInput),
            _ => None,
        }
    }
}

/// Normalize item text into its content identity.
///
/// Case, surrounding whitespace, internal whitespace runs and trailing
/// sentence punctuation do not affect identity.
pub fn content_key(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(&['.', '!', '?', ';', ':'][..])
        .trim_end()
        .to_string()
}

/// Derive the id of an item from its section, content key and generation.
///
/// `generation` counts earlier items in the same section that shared the key
/// and were superseded, so a re-added item never collides with its
/// superseded predecessor.
pub fn item_id(section: &str, key: &str, generation: u32) -> Uuid {
    let name = format!("{section}\u{1f}{key}\u{1f}{generation}");
    Uuid::new_v5(&ITEM_NAMESPACE, name.as_bytes())
}

/// A single requirement, finding or open question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    /// Content identity used for deduplication
    pub key: String,
    pub text: String,
    pub tier: Tier,
    pub origin: Origin,
    #[serde(default)]
    pub superseded: bool,
    /// Item this one replaced, if any
    #[serde(default)]
    pub supersedes: Option<Uuid>,
}

impl Item {
    pub fn new(section: &str, text: impl Into<String>, tier: Tier, origin: Origin, generation: u32) -> Self {
        let text = text.into();
        let key = content_key(&text);
        Self {
            id: item_id(section, &key, generation),
            key,
            text,
            tier,
            origin,
            superseded: false,
            supersedes: None,
        }
    }

    pub fn with_supersedes(mut self, previous: Uuid) -> Self {
        self.supersedes = Some(previous);
        self
    }

    /// Whether the item still counts towards metrics.
    pub fn is_live(&self) -> bool {
        !self.superseded
    }

    pub fn is_open(&self) -> bool {
        self.is_live() && self.tier == Tier::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Open < Tier::Medium);
        assert!(Tier::Medium < Tier::High);
        assert_eq!(Tier::from_str("HIGH"), Some(Tier::High));
        assert_eq!(Tier::from_str("unknown"), None);
    }

    #[test]
    fn test_content_key_normalizes() {
        assert_eq!(content_key("  Use   Postgres. "), "use postgres");
        assert_eq!(content_key("use postgres"), content_key("USE POSTGRES!"));
    }

    #[test]
    fn test_item_id_is_deterministic() {
        let a = Item::new("storage", "Use Postgres", Tier::Medium, Origin::Seed, 0);
        let b = Item::new("storage", "use  postgres.", Tier::High, Origin::Research, 0);
        assert_eq!(a.id, b.id);

        let next_generation = Item::new("storage", "Use Postgres", Tier::Medium, Origin::Seed, 1);
        assert_ne!(a.id, next_generation.id);

        let other_section = Item::new("api", "Use Postgres", Tier::Medium, Origin::Seed, 0);
        assert_ne!(a.id, other_section.id);
    }

    #[test]
    fn test_origin_roundtrip() {
        for origin in [
            Origin::Seed,
            Origin::Analysis,
            Origin::Research,
            Origin::Integration,
            Origin::HumanInput,
        ] {
            assert_eq!(Origin::from_str(origin.as_str()), Some(origin));
        }
    }
}
