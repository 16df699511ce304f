//! Confidence tier arithmetic.
//!
//! Tiers only move up through `promote` and only move down through an
//! explicit `demote`. Superseded items never count towards any metric.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{Item, Section, Tier};

/// Raise `item` to `target`. A lower or equal target leaves it unchanged.
///
/// Returns whether the tier changed.
pub fn promote(item: &mut Item, target: Tier) -> bool {
    if target > item.tier {
        item.tier = target;
        true
    } else {
        false
    }
}

/// Lower `item` to `target`. A higher or equal target leaves it unchanged.
pub fn demote(item: &mut Item, target: Tier) -> bool {
    if target < item.tier {
        item.tier = target;
        true
    } else {
        false
    }
}

/// Live item counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub high: u32,
    pub medium: u32,
    pub open: u32,
}

impl TierCounts {
    pub fn of(sections: &[Section]) -> Self {
        let mut counts = Self::default();
        for item in sections.iter().flat_map(|s| &s.items).filter(|i| i.is_live()) {
            match item.tier {
                Tier::High => counts.high += 1,
                Tier::Medium => counts.medium += 1,
                Tier::Open => counts.open += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> u32 {
        self.high + self.medium + self.open
    }
}

/// `High / max(1, High + Medium + Open)` over live items.
pub fn compute_high_ratio(sections: &[Section]) -> f64 {
    let counts = TierCounts::of(sections);
    f64::from(counts.high) / f64::from(counts.total().max(1))
}

/// Number of live Open items.
pub fn open_count(sections: &[Section]) -> u32 {
    TierCounts::of(sections).open
}

/// Item-level differences between two versions of a document body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub added: u32,
    pub promoted: u32,
    pub demoted: u32,
    pub superseded: u32,
}

impl ChangeCounts {
    pub fn between(before: &[Section], after: &[Section]) -> Self {
        let previous: HashMap<Uuid, &Item> = before
            .iter()
            .flat_map(|s| &s.items)
            .map(|item| (item.id, item))
            .collect();

        let mut counts = Self::default();
        for item in after.iter().flat_map(|s| &s.items) {
            match previous.get(&item.id) {
                None => counts.added += 1,
                Some(old) => {
                    if item.superseded && !old.superseded {
                        counts.superseded += 1;
                    } else if item.tier > old.tier {
                        counts.promoted += 1;
                    } else if item.tier < old.tier {
                        counts.demoted += 1;
                    }
                }
            }
        }
        counts
    }
}
