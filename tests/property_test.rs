//! Property tests for tier monotonicity, merge idempotence and the
//! convergence bound.

use proptest::prelude::*;

use spec_refine::domain::models::{FindingItem, FindingVerdict, IterationOutcome, Item, Origin, SpecDocument, Tier};
use spec_refine::services::tier_model::{demote, promote};
use spec_refine::services::{ConvergenceDetector, ConvergenceThresholds, MergeIntegrator};

const SECTIONS: [&str; 3] = ["storage", "api", "ops"];
const TEXTS: [&str; 6] = [
    "Use Postgres 16",
    "Clients speak gRPC",
    "Deploy on Kubernetes",
    "Which region hosts backups?",
    "Dataset is 4TB",
    "use postgres 16.",
];

fn tier_strategy() -> impl Strategy<Value = Tier> {
    prop_oneof![Just(Tier::Open), Just(Tier::Medium), Just(Tier::High)]
}

fn verdict_strategy() -> impl Strategy<Value = FindingVerdict> {
    prop_oneof![
        Just(FindingVerdict::Answers),
        Just(FindingVerdict::Confirms),
        Just(FindingVerdict::Contradicts),
        Just(FindingVerdict::New),
        Just(FindingVerdict::Unresolved),
    ]
}

fn base_document() -> SpecDocument {
    let mut doc = SpecDocument::new("prop", "Property");
    doc.add_item("storage", "Which database?", Tier::Open, Origin::Seed);
    doc.add_item("storage", "Data fits in memory", Tier::Medium, Origin::Seed);
    doc.add_item("api", "REST over HTTPS", Tier::High, Origin::Seed);
    doc.add_item("api", "Who owns the schema?", Tier::Open, Origin::Seed);
    doc.add_item("ops", "Single region", Tier::Medium, Origin::Seed);
    doc
}

/// Findings over `base_document`, optionally targeting one of its items.
fn finding_strategy() -> impl Strategy<Value = FindingItem> {
    (
        0..SECTIONS.len(),
        0..TEXTS.len(),
        verdict_strategy(),
        proptest::option::of(0usize..5),
        proptest::option::of(tier_strategy()),
    )
        .prop_map(|(section, text, verdict, target, hint)| {
            let doc = base_document();
            let mut finding = FindingItem::new(SECTIONS[section], TEXTS[text], verdict);
            if let Some(index) = target {
                let id = doc.items().nth(index).map(|(_, item)| item.id).unwrap();
                finding = finding.targeting(id);
            }
            finding.confidence_hint = hint;
            finding
        })
}

proptest! {
    #[test]
    fn proptest_promote_never_lowers(start in tier_strategy(), target in tier_strategy()) {
        let mut item = Item::new("s", "text", start, Origin::Seed, 0);
        promote(&mut item, target);
        prop_assert_eq!(item.tier, start.max(target));
    }

    #[test]
    fn proptest_demote_never_raises(start in tier_strategy(), target in tier_strategy()) {
        let mut item = Item::new("s", "text", start, Origin::Seed, 0);
        demote(&mut item, target);
        prop_assert_eq!(item.tier, start.min(target));
    }

    #[test]
    fn proptest_merge_replay_is_idempotent(findings in proptest::collection::vec(finding_strategy(), 0..8)) {
        let doc = base_document();
        let once = MergeIntegrator::merge(&findings, &doc);
        let twice = MergeIntegrator::merge(&findings, &once);
        prop_assert_eq!(&once.sections, &twice.sections);
    }

    #[test]
    fn proptest_merge_never_removes_or_lowers_high(findings in proptest::collection::vec(finding_strategy(), 0..8)) {
        let doc = base_document();
        let merged = MergeIntegrator::merge(&findings, &doc);
        for (_, item) in doc.items() {
            let (_, after) = merged.find_item(item.id).unwrap();
            if item.tier == Tier::High {
                prop_assert_eq!(after.tier, Tier::High);
            }
        }
        prop_assert!(merged.item_count() >= doc.item_count());
    }

    #[test]
    fn proptest_auto_phase_is_bounded(opens in proptest::collection::vec(0u32..20, 1..12), ratio in 0.0f64..1.0) {
        let thresholds = ConvergenceThresholds::default();
        let mut detector = ConvergenceDetector::primed(thresholds, opens[0], ratio);
        let mut ended_at = None;
        for (i, open) in opens.iter().enumerate() {
            let iteration = u32::try_from(i).unwrap() + 1;
            let outcome = detector.record_iteration(iteration, *open, ratio);
            if outcome.ends_phase() {
                ended_at = Some(iteration);
                break;
            }
            prop_assert_eq!(outcome, IterationOutcome::Continued);
        }
        if let Some(iteration) = ended_at {
            prop_assert!(iteration <= thresholds.max_iterations);
        } else {
            prop_assert!(opens.len() < thresholds.max_iterations as usize);
        }
    }
}
