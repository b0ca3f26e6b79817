use proptest::prelude::*;
use serde_json::{json, Map, Value};

use scout_engine::fusion::{dedup_contacts, fuse};
use scout_engine::llm::{Pricing, TokenUsage};
use scout_engine::orchestrator::{BudgetTracker, RunState};
use sdk::entity::ContactProfile;
use sdk::evidence::{EntityKey, Evidence};

fn company_key() -> EntityKey {
    EntityKey::company("acme.com")
}

fn arb_fields() -> impl Strategy<Value = Map<String, Value>> {
    (
        prop::option::of("[A-Za-z]{1,8}"),
        prop::option::of("[A-Za-z]{1,8}"),
        prop::collection::vec("[a-z]{1,5}", 0..4),
    )
        .prop_map(|(industry, size, stack)| {
            let mut map = Map::new();
            if let Some(industry) = industry {
                map.insert("industry".to_string(), json!(industry));
            }
            if let Some(size) = size {
                map.insert("size".to_string(), json!(size));
            }
            if !stack.is_empty() {
                map.insert("tech_stack".to_string(), json!(stack));
            }
            map
        })
}

fn arb_evidence() -> impl Strategy<Value = Evidence> {
    ("[a-c]", 0.0..=1.0f64, arb_fields()).prop_map(|(provider, confidence, fields)| {
        Evidence::new(company_key(), provider, confidence, fields)
    })
}

// Fusing a permutation of the same evidence gives the same record
proptest! {
    #[test]
    fn test_fusion_is_order_independent(
        evidence in prop::collection::vec(arb_evidence(), 0..8),
        seed in any::<u64>(),
    ) {
        let mut shuffled = evidence.clone();
        // Deterministic shuffle driven by the seed
        let len = shuffled.len();
        if len > 1 {
            let mut s = seed;
            for i in (1..len).rev() {
                s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (s >> 33) as usize % (i + 1);
                shuffled.swap(i, j);
            }
        }

        prop_assert_eq!(fuse(&company_key(), &evidence), fuse(&company_key(), &shuffled));
    }
}

// Folding the same evidence twice changes no scalar value
proptest! {
    #[test]
    fn test_fold_is_idempotent(evidence in prop::collection::vec(arb_evidence(), 1..6)) {
        let mut once = RunState::new("once", 1.0);
        once.fold(evidence.clone());

        let mut twice = RunState::new("twice", 1.0);
        twice.fold(evidence.clone());
        twice.fold(evidence);

        let a = once.record(&company_key()).cloned();
        let b = twice.record(&company_key()).cloned();
        prop_assert_eq!(a.as_ref().map(|r| r.value("industry")), b.as_ref().map(|r| r.value("industry")));
        prop_assert_eq!(a.as_ref().map(|r| r.value("size")), b.as_ref().map(|r| r.value("size")));
        prop_assert_eq!(a.as_ref().map(|r| r.value("tech_stack")), b.as_ref().map(|r| r.value("tech_stack")));
    }
}

// A strictly more confident source always wins a scalar conflict
proptest! {
    #[test]
    fn test_higher_confidence_wins(
        low in 0.01..0.5f64,
        gap in 0.01..0.5f64,
        strong in "[A-Z][a-z]{2,6}",
        weak in "[a-z]{3,7}",
    ) {
        let high = low + gap;
        let weak_ev = Evidence::new(company_key(), "a", low, map_of("industry", &weak));
        let strong_ev = Evidence::new(company_key(), "z", high, map_of("industry", &strong));

        let record = fuse(&company_key(), &[weak_ev, strong_ev]);
        prop_assert_eq!(record.str_value("industry"), Some(strong.clone()));
        prop_assert_eq!(record.confidence_of("industry"), Some(high));
    }
}

// List fields are the case-insensitive union of every source
proptest! {
    #[test]
    fn test_lists_are_unioned(
        a in prop::collection::vec("[a-z]{1,4}", 1..5),
        b in prop::collection::vec("[a-z]{1,4}", 1..5),
    ) {
        let upper: Vec<String> = b.iter().map(|s| s.to_uppercase()).collect();
        let first = Evidence::new(company_key(), "a", 0.9, map_list("tech_stack", &a));
        let second = Evidence::new(company_key(), "b", 0.4, map_list("tech_stack", &upper));

        let record = fuse(&company_key(), &[first, second]);
        let merged: Vec<String> = record
            .value("tech_stack")
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_lowercase))
            .collect();

        let mut expected: Vec<String> = Vec::new();
        for item in a.iter().chain(b.iter()) {
            if !expected.contains(item) {
                expected.push(item.clone());
            }
        }
        let mut merged_sorted = merged.clone();
        merged_sorted.sort();
        expected.sort();
        prop_assert_eq!(merged_sorted, expected);
    }
}

// The budget total never decreases, whatever is charged
proptest! {
    #[test]
    fn test_budget_is_monotonic(
        charges in prop::collection::vec(prop_oneof![
            (-10.0..10.0f64).prop_map(Some),
            Just(None),
        ], 0..20),
        tokens in prop::collection::vec((0..5000u64, 0..5000u64), 0..10),
    ) {
        let mut budget = BudgetTracker::new(1.0);
        let mut last = budget.spent();
        for charge in charges {
            budget.add_flat(charge.unwrap_or(f64::NAN));
            prop_assert!(budget.spent() >= last);
            last = budget.spent();
        }
        for (i, o) in tokens {
            budget.add_usage(TokenUsage::new(i, o), Pricing::new(0.001, 0.002));
            prop_assert!(budget.spent() >= last);
            last = budget.spent();
        }
        prop_assert_eq!(budget.is_exceeded(), budget.spent() > 1.0);
    }
}

// Deduplication never yields two groups with the same identity
proptest! {
    #[test]
    fn test_dedup_keys_are_unique(
        people in prop::collection::vec(
            ("[A-C][a-c]{1,3}", prop::option::of("[a-c]{1,3}")),
            0..12,
        ),
    ) {
        let contacts: Vec<ContactProfile> = people
            .iter()
            .map(|(name, email)| {
                let mut c = ContactProfile::new(name.clone());
                c.email = email.as_ref().map(|e| format!("{}@acme.com", e));
                c
            })
            .collect();

        let groups = dedup_contacts(&contacts);
        let mut keys: Vec<&EntityKey> = groups.iter().map(|g| &g.key).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), total);
        prop_assert_eq!(groups.iter().map(|g| g.members.len()).sum::<usize>(), contacts.len());
    }
}

fn map_of(field: &str, value: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(field.to_string(), json!(value));
    map
}

fn map_list(field: &str, items: &[String]) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(field.to_string(), json!(items));
    map
}
