//! Evidence Fusion Engine
//!
//! Turns a stream of evidence about one entity into a single fused record and
//! deduplicates collections of contacts.
//!
//! # Merge rule
//!
//! Evidence is processed in one pass, highest confidence first. Ties are broken
//! by provider name and then by the canonical JSON of the field set, so the
//! result never depends on arrival order.
//!
//! - Scalars are adopted from the first evidence (in that order) that sets them.
//! - Lists are unioned across all evidence, de-duplicated case-insensitively.
//! - Objects are merged key-by-key with the scalar rule.
//!
//! Evidence with zero confidence or no fields is accepted and ignored.

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use sdk::evidence::{EntityKey, Evidence};
use sdk::record::{Attributed, FusedField, FusedRecord};

pub mod dedup;
pub mod scoring;

pub use dedup::{dedup_contacts, rank_contacts, ContactGroup, ScoredContact};
pub use scoring::{
    Predicate, Rule, ScoringPolicy, ScoringRule, Subject, Targeting, TitlePatterns,
};

/// Fuse every piece of evidence for `key` into a fresh record
///
/// Evidence for other entities is ignored.
pub fn fuse(key: &EntityKey, evidence: &[Evidence]) -> FusedRecord {
    let mut record = FusedRecord::empty(key.clone());
    let relevant: Vec<&Evidence> = evidence.iter().filter(|e| &e.entity == key).collect();
    record.evidence_count = relevant.len();

    let mut ordered: Vec<&Evidence> = relevant.into_iter().filter(|e| !e.is_inert()).collect();
    ordered.sort_by(|a, b| fold_order(a, b));

    let mut seen_items: BTreeMap<String, HashSet<String>> = BTreeMap::new();
    let mut sources = BTreeSet::new();

    for e in ordered {
        let mut contributed = false;
        for (name, value) in &e.fields {
            contributed |= merge_field(&mut record.fields, &mut seen_items, name, value, e);
        }
        if contributed {
            sources.insert(e.provider.clone());
        }
    }

    record.sources = sources.into_iter().collect();
    record
}

/// Confidence descending, then provider, then canonical field JSON
fn fold_order(a: &Evidence, b: &Evidence) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.provider.cmp(&b.provider))
        .then_with(|| canonical(a).cmp(&canonical(b)))
}

fn canonical(e: &Evidence) -> String {
    serde_json::to_string(&e.fields).unwrap_or_default()
}

/// Dedup key for list items
pub fn item_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_lowercase(),
        other => other.to_string().to_lowercase(),
    }
}

fn attributed(value: &Value, e: &Evidence) -> Attributed {
    Attributed {
        value: value.clone(),
        confidence: e.confidence,
        provider: e.provider.clone(),
    }
}

/// Returns true when this evidence changed the record
fn merge_field(
    fields: &mut BTreeMap<String, FusedField>,
    seen_items: &mut BTreeMap<String, HashSet<String>>,
    name: &str,
    value: &Value,
    e: &Evidence,
) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => {
            if matches!(fields.get(name), Some(f) if !matches!(f, FusedField::List { .. })) {
                return false;
            }
            let seen = seen_items.entry(name.to_string()).or_default();
            let fresh: Vec<Value> = items
                .iter()
                .filter(|item| !item.is_null() && !item_key(item).is_empty())
                .filter(|item| seen.insert(item_key(item)))
                .cloned()
                .collect();
            if fresh.is_empty() {
                return false;
            }
            if let FusedField::List { items: fused } = fields
                .entry(name.to_string())
                .or_insert_with(|| FusedField::List { items: Vec::new() })
            {
                fused.extend(fresh);
            }
            true
        }
        Value::Object(map) => {
            let entries = match fields.get(name) {
                None => BTreeMap::new(),
                Some(FusedField::Nested { entries }) => entries.clone(),
                Some(_) => return false,
            };
            let mut merged = entries;
            let mut changed = false;
            for (k, v) in map {
                if v.is_null() || merged.contains_key(k) {
                    continue;
                }
                merged.insert(k.clone(), attributed(v, e));
                changed = true;
            }
            if changed {
                fields.insert(name.to_string(), FusedField::Nested { entries: merged });
            }
            changed
        }
        scalar => {
            if fields.contains_key(name) {
                return false;
            }
            fields.insert(name.to_string(), FusedField::Scalar(attributed(scalar, e)));
            true
        }
    }
}
