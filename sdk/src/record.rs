//! Fused records
//!
//! A [`FusedRecord`] is the current best-known state of one entity, derived by
//! folding every piece of evidence seen so far. Each scalar keeps the
//! confidence and provider it was adopted from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::entity::{CompanyProfile, ContactProfile};
use crate::evidence::{EntityKey, FieldMap};

/// A value together with the evidence that supplied it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attributed {
    pub value: Value,
    pub confidence: f64,
    pub provider: String,
}

/// One fused field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FusedField {
    /// Adopted from the highest-confidence evidence that set it
    Scalar(Attributed),
    /// Union of every source's items, de-duplicated case-insensitively
    List { items: Vec<Value> },
    /// Object merged key-by-key with the scalar rule
    Nested { entries: BTreeMap<String, Attributed> },
}

impl FusedField {
    /// Plain JSON value with provenance stripped
    pub fn to_value(&self) -> Value {
        match self {
            FusedField::Scalar(a) => a.value.clone(),
            FusedField::List { items } => Value::Array(items.clone()),
            FusedField::Nested { entries } => Value::Object(
                entries
                    .iter()
                    .map(|(k, a)| (k.clone(), a.value.clone()))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusedRecord {
    pub key: EntityKey,
    pub fields: BTreeMap<String, FusedField>,
    /// Distinct providers that contributed at least one field
    pub sources: Vec<String>,
    /// Number of evidence records folded (including inert ones)
    pub evidence_count: usize,
}

impl FusedRecord {
    pub fn empty(key: EntityKey) -> Self {
        Self {
            key,
            fields: BTreeMap::new(),
            sources: Vec::new(),
            evidence_count: 0,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FusedField> {
        self.fields.get(field)
    }

    /// Plain JSON value of a field
    pub fn value(&self, field: &str) -> Option<Value> {
        self.fields.get(field).map(FusedField::to_value)
    }

    /// String value of a scalar field
    pub fn str_value(&self, field: &str) -> Option<String> {
        match self.fields.get(field) {
            Some(FusedField::Scalar(a)) => a.value.as_str().map(String::from),
            _ => None,
        }
    }

    /// Confidence a scalar field (or nested entry `parent.child`) was adopted at
    pub fn confidence_of(&self, path: &str) -> Option<f64> {
        let (head, tail) = match path.split_once('.') {
            Some((h, t)) => (h, Some(t)),
            None => (path, None),
        };
        match (self.fields.get(head)?, tail) {
            (FusedField::Scalar(a), None) => Some(a.confidence),
            (FusedField::Nested { entries }, Some(child)) => {
                entries.get(child).map(|a| a.confidence)
            }
            _ => None,
        }
    }

    /// Flatten into a plain field map
    pub fn to_field_map(&self) -> FieldMap {
        self.fields
            .iter()
            .map(|(k, f)| (k.clone(), f.to_value()))
            .collect()
    }

    pub fn company(&self) -> CompanyProfile {
        let mut profile = CompanyProfile::from_fields(&self.to_field_map());
        if profile.domain.is_empty() {
            profile.domain = self.key.id.clone();
        }
        profile
    }

    pub fn contact(&self) -> ContactProfile {
        ContactProfile::from_fields(&self.to_field_map())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attributed(value: Value, confidence: f64) -> Attributed {
        Attributed {
            value,
            confidence,
            provider: "test".to_string(),
        }
    }

    #[test]
    fn test_field_values() {
        let mut record = FusedRecord::empty(EntityKey::company("acme.com"));
        record.fields.insert(
            "industry".to_string(),
            FusedField::Scalar(attributed(json!("Media"), 0.9)),
        );
        let mut entries = BTreeMap::new();
        entries.insert("city".to_string(), attributed(json!("Austin"), 0.4));
        record
            .fields
            .insert("headquarters".to_string(), FusedField::Nested { entries });

        assert_eq!(record.str_value("industry"), Some("Media".to_string()));
        assert_eq!(record.confidence_of("industry"), Some(0.9));
        assert_eq!(record.confidence_of("headquarters.city"), Some(0.4));
        assert_eq!(record.confidence_of("headquarters"), None);

        let company = record.company();
        assert_eq!(company.domain, "acme.com");
        assert_eq!(
            company.headquarters.and_then(|h| h.city),
            Some("Austin".to_string())
        );
    }
}
