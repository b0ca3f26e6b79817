//! Evidence and entity identity
//!
//! An [`Evidence`] record is one provider's partial, confidence-scored opinion
//! about a single entity. Evidence is immutable once produced; the engine folds
//! every piece of evidence seen for an entity into a
//! [`FusedRecord`](crate::record::FusedRecord).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field set carried by a piece of evidence (field name → JSON value)
pub type FieldMap = Map<String, Value>;

/// Kind of real-world entity being enriched
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Company,
    Contact,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Company => write!(f, "company"),
            EntityKind::Contact => write!(f, "contact"),
        }
    }
}

/// Normalized identity of an entity within a run
///
/// Companies are keyed by normalized domain. Contacts are keyed by lower-cased
/// email, falling back to the lower-cased full name when no email is known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    /// Key a company by its domain (`https://www.Acme.com/about` → `acme.com`)
    pub fn company(domain: &str) -> Self {
        Self {
            kind: EntityKind::Company,
            id: normalize_domain(domain),
        }
    }

    /// Key a contact by email, or by full name when the email is missing or blank
    pub fn contact(email: Option<&str>, full_name: &str) -> Self {
        let id = match email.map(normalize_email) {
            Some(email) if !email.is_empty() => email,
            _ => normalize_name(full_name),
        };
        Self {
            kind: EntityKind::Contact,
            id,
        }
    }

    pub fn is_company(&self) -> bool {
        self.kind == EntityKind::Company
    }

    pub fn is_contact(&self) -> bool {
        self.kind == EntityKind::Contact
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Strip scheme, `www.`, credentials, port, path and trailing dot; lower-case.
pub fn normalize_domain(raw: &str) -> String {
    let mut s = raw.trim().to_lowercase();
    if let Some(pos) = s.find("://") {
        s = s[pos + 3..].to_string();
    }
    if let Some(pos) = s.find(['/', '?', '#']) {
        s.truncate(pos);
    }
    if let Some(pos) = s.rfind('@') {
        s = s[pos + 1..].to_string();
    }
    if let Some(pos) = s.find(':') {
        s.truncate(pos);
    }
    let s = s.trim_end_matches('.');
    s.strip_prefix("www.").unwrap_or(s).to_string()
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Lower-case and collapse internal whitespace
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// One source's partial observation about an entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    /// Entity this evidence describes
    pub entity: EntityKey,

    /// Provider or sub-agent that produced it
    pub provider: String,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Fields populated by this source
    pub fields: FieldMap,

    /// Names of the fields this source actually populated
    pub data_points: Vec<String>,

    /// Cost charged by the provider for this observation
    #[serde(default)]
    pub cost: f64,

    /// Time the provider took to answer
    #[serde(default)]
    pub duration_ms: u64,
}

impl Evidence {
    /// Create evidence from a field map
    ///
    /// Confidence is clamped into [0, 1] (NaN becomes 0) and `null` fields are
    /// dropped, so `data_points` lists exactly the fields that carry a value.
    pub fn new(
        entity: EntityKey,
        provider: impl Into<String>,
        confidence: f64,
        fields: FieldMap,
    ) -> Self {
        let fields: FieldMap = fields.into_iter().filter(|(_, v)| !v.is_null()).collect();
        let data_points = fields.keys().cloned().collect();
        Self {
            entity,
            provider: provider.into(),
            confidence: clamp_confidence(confidence),
            fields,
            data_points,
            cost: 0.0,
            duration_ms: 0,
        }
    }

    /// Attach the provider cost for this observation
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = if cost.is_finite() && cost > 0.0 { cost } else { 0.0 };
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Evidence that cannot influence a fused record
    pub fn is_inert(&self) -> bool {
        self.confidence <= 0.0 || self.fields.is_empty()
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("https://www.Acme.com/about"), "acme.com");
        assert_eq!(normalize_domain("acme.com."), "acme.com");
        assert_eq!(normalize_domain("  ACME.io:8080 "), "acme.io");
        assert_eq!(normalize_domain("http://user@shop.acme.com?q=1"), "shop.acme.com");
    }

    #[test]
    fn test_contact_key_prefers_email() {
        let key = EntityKey::contact(Some(" Jane@Acme.com "), "Jane Doe");
        assert_eq!(key.id, "jane@acme.com");
        assert!(key.is_contact());
    }

    #[test]
    fn test_contact_key_falls_back_to_name() {
        let key = EntityKey::contact(None, "  Jane   DOE ");
        assert_eq!(key.id, "jane doe");

        let blank = EntityKey::contact(Some("   "), "Jane Doe");
        assert_eq!(blank.id, "jane doe");
    }

    #[test]
    fn test_evidence_drops_null_fields() {
        let mut fields = FieldMap::new();
        fields.insert("industry".to_string(), json!("Media"));
        fields.insert("size".to_string(), Value::Null);

        let evidence = Evidence::new(EntityKey::company("acme.com"), "clearbit", 0.9, fields);
        assert_eq!(evidence.data_points, vec!["industry".to_string()]);
        assert!(!evidence.is_inert());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let e = Evidence::new(EntityKey::company("a.com"), "p", 1.7, FieldMap::new());
        assert_eq!(e.confidence, 1.0);
        let e = Evidence::new(EntityKey::company("a.com"), "p", f64::NAN, FieldMap::new());
        assert_eq!(e.confidence, 0.0);
        assert!(e.is_inert());
    }

    #[test]
    fn test_negative_cost_ignored() {
        let e = Evidence::new(EntityKey::company("a.com"), "p", 0.5, FieldMap::new()).with_cost(-3.0);
        assert_eq!(e.cost, 0.0);
    }
}
