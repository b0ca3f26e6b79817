//! Typed entity profiles
//!
//! Adapters build a [`CompanyProfile`] or [`ContactProfile`] from whatever their
//! vendor returns and turn it into evidence with `to_fields()`. The engine reads
//! fused records back into the same types with `from_fields()`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::evidence::FieldMap;

/// Funding information (merged key-by-key during fusion)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FundingInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_raised: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_round: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_round_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_investor: Option<String>,
}

/// Headquarters location (merged key-by-key during fusion)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Headquarters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompanyProfile {
    #[serde(default)]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    /// Employee band, e.g. `"51-200"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding: Option<FundingInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headquarters: Option<Headquarters>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tech_stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<String>,
}

impl CompanyProfile {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    /// Field map suitable for [`Evidence::new`](crate::evidence::Evidence::new)
    pub fn to_fields(&self) -> FieldMap {
        to_field_map(self)
    }

    /// Read a profile back from fused or raw fields; unknown fields are ignored
    pub fn from_fields(fields: &FieldMap) -> Self {
        serde_json::from_value(Value::Object(fields.clone())).unwrap_or_default()
    }
}

/// Seniority band inferred from a job title
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Seniority {
    #[default]
    Unknown,
    Individual,
    Manager,
    Director,
    Vp,
    CLevel,
}

impl Seniority {
    /// Classify a free-form title
    ///
    /// Vice-president titles are checked before C-level so that
    /// "Vice President" does not match on "president".
    pub fn from_title(title: &str) -> Self {
        let tokens: Vec<String> = title
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();
        if tokens.is_empty() {
            return Seniority::Unknown;
        }
        let has = |words: &[&str]| tokens.iter().any(|t| words.contains(&t.as_str()));

        if has(&["vp", "svp", "evp", "avp"]) || (has(&["vice"]) && has(&["president"])) {
            Seniority::Vp
        } else if has(&[
            "ceo", "cto", "cfo", "coo", "cmo", "cio", "cro", "cpo", "chief", "founder",
            "cofounder", "president", "owner",
        ]) {
            Seniority::CLevel
        } else if has(&["director", "head"]) {
            Seniority::Director
        } else if has(&["manager", "lead", "principal"]) {
            Seniority::Manager
        } else {
            Seniority::Individual
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Seniority::Unknown => "unknown",
            Seniority::Individual => "individual",
            Seniority::Manager => "manager",
            Seniority::Director => "director",
            Seniority::Vp => "vp",
            Seniority::CLevel => "c_level",
        }
    }
}

impl fmt::Display for Seniority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactProfile {
    #[serde(default)]
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seniority: Option<Seniority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    /// Domain of the employing company
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_domain: Option<String>,
    /// Derived authority score in [0, 100]; computed by the engine, never by providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_score: Option<u8>,
}

impl ContactProfile {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            ..Default::default()
        }
    }

    /// Seniority as reported, or inferred from the title
    pub fn effective_seniority(&self) -> Seniority {
        match (self.seniority, self.title.as_deref()) {
            (Some(s), _) if s != Seniority::Unknown => s,
            (_, Some(title)) => Seniority::from_title(title),
            _ => Seniority::Unknown,
        }
    }

    pub fn to_fields(&self) -> FieldMap {
        to_field_map(self)
    }

    pub fn from_fields(fields: &FieldMap) -> Self {
        serde_json::from_value(Value::Object(fields.clone())).unwrap_or_default()
    }
}

fn to_field_map<T: Serialize>(value: &T) -> FieldMap {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .filter(|(_, v)| match v {
                Value::String(s) => !s.is_empty(),
                Value::Null => false,
                _ => true,
            })
            .collect(),
        _ => FieldMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seniority_from_title() {
        assert_eq!(Seniority::from_title("Chief Revenue Officer"), Seniority::CLevel);
        assert_eq!(Seniority::from_title("Co-Founder & CEO"), Seniority::CLevel);
        assert_eq!(Seniority::from_title("Vice President, Sales"), Seniority::Vp);
        assert_eq!(Seniority::from_title("SVP Marketing"), Seniority::Vp);
        assert_eq!(Seniority::from_title("Head of Growth"), Seniority::Director);
        assert_eq!(Seniority::from_title("Engineering Manager"), Seniority::Manager);
        assert_eq!(Seniority::from_title("Account Executive"), Seniority::Individual);
        assert_eq!(Seniority::from_title(""), Seniority::Unknown);
    }

    #[test]
    fn test_company_to_fields_skips_empty() {
        let mut profile = CompanyProfile::new("acme.com");
        profile.industry = Some("Media".to_string());
        profile.tech_stack = vec!["React".to_string()];

        let fields = profile.to_fields();
        assert_eq!(fields.get("industry"), Some(&json!("Media")));
        assert_eq!(fields.get("tech_stack"), Some(&json!(["React"])));
        assert!(!fields.contains_key("size"));
        assert!(!fields.contains_key("products"));
    }

    #[test]
    fn test_company_from_fields_ignores_unknown() {
        let mut fields = FieldMap::new();
        fields.insert("domain".to_string(), json!("acme.com"));
        fields.insert("funding".to_string(), json!({"last_round": "Series B"}));
        fields.insert("mystery".to_string(), json!(42));

        let profile = CompanyProfile::from_fields(&fields);
        assert_eq!(profile.domain, "acme.com");
        assert_eq!(
            profile.funding.and_then(|f| f.last_round),
            Some("Series B".to_string())
        );
    }

    #[test]
    fn test_effective_seniority_uses_title() {
        let mut contact = ContactProfile::new("Jane Doe");
        contact.title = Some("VP Engineering".to_string());
        assert_eq!(contact.effective_seniority(), Seniority::Vp);

        contact.seniority = Some(Seniority::CLevel);
        assert_eq!(contact.effective_seniority(), Seniority::CLevel);
    }
}
