//! HTTP enrichment providers
//!
//! A generic JSON adapter configured from `[[providers]]`. Company providers
//! answer `GET {base_url}?domain=...` with a company object; contact providers
//! answer `GET {base_url}?domain=...&limit=...` with a list of people. Both may
//! wrap their payload in `data`, `company` or `contacts`, and common vendor
//! spellings of field names are mapped onto the profile fields.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use sdk::entity::{CompanyProfile, ContactProfile};
use sdk::errors::EngineError;
use sdk::evidence::FieldMap;

use crate::capabilities::{CompanyFindings, CompanyResearcher, ContactFinder, ContactFindings};
use crate::config::{ProviderConfig, ProviderKind};

const COMPANY_ALIASES: &[(&str, &str)] = &[
    ("company_name", "name"),
    ("legal_name", "name"),
    ("sector", "industry"),
    ("employees", "size"),
    ("employee_count", "size"),
    ("employee_range", "size"),
    ("technologies", "tech_stack"),
    ("tech", "tech_stack"),
    ("hq", "headquarters"),
];

const CONTACT_ALIASES: &[(&str, &str)] = &[
    ("name", "full_name"),
    ("job_title", "title"),
    ("position", "title"),
    ("linkedin", "linkedin_url"),
    ("phone_number", "phone"),
    ("verified", "email_verified"),
];

#[derive(Clone, Copy)]
enum Shape {
    Text,
    List,
    Object,
    Flag,
}

const COMPANY_FIELDS: &[(&str, Shape)] = &[
    ("name", Shape::Text),
    ("industry", Shape::Text),
    ("size", Shape::Text),
    ("description", Shape::Text),
    ("funding", Shape::Object),
    ("headquarters", Shape::Object),
    ("tech_stack", Shape::List),
    ("products", Shape::List),
];

const CONTACT_FIELDS: &[(&str, Shape)] = &[
    ("full_name", Shape::Text),
    ("title", Shape::Text),
    ("email", Shape::Text),
    ("email_verified", Shape::Flag),
    ("phone", Shape::Text),
    ("department", Shape::Text),
    ("linkedin_url", Shape::Text),
];

/// One configured enrichment endpoint
pub struct HttpProvider {
    config: ProviderConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpProvider {
    /// Build from config; the API key is read from the named variable
    pub fn from_config(config: ProviderConfig) -> Result<Self, EngineError> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var)
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| EngineError::MissingApiKey(var.clone()))?,
            ),
            None => None,
        };
        Ok(Self::new(config, api_key))
    }

    pub fn new(config: ProviderConfig, api_key: Option<String>) -> Self {
        Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, query: &[(&str, String)]) -> Result<Value, EngineError> {
        let mut request = self.client.get(&self.config.base_url).query(query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("{}: {}", self.config.name, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Network(format!(
                "{} returned {}: {}",
                self.config.name,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::Network(format!("{}: invalid JSON: {}", self.config.name, e)))
    }
}

#[async_trait]
impl CompanyResearcher for HttpProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn request_cost(&self) -> f64 {
        self.config.cost_per_request
    }

    async fn research(
        &self,
        domain: &str,
        name_hint: Option<&str>,
    ) -> Result<CompanyFindings, EngineError> {
        let mut query = vec![("domain", domain.to_string())];
        if let Some(name) = name_hint {
            query.push(("name", name.to_string()));
        }
        let body = self.fetch(&query).await?;
        let object = unwrap_object(&body, &["data", "company"]).ok_or_else(|| {
            EngineError::Network(format!("{}: expected a company object", self.config.name))
        })?;

        let mut profile = CompanyProfile::from_fields(&normalize_company(object));
        profile.domain = domain.to_string();
        debug!("{} profiled {}", self.config.name, domain);

        Ok(CompanyFindings {
            profile,
            confidence: self.config.confidence,
            cost: self.config.cost_per_request,
        })
    }
}

#[async_trait]
impl ContactFinder for HttpProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn request_cost(&self) -> f64 {
        self.config.cost_per_request
    }

    async fn find(
        &self,
        domain: &str,
        roles: &[String],
        limit: usize,
    ) -> Result<ContactFindings, EngineError> {
        let mut query = vec![("domain", domain.to_string()), ("limit", limit.to_string())];
        if !roles.is_empty() {
            query.push(("roles", roles.join(",")));
        }
        let body = self.fetch(&query).await?;
        let items = unwrap_array(&body, &["contacts", "data", "people"]).ok_or_else(|| {
            EngineError::Network(format!("{}: expected a list of contacts", self.config.name))
        })?;

        let contacts: Vec<ContactProfile> = items
            .iter()
            .filter_map(Value::as_object)
            .map(|o| ContactProfile::from_fields(&normalize_contact(o)))
            .filter(|c| !c.full_name.trim().is_empty() || c.email.is_some())
            .take(limit)
            .collect();

        Ok(ContactFindings {
            contacts,
            confidence: self.config.confidence,
            cost: self.config.cost_per_request,
        })
    }
}

fn unwrap_object<'a>(body: &'a Value, wrappers: &[&str]) -> Option<&'a Map<String, Value>> {
    let object = body.as_object()?;
    for w in wrappers {
        if let Some(inner) = object.get(*w).and_then(Value::as_object) {
            return Some(inner);
        }
    }
    Some(object)
}

fn unwrap_array<'a>(body: &'a Value, wrappers: &[&str]) -> Option<&'a Vec<Value>> {
    if let Some(items) = body.as_array() {
        return Some(items);
    }
    let object = body.as_object()?;
    wrappers
        .iter()
        .find_map(|w| object.get(*w).and_then(Value::as_array))
}

/// Apply aliases without overwriting a canonical field that is already set
fn apply_aliases(raw: &Map<String, Value>, aliases: &[(&str, &str)]) -> FieldMap {
    let mut fields: FieldMap = raw.clone();
    for (alias, canonical) in aliases {
        if fields.get(*canonical).is_some_and(|v| !v.is_null()) {
            continue;
        }
        if let Some(v) = raw.get(*alias).filter(|v| !v.is_null()) {
            fields.insert(canonical.to_string(), v.clone());
        }
    }
    fields
}

/// Keep only the profile fields, and only when their JSON type fits
///
/// One malformed vendor field must not discard the rest of the profile.
fn retain_shaped(fields: FieldMap, shapes: &[(&str, Shape)]) -> FieldMap {
    fields
        .into_iter()
        .filter(|(name, value)| {
            shapes.iter().any(|(field, shape)| {
                *field == name.as_str()
                    && match shape {
                        Shape::Text => value.is_string(),
                        Shape::List => value.is_array(),
                        Shape::Object => value.is_object(),
                        Shape::Flag => value.is_boolean(),
                    }
            })
        })
        .collect()
}

fn normalize_company(raw: &Map<String, Value>) -> FieldMap {
    let mut fields = apply_aliases(raw, COMPANY_ALIASES);
    // Some vendors report headcount as a number
    if let Some(Value::Number(n)) = fields.get("size") {
        let size = n.to_string();
        fields.insert("size".to_string(), Value::String(size));
    }
    // ... or a comma-separated stack
    if let Some(Value::String(s)) = fields.get("tech_stack") {
        let items: Vec<Value> = s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| Value::String(t.to_string()))
            .collect();
        fields.insert("tech_stack".to_string(), Value::Array(items));
    }
    retain_shaped(fields, COMPANY_FIELDS)
}

fn normalize_contact(raw: &Map<String, Value>) -> FieldMap {
    let mut fields = apply_aliases(raw, CONTACT_ALIASES);
    if !fields.contains_key("full_name") {
        let first = raw.get("first_name").and_then(Value::as_str).unwrap_or("");
        let last = raw.get("last_name").and_then(Value::as_str).unwrap_or("");
        let full = format!("{} {}", first.trim(), last.trim()).trim().to_string();
        if !full.is_empty() {
            fields.insert("full_name".to_string(), Value::String(full));
        }
    }
    // Seniority is inferred from the title; vendors disagree on labels
    retain_shaped(fields, CONTACT_FIELDS)
}

/// Researchers and finders for every configured provider
pub type ProviderSet = (Vec<Arc<dyn CompanyResearcher>>, Vec<Arc<dyn ContactFinder>>);

pub fn providers_from_config(configs: &[ProviderConfig]) -> Result<ProviderSet, EngineError> {
    let mut researchers: Vec<Arc<dyn CompanyResearcher>> = Vec::new();
    let mut finders: Vec<Arc<dyn ContactFinder>> = Vec::new();
    for config in configs {
        let provider = Arc::new(HttpProvider::from_config(config.clone())?);
        match config.kind {
            ProviderKind::Company => researchers.push(provider),
            ProviderKind::Contacts => finders.push(provider),
        }
    }
    Ok((researchers, finders))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_company_aliases() {
        let raw = json!({
            "company_name": "Acme",
            "employees": 120,
            "technologies": "React, Rust ,",
            "name": null
        });
        let fields = normalize_company(raw.as_object().unwrap());
        let profile = CompanyProfile::from_fields(&fields);
        assert_eq!(profile.name.as_deref(), Some("Acme"));
        assert_eq!(profile.size.as_deref(), Some("120"));
        assert_eq!(profile.tech_stack, vec!["React", "Rust"]);
    }

    #[test]
    fn test_canonical_field_wins_over_alias() {
        let raw = json!({"name": "Acme Inc", "company_name": "ACME"});
        let fields = normalize_company(raw.as_object().unwrap());
        assert_eq!(fields["name"], json!("Acme Inc"));
    }

    #[test]
    fn test_malformed_field_is_dropped_alone() {
        let raw = json!({"name": "Acme", "funding": "Series B", "industry": "Media"});
        let profile = CompanyProfile::from_fields(&normalize_company(raw.as_object().unwrap()));
        assert_eq!(profile.name.as_deref(), Some("Acme"));
        assert_eq!(profile.industry.as_deref(), Some("Media"));
        assert!(profile.funding.is_none());
    }

    #[test]
    fn test_contact_aliases() {
        let raw = json!({
            "first_name": "Jane",
            "last_name": "Doe",
            "job_title": "CTO",
            "seniority": "junior",
            "email": "jane@acme.com"
        });
        let contact = ContactProfile::from_fields(&normalize_contact(raw.as_object().unwrap()));
        assert_eq!(contact.full_name, "Jane Doe");
        assert_eq!(contact.title.as_deref(), Some("CTO"));
        assert!(contact.seniority.is_none());
    }

    #[test]
    fn test_missing_key_env_is_an_error() {
        let config = ProviderConfig {
            name: "people".to_string(),
            kind: ProviderKind::Contacts,
            base_url: "http://localhost".to_string(),
            api_key_env: Some("SCOUT_TEST_UNSET_PROVIDER_KEY".to_string()),
            confidence: 0.7,
            cost_per_request: 0.0,
        };
        assert!(matches!(
            HttpProvider::from_config(config),
            Err(EngineError::MissingApiKey(_))
        ));
    }
}
