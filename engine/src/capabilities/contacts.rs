//! `find_contacts`

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use sdk::capability::{Capability, CapabilityContext, CapabilityError};
use sdk::entity::{ContactProfile, Seniority};
use sdk::errors::EngineError;
use sdk::evidence::{normalize_domain, EntityKey, Evidence};
use sdk::schema::{FieldKind, InputSchema};
use sdk::types::{CapabilityInput, CapabilityOutput, TokenUsage};

use super::scoring::OpportunityScorer;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;

/// Contacts one finder returned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactFindings {
    pub contacts: Vec<ContactProfile>,
    pub confidence: f64,
    /// Cost charged for the whole lookup
    pub cost: f64,
}

/// A source of people working at a company
#[async_trait]
pub trait ContactFinder: Send + Sync {
    fn name(&self) -> &str;

    /// Billed per request, answered or not
    fn request_cost(&self) -> f64 {
        0.0
    }

    async fn find(
        &self,
        domain: &str,
        roles: &[String],
        limit: usize,
    ) -> Result<ContactFindings, EngineError>;
}

pub struct FindContactsCapability {
    finders: Vec<Arc<dyn ContactFinder>>,
    scorer: Arc<dyn OpportunityScorer>,
}

impl FindContactsCapability {
    pub fn new(finders: Vec<Arc<dyn ContactFinder>>, scorer: Arc<dyn OpportunityScorer>) -> Self {
        Self { finders, scorer }
    }
}

/// Attach the employer and infer seniority from the title when missing
fn normalize(mut contact: ContactProfile, domain: &str) -> ContactProfile {
    contact.full_name = contact.full_name.trim().to_string();
    contact.company_domain = Some(domain.to_string());
    if contact.seniority.unwrap_or_default() == Seniority::Unknown {
        let inferred = contact.effective_seniority();
        contact.seniority = (inferred != Seniority::Unknown).then_some(inferred);
    }
    // Providers never set derived scores
    contact.authority_score = None;
    contact
}

#[async_trait]
impl Capability for FindContactsCapability {
    fn name(&self) -> &str {
        "find_contacts"
    }

    fn description(&self) -> &str {
        "Find decision makers at a company. Optionally restrict to roles such as \
         'CTO' or 'VP Sales'. Returns names, titles and contact details."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .required("domain", FieldKind::String, "Company web domain")
            .optional("roles", FieldKind::StringList, "Roles or titles to look for")
            .optional("limit", FieldKind::Integer, "Maximum contacts per provider (default 10)")
    }

    async fn invoke(
        &self,
        input: CapabilityInput,
        _ctx: &CapabilityContext,
    ) -> Result<CapabilityOutput, CapabilityError> {
        let domain = normalize_domain(&input.param_str("domain")?);
        if domain.is_empty() {
            return Err(CapabilityError::Param("domain is empty".to_string()));
        }
        let limit = input
            .param_u64_opt("limit")
            .map(|l| (l as usize).clamp(1, MAX_LIMIT))
            .unwrap_or(DEFAULT_LIMIT);

        let mut roles: Vec<String> = self.scorer.target_roles().to_vec();
        for role in input.param_str_list("roles") {
            if !roles.iter().any(|r| r.eq_ignore_ascii_case(&role)) {
                roles.push(role);
            }
        }

        if self.finders.is_empty() {
            return Err(CapabilityError::Unavailable(
                "no contact providers configured".to_string(),
            ));
        }

        let lookups = self.finders.iter().map(|f| {
            let domain = domain.as_str();
            let roles = roles.as_slice();
            async move {
                let started = Instant::now();
                let result = f.find(domain, roles, limit).await;
                let elapsed = started.elapsed().as_millis() as u64;
                (f.name().to_string(), result, elapsed, f.request_cost())
            }
        });

        let mut evidence = Vec::new();
        let mut found = Vec::new();
        let mut failures = Vec::new();
        let mut answered = 0;
        let mut cost = 0.0;

        for (provider, result, elapsed, request_cost) in join_all(lookups).await {
            match result {
                Ok(findings) => {
                    answered += 1;
                    cost += findings.cost.max(0.0);
                    debug!(
                        "{} returned {} contacts for {}",
                        provider,
                        findings.contacts.len(),
                        domain
                    );
                    for contact in findings.contacts {
                        let contact = normalize(contact, &domain);
                        let key = EntityKey::contact(contact.email.as_deref(), &contact.full_name);
                        if key.id.is_empty() {
                            continue;
                        }
                        evidence.push(
                            Evidence::new(key, provider.clone(), findings.confidence, contact.to_fields())
                                .with_duration_ms(elapsed),
                        );
                        found.push(contact);
                    }
                }
                Err(e) => {
                    warn!("Contact search via {} failed: {}", provider, e);
                    cost += request_cost.max(0.0);
                    failures.push(format!("{} ({})", provider, e));
                }
            }
        }

        if answered == 0 {
            return Err(CapabilityError::Unavailable(format!(
                "every contact provider failed: {}",
                failures.join("; ")
            ))
            .with_spend(cost, TokenUsage::default()));
        }

        let ranked = self.scorer.score(None, &found, &input.param_str_list("roles")).contacts;
        let mut summary = format!(
            "Found {} unique contact{} at {} ({} raw).",
            ranked.len(),
            if ranked.len() == 1 { "" } else { "s" },
            domain,
            found.len()
        );
        for c in ranked.iter().take(5) {
            summary.push_str(&format!(
                " {}{}{} [score {}].",
                c.contact.full_name,
                c.contact
                    .title
                    .as_deref()
                    .map(|t| format!(", {}", t))
                    .unwrap_or_default(),
                c.contact
                    .email
                    .as_deref()
                    .map(|e| format!(" <{}>", e))
                    .unwrap_or_default(),
                c.score
            ));
        }
        if !failures.is_empty() {
            summary.push_str(&format!(" Failed: {}.", failures.join("; ")));
        }

        Ok(CapabilityOutput::summary(summary)
            .with_evidence(evidence)
            .with_cost(cost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::PolicyScorer;
    use crate::fusion::{ScoringPolicy, Targeting};
    use serde_json::json;
    use std::sync::Mutex;

    struct Recording {
        contacts: Vec<ContactProfile>,
        seen_roles: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContactFinder for Recording {
        fn name(&self) -> &str {
            "people"
        }

        async fn find(
            &self,
            _domain: &str,
            roles: &[String],
            _limit: usize,
        ) -> Result<ContactFindings, EngineError> {
            if let Ok(mut seen) = self.seen_roles.lock() {
                *seen = roles.to_vec();
            }
            Ok(ContactFindings {
                contacts: self.contacts.clone(),
                confidence: 0.7,
                cost: 0.05,
            })
        }
    }

    fn contact(name: &str, title: &str, email: Option<&str>) -> ContactProfile {
        ContactProfile {
            full_name: name.to_string(),
            title: Some(title.to_string()),
            email: email.map(String::from),
            authority_score: Some(99),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_contacts_become_keyed_evidence() {
        let finder = Arc::new(Recording {
            contacts: vec![
                contact("Jane Doe", "Chief Technology Officer", Some("Jane@Acme.com")),
                contact("Jane Doe", "CTO", Some("jane@acme.com")),
                contact("Bob Roe", "Engineering Manager", None),
                contact("   ", "Ghost", None),
            ],
            seen_roles: Mutex::new(Vec::new()),
        });
        let scorer = Arc::new(PolicyScorer::new(
            ScoringPolicy::default(),
            Targeting {
                roles: vec!["CTO".to_string()],
                ..Default::default()
            },
        ));
        let capability =
            FindContactsCapability::new(vec![Arc::clone(&finder) as Arc<dyn ContactFinder>], scorer);

        let out = capability
            .invoke(
                CapabilityInput::new()
                    .with_param("domain", json!("acme.com"))
                    .with_param("roles", json!(["cto", "VP Sales"])),
                &CapabilityContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(out.evidence.len(), 3);
        assert_eq!(out.evidence[0].entity.id, "jane@acme.com");
        assert_eq!(out.evidence[2].entity.id, "bob roe");
        assert_eq!(out.evidence[0].fields["company_domain"], json!("acme.com"));
        assert_eq!(out.evidence[0].fields["seniority"], json!("c_level"));
        assert!(!out.evidence[0].fields.contains_key("authority_score"));
        assert!((out.total_cost() - 0.05).abs() < 1e-9);
        assert!(out.summary.starts_with("Found 2 unique contacts at acme.com (3 raw)."));

        let roles = finder.seen_roles.lock().unwrap().clone();
        assert_eq!(roles, vec!["CTO".to_string(), "VP Sales".to_string()]);
    }
}
