//! `research_company`
//!
//! Fans a domain out to every configured company researcher and returns one
//! piece of evidence per provider that answered. Providers that fail are
//! reported in the summary; the capability only fails when none answered.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use sdk::capability::{Capability, CapabilityContext, CapabilityError};
use sdk::entity::CompanyProfile;
use sdk::errors::EngineError;
use sdk::evidence::{normalize_domain, EntityKey, Evidence};
use sdk::schema::{FieldKind, InputSchema};
use sdk::types::{CapabilityInput, CapabilityOutput, TokenUsage};

/// What one researcher found about a company
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyFindings {
    pub profile: CompanyProfile,
    /// Provider confidence in [0, 1]
    pub confidence: f64,
    /// Cost charged for the lookup
    pub cost: f64,
}

/// A source of company facts
#[async_trait]
pub trait CompanyResearcher: Send + Sync {
    fn name(&self) -> &str;

    /// Billed per request, answered or not
    fn request_cost(&self) -> f64 {
        0.0
    }

    async fn research(
        &self,
        domain: &str,
        name_hint: Option<&str>,
    ) -> Result<CompanyFindings, EngineError>;
}

pub struct ResearchCapability {
    researchers: Vec<Arc<dyn CompanyResearcher>>,
}

impl ResearchCapability {
    pub fn new(researchers: Vec<Arc<dyn CompanyResearcher>>) -> Self {
        Self { researchers }
    }
}

#[async_trait]
impl Capability for ResearchCapability {
    fn name(&self) -> &str {
        "research_company"
    }

    fn description(&self) -> &str {
        "Research a company by its web domain. Returns firmographics (name, industry, \
         size, funding, headquarters, tech stack, products) from every configured source."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .required("domain", FieldKind::String, "Company web domain, e.g. acme.com")
            .optional("company_name", FieldKind::String, "Known company name, if any")
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
        let name_hint = input.param_str_opt("company_name");

        if self.researchers.is_empty() {
            return Err(CapabilityError::Unavailable(
                "no company research providers configured".to_string(),
            ));
        }

        let lookups = self.researchers.iter().map(|r| {
            let domain = domain.as_str();
            let hint = name_hint.as_deref();
            async move {
                let started = Instant::now();
                let result = r.research(domain, hint).await;
                let elapsed = started.elapsed().as_millis() as u64;
                (r.name().to_string(), result, elapsed, r.request_cost())
            }
        });

        let mut evidence = Vec::new();
        let mut failures = Vec::new();
        let mut failed_cost = 0.0;
        for (provider, result, elapsed, request_cost) in join_all(lookups).await {
            match result {
                Ok(findings) => {
                    let mut profile = findings.profile;
                    profile.domain = domain.clone();
                    debug!("{} answered for {} in {}ms", provider, domain, elapsed);
                    evidence.push(
                        Evidence::new(
                            EntityKey::company(&domain),
                            provider,
                            findings.confidence,
                            profile.to_fields(),
                        )
                        .with_cost(findings.cost)
                        .with_duration_ms(elapsed),
                    );
                }
                Err(e) => {
                    warn!("Company research via {} failed: {}", provider, e);
                    failed_cost += request_cost.max(0.0);
                    failures.push(format!("{} ({})", provider, e));
                }
            }
        }

        if evidence.is_empty() {
            return Err(CapabilityError::Unavailable(format!(
                "every research provider failed: {}",
                failures.join("; ")
            ))
            .with_spend(failed_cost, TokenUsage::default()));
        }

        let merged = crate::fusion::fuse(&EntityKey::company(&domain), &evidence).company();
        let mut summary = format!(
            "Researched {} with {} of {} providers.",
            domain,
            evidence.len(),
            self.researchers.len()
        );
        let facts = describe(&merged);
        if !facts.is_empty() {
            summary.push_str(&format!(" {}.", facts.join("; ")));
        }
        if !failures.is_empty() {
            summary.push_str(&format!(" Failed: {}.", failures.join("; ")));
        }

        Ok(CapabilityOutput::summary(summary)
            .with_evidence(evidence)
            .with_cost(failed_cost))
    }
}

fn describe(profile: &CompanyProfile) -> Vec<String> {
    let mut facts = Vec::new();
    if let Some(name) = &profile.name {
        facts.push(format!("name {}", name));
    }
    if let Some(industry) = &profile.industry {
        facts.push(format!("industry {}", industry));
    }
    if let Some(size) = &profile.size {
        facts.push(format!("size {}", size));
    }
    if let Some(round) = profile.funding.as_ref().and_then(|f| f.last_round.as_ref()) {
        facts.push(format!("last round {}", round));
    }
    if !profile.tech_stack.is_empty() {
        facts.push(format!("stack {}", profile.tech_stack.join(", ")));
    }
    facts
}
