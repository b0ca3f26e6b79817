//! `score_opportunity`
//!
//! Scores are derived: they are computed from the fused records on demand and
//! never written back as evidence.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use sdk::capability::{Capability, CapabilityContext, CapabilityError};
use sdk::entity::ContactProfile;
use sdk::evidence::normalize_domain;
use sdk::record::FusedRecord;
use sdk::schema::{FieldKind, InputSchema};
use sdk::types::{CapabilityInput, CapabilityOutput};

use crate::fusion::{rank_contacts, ScoredContact, ScoringPolicy, Targeting};

/// Company fit plus ranked contacts for one domain
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OpportunityScore {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_score: Option<u8>,
    pub company_reasons: Vec<String>,
    /// Deduplicated contacts, best first
    pub contacts: Vec<ScoredContact>,
    /// Mean of the company score and the best contact score, whichever exist
    pub opportunity_score: u8,
}

/// Turns fused records into scores
pub trait OpportunityScorer: Send + Sync {
    /// Roles the run is targeting by default
    fn target_roles(&self) -> &[String];

    /// Score a company and its contacts; `extra_roles` extends the targeted roles
    fn score(
        &self,
        company: Option<&FusedRecord>,
        contacts: &[ContactProfile],
        extra_roles: &[String],
    ) -> OpportunityScore;
}

/// Scorer backed by the configured rule tables
#[derive(Debug, Clone, Default)]
pub struct PolicyScorer {
    policy: ScoringPolicy,
    targeting: Targeting,
}

impl PolicyScorer {
    pub fn new(policy: ScoringPolicy, targeting: Targeting) -> Self {
        Self { policy, targeting }
    }

    fn targeting_with(&self, extra_roles: &[String]) -> Targeting {
        let mut targeting = self.targeting.clone();
        for role in extra_roles {
            let exists = targeting
                .roles
                .iter()
                .any(|r| r.eq_ignore_ascii_case(role.trim()));
            if !exists && !role.trim().is_empty() {
                targeting.roles.push(role.trim().to_string());
            }
        }
        targeting
    }
}

impl OpportunityScorer for PolicyScorer {
    fn target_roles(&self) -> &[String] {
        &self.targeting.roles
    }

    fn score(
        &self,
        company: Option<&FusedRecord>,
        contacts: &[ContactProfile],
        extra_roles: &[String],
    ) -> OpportunityScore {
        let targeting = self.targeting_with(extra_roles);

        let (company_score, company_reasons) = match company.filter(|c| !c.is_empty()) {
            Some(record) => {
                let fields = record.to_field_map();
                (
                    Some(self.policy.score_company(&fields, &targeting)),
                    self.policy.explain_company(&fields, &targeting),
                )
            }
            None => (None, Vec::new()),
        };

        let contacts = rank_contacts(contacts, &self.policy, &targeting);
        let best_contact = contacts.first().map(|c| c.score);

        let opportunity_score = match (company_score, best_contact) {
            (Some(a), Some(b)) => ((u16::from(a) + u16::from(b) + 1) / 2) as u8,
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => 0,
        };

        OpportunityScore {
            company_score,
            company_reasons,
            contacts,
            opportunity_score,
        }
    }
}

pub struct ScoreCapability {
    scorer: Arc<dyn OpportunityScorer>,
}

impl ScoreCapability {
    pub fn new(scorer: Arc<dyn OpportunityScorer>) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl Capability for ScoreCapability {
    fn name(&self) -> &str {
        "score_opportunity"
    }

    fn description(&self) -> &str {
        "Score the company's fit and rank its known contacts by authority, using what \
         has been researched so far in this run."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .required("domain", FieldKind::String, "Company web domain")
            .optional("roles", FieldKind::StringList, "Additional roles to favour")
    }

    async fn invoke(
        &self,
        input: CapabilityInput,
        ctx: &CapabilityContext,
    ) -> Result<CapabilityOutput, CapabilityError> {
        let domain = normalize_domain(&input.param_str("domain")?);
        let company = ctx.company(&domain);
        let contacts: Vec<ContactProfile> =
            ctx.contacts_of(&domain).into_iter().map(|r| r.contact()).collect();

        if company.map(FusedRecord::is_empty).unwrap_or(true) && contacts.is_empty() {
            return Err(CapabilityError::Failed(format!(
                "nothing is known about {} yet; research it or find contacts first",
                domain
            )));
        }

        let score = self
            .scorer
            .score(company, &contacts, &input.param_str_list("roles"));

        let mut summary = format!("Opportunity score for {}: {}/100.", domain, score.opportunity_score);
        if let Some(company_score) = score.company_score {
            summary.push_str(&format!(" Company fit {}/100", company_score));
            if !score.company_reasons.is_empty() {
                summary.push_str(&format!(" ({})", score.company_reasons.join(", ")));
            }
            summary.push('.');
        }
        for c in score.contacts.iter().take(3) {
            summary.push_str(&format!(" {}: {}.", c.contact.full_name, c.score));
        }

        let artifact = json!({
            "domain": domain,
            "company_score": score.company_score,
            "opportunity_score": score.opportunity_score,
            "contacts": score.contacts,
        });
        Ok(CapabilityOutput::summary(summary).with_artifact(artifact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::evidence::{EntityKey, Evidence};
    use std::collections::BTreeMap;

    fn record(key: EntityKey, fields: serde_json::Value) -> FusedRecord {
        let Some(map) = fields.as_object().cloned() else {
            panic!("object");
        };
        crate::fusion::fuse(&key, &[Evidence::new(key.clone(), "test", 0.8, map)])
    }

    fn context() -> CapabilityContext {
        let mut records = BTreeMap::new();
        let company = record(
            EntityKey::company("acme.com"),
            json!({"domain": "acme.com", "industry": "Software", "size": "51-200"}),
        );
        let contact = record(
            EntityKey::contact(Some("jane@acme.com"), "Jane Doe"),
            json!({
                "full_name": "Jane Doe",
                "title": "VP Sales",
                "email": "jane@acme.com",
                "company_domain": "acme.com"
            }),
        );
        records.insert(company.key.clone(), company);
        records.insert(contact.key.clone(), contact);
        CapabilityContext::new("run", records)
    }

    fn scorer() -> PolicyScorer {
        PolicyScorer::new(
            ScoringPolicy::default(),
            Targeting {
                industries: vec!["software".to_string()],
                sizes: vec!["51-200".to_string()],
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_extra_roles_extend_targeting() {
        let scorer = scorer();
        let mut contact = ContactProfile::new("Jane Doe");
        contact.title = Some("VP Sales".to_string());

        let plain = scorer.score(None, std::slice::from_ref(&contact), &[]);
        let targeted = scorer.score(None, &[contact], &["vp sales".to_string()]);
        assert!(targeted.contacts[0].score > plain.contacts[0].score);
        assert_eq!(targeted.opportunity_score, targeted.contacts[0].score);
        assert!(scorer.target_roles().is_empty());
    }

    #[tokio::test]
    async fn test_scores_are_artifacts_not_evidence() {
        let capability = ScoreCapability::new(Arc::new(scorer()));
        let out = capability
            .invoke(
                CapabilityInput::new().with_param("domain", json!("acme.com")),
                &context(),
            )
            .await
            .unwrap();

        assert!(out.evidence.is_empty());
        let artifact = out.artifact.unwrap();
        // industry fit 25 + size fit 20 + profiled 5
        assert_eq!(artifact["company_score"], json!(50));
        // vp 30 + email 10
        assert_eq!(artifact["contacts"][0]["score"], json!(40));
        assert_eq!(artifact["opportunity_score"], json!(45));
    }

    #[tokio::test]
    async fn test_unknown_domain_fails() {
        let capability = ScoreCapability::new(Arc::new(scorer()));
        let err = capability
            .invoke(
                CapabilityInput::new().with_param("domain", json!("other.io")),
                &context(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "execution_failed");
    }
}
