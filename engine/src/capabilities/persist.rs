//! `persist_opportunity`
//!
//! Saves what the run knows about a company. Stores upsert by domain, so a
//! retried call leaves one row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use sdk::capability::{Capability, CapabilityContext, CapabilityError};
use sdk::entity::ContactProfile;
use sdk::errors::EngineError;
use sdk::evidence::normalize_domain;
use sdk::record::FusedRecord;
use sdk::schema::{FieldKind, InputSchema};
use sdk::types::{CapabilityInput, CapabilityOutput};

use super::scoring::OpportunityScorer;

/// One stored opportunity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpportunityRecord {
    pub domain: String,
    pub company_name: Option<String>,
    pub score: Option<u8>,
    /// Company profile as JSON
    pub company: Value,
    /// Ranked contacts as JSON
    pub contacts: Value,
    /// Latest pitch draft for this domain, if any
    pub pitch: Option<Value>,
    pub run_id: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait OpportunityStore: Send + Sync {
    /// Insert or replace the row for `record.domain`
    async fn upsert(&self, record: &OpportunityRecord) -> Result<(), EngineError>;
}

/// Store that keeps nothing; used when no database is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

#[async_trait]
impl OpportunityStore for NoopStore {
    async fn upsert(&self, record: &OpportunityRecord) -> Result<(), EngineError> {
        info!("Opportunity for {} not stored (no store configured)", record.domain);
        Ok(())
    }
}

pub struct PersistCapability {
    store: Arc<dyn OpportunityStore>,
    scorer: Arc<dyn OpportunityScorer>,
}

impl PersistCapability {
    pub fn new(store: Arc<dyn OpportunityStore>, scorer: Arc<dyn OpportunityScorer>) -> Self {
        Self { store, scorer }
    }
}

#[async_trait]
impl Capability for PersistCapability {
    fn name(&self) -> &str {
        "persist_opportunity"
    }

    fn description(&self) -> &str {
        "Save the researched company, its ranked contacts, score and latest pitch draft. \
         Saving the same domain again replaces the earlier entry."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().required("domain", FieldKind::String, "Company web domain")
    }

    async fn invoke(
        &self,
        input: CapabilityInput,
        ctx: &CapabilityContext,
    ) -> Result<CapabilityOutput, CapabilityError> {
        let domain = normalize_domain(&input.param_str("domain")?);
        let company = ctx.company(&domain).filter(|r| !r.is_empty());
        let contacts: Vec<ContactProfile> =
            ctx.contacts_of(&domain).into_iter().map(|r| r.contact()).collect();

        if company.is_none() && contacts.is_empty() {
            return Err(CapabilityError::Failed(format!(
                "nothing to save for {}; research it first",
                domain
            )));
        }

        let score = self.scorer.score(company, &contacts, &[]);
        let profile = company.map(FusedRecord::company);
        let pitch = ctx
            .artifact("generate_pitch")
            .filter(|p| p.get("domain").and_then(Value::as_str) == Some(domain.as_str()))
            .cloned();

        let record = OpportunityRecord {
            domain: domain.clone(),
            company_name: profile.as_ref().and_then(|p| p.name.clone()),
            score: Some(score.opportunity_score),
            company: json!(profile),
            contacts: json!(score.contacts),
            pitch,
            run_id: ctx.run_id.clone(),
            updated_at: Utc::now(),
        };

        self.store
            .upsert(&record)
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;

        let summary = format!(
            "Saved opportunity {} (score {}, {} contacts{}).",
            domain,
            score.opportunity_score,
            score.contacts.len(),
            if record.pitch.is_some() { ", with pitch" } else { "" }
        );
        Ok(CapabilityOutput::summary(summary).with_artifact(json!({
            "domain": domain,
            "opportunity_score": score.opportunity_score,
            "stored": true,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::PolicyScorer;
    use sdk::evidence::{EntityKey, Evidence};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Memory(Mutex<Vec<OpportunityRecord>>);

    #[async_trait]
    impl OpportunityStore for Memory {
        async fn upsert(&self, record: &OpportunityRecord) -> Result<(), EngineError> {
            let mut rows = self
                .0
                .lock()
                .map_err(|_| EngineError::Database("poisoned".to_string()))?;
            rows.retain(|r| r.domain != record.domain);
            rows.push(record.clone());
            Ok(())
        }
    }

    fn context(pitch_domain: &str) -> CapabilityContext {
        let key = EntityKey::company("acme.com");
        let Some(fields) = json!({"name": "Acme", "industry": "Media"}).as_object().cloned() else {
            panic!("object");
        };
        let record = crate::fusion::fuse(&key, &[Evidence::new(key.clone(), "t", 0.9, fields)]);
        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            "generate_pitch".to_string(),
            json!({"domain": pitch_domain, "subject": "Hi", "body": "Hello"}),
        );
        CapabilityContext::new("run-7", BTreeMap::from([(key, record)])).with_artifacts(artifacts)
    }

    #[tokio::test]
    async fn test_retry_leaves_one_row() {
        let store = Arc::new(Memory::default());
        let capability = PersistCapability::new(
            Arc::clone(&store) as Arc<dyn OpportunityStore>,
            Arc::new(PolicyScorer::default()),
        );
        let input = CapabilityInput::new().with_param("domain", json!("www.acme.com"));

        capability.invoke(input.clone(), &context("acme.com")).await.unwrap();
        capability.invoke(input, &context("acme.com")).await.unwrap();

        let rows = store.0.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].company_name.as_deref(), Some("Acme"));
        assert_eq!(rows[0].run_id, "run-7");
        assert!(rows[0].pitch.is_some());
    }

    #[tokio::test]
    async fn test_pitch_for_other_domain_is_ignored() {
        let store = Arc::new(Memory::default());
        let capability = PersistCapability::new(
            Arc::clone(&store) as Arc<dyn OpportunityStore>,
            Arc::new(PolicyScorer::default()),
        );
        capability
            .invoke(
                CapabilityInput::new().with_param("domain", json!("acme.com")),
                &context("other.io"),
            )
            .await
            .unwrap();
        assert!(store.0.lock().unwrap()[0].pitch.is_none());
    }

    #[tokio::test]
    async fn test_nothing_known_fails() {
        let capability = PersistCapability::new(Arc::new(NoopStore), Arc::new(PolicyScorer::default()));
        let err = capability
            .invoke(
                CapabilityInput::new().with_param("domain", json!("unknown.io")),
                &CapabilityContext::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "execution_failed");
    }
}
