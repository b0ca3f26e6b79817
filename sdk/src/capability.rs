//! Capability trait and types
//!
//! A capability is a named, schema-validated operation the orchestration loop
//! may invoke on behalf of the reasoning engine. Each capability wraps exactly
//! one external collaborator and adapts its native result into evidence plus a
//! short summary.
//!
//! Capabilities must tolerate being invoked more than once with the same input.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::evidence::{normalize_domain, EntityKey, EntityKind};
use crate::record::FusedRecord;
use crate::schema::{InputSchema, SchemaError};
use crate::types::{CapabilityInput, CapabilityOutput, ParamError, TokenUsage};

/// What the reasoning engine is told about a capability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-Schema of the arguments
    pub parameters: Value,
}

/// Read-only view of the run handed to every invocation
///
/// The snapshot is taken once per turn, before any invocation of that turn is
/// dispatched.
#[derive(Debug, Clone, Default)]
pub struct CapabilityContext {
    pub run_id: String,
    pub records: Arc<BTreeMap<EntityKey, FusedRecord>>,
    /// Latest artifact produced by each capability, keyed by capability name
    pub artifacts: Arc<BTreeMap<String, Value>>,
}

impl CapabilityContext {
    pub fn new(run_id: impl Into<String>, records: BTreeMap<EntityKey, FusedRecord>) -> Self {
        Self {
            run_id: run_id.into(),
            records: Arc::new(records),
            artifacts: Arc::new(BTreeMap::new()),
        }
    }

    pub fn with_artifacts(mut self, artifacts: BTreeMap<String, Value>) -> Self {
        self.artifacts = Arc::new(artifacts);
        self
    }

    pub fn artifact(&self, capability: &str) -> Option<&Value> {
        self.artifacts.get(capability)
    }

    pub fn company(&self, domain: &str) -> Option<&FusedRecord> {
        self.records.get(&EntityKey::company(domain))
    }

    /// Fused contacts whose `company_domain` matches `domain`
    pub fn contacts_of(&self, domain: &str) -> Vec<&FusedRecord> {
        let domain = normalize_domain(domain);
        self.records
            .values()
            .filter(|r| r.key.kind == EntityKind::Contact)
            .filter(|r| {
                r.str_value("company_domain")
                    .map(|d| normalize_domain(&d) == domain)
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn contact(&self, key: &EntityKey) -> Option<&FusedRecord> {
        self.records.get(key)
    }
}

/// Why an invocation failed; always recovered inside the run
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    #[error("unknown capability '{name}'; available: {available}")]
    Unknown { name: String, available: String },

    #[error("invalid input for '{name}': {source}")]
    InvalidInput {
        name: String,
        #[source]
        source: SchemaError,
    },

    #[error("{0}")]
    Param(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("capability failed: {0}")]
    Failed(String),

    #[error("capability timed out after {0}s")]
    Timeout(u64),

    /// A failure that still consumed paid resources
    #[error("{error}")]
    Charged {
        cost: f64,
        usage: TokenUsage,
        error: Box<CapabilityError>,
    },
}

impl CapabilityError {
    /// Stable category used in the structured feedback
    pub fn kind(&self) -> &'static str {
        match self {
            CapabilityError::Unknown { .. } => "unknown_capability",
            CapabilityError::InvalidInput { .. } | CapabilityError::Param(_) => "invalid_input",
            CapabilityError::Unavailable(_) => "unavailable",
            CapabilityError::Failed(_) => "execution_failed",
            CapabilityError::Timeout(_) => "timeout",
            CapabilityError::Charged { error, .. } => error.kind(),
        }
    }

    /// Record what the failed call spent before failing
    pub fn with_spend(self, cost: f64, usage: TokenUsage) -> Self {
        let cost = if cost.is_finite() && cost > 0.0 { cost } else { 0.0 };
        if cost == 0.0 && usage.is_zero() {
            return self;
        }
        match self {
            CapabilityError::Charged {
                cost: before,
                usage: used,
                error,
            } => CapabilityError::Charged {
                cost: before + cost,
                usage: used + usage,
                error,
            },
            other => CapabilityError::Charged {
                cost,
                usage,
                error: Box::new(other),
            },
        }
    }

    /// Cost and tokens consumed despite the failure
    pub fn spent(&self) -> (f64, TokenUsage) {
        match self {
            CapabilityError::Charged { cost, usage, .. } => (*cost, *usage),
            _ => (0.0, TokenUsage::default()),
        }
    }

    /// Validation errors are raised before any handler runs
    pub fn is_validation(&self) -> bool {
        match self {
            CapabilityError::Charged { error, .. } => error.is_validation(),
            other => matches!(
                other,
                CapabilityError::Unknown { .. }
                    | CapabilityError::InvalidInput { .. }
                    | CapabilityError::Param(_)
            ),
        }
    }

    /// Structured error folded back into the conversation
    pub fn to_feedback(&self) -> Value {
        let mut feedback = json!({
            "status": "error",
            "error": self.kind(),
            "message": self.to_string(),
        });
        let (cost, _) = self.spent();
        if cost > 0.0 {
            feedback["cost"] = json!(cost);
        }
        feedback
    }
}

impl From<ParamError> for CapabilityError {
    fn from(e: ParamError) -> Self {
        CapabilityError::Param(e.to_string())
    }
}

/// Capability trait that all registered operations implement
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique name the reasoning engine calls this capability by
    fn name(&self) -> &str;

    /// One-paragraph description for the reasoning engine
    fn description(&self) -> &str;

    /// Declared input schema; validated before `invoke` is called
    fn input_schema(&self) -> InputSchema;

    /// Execute with validated input
    async fn invoke(
        &self,
        input: CapabilityInput,
        ctx: &CapabilityContext,
    ) -> Result<CapabilityOutput, CapabilityError>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.input_schema().to_json_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Attributed, FusedField};

    fn contact_record(email: &str, domain: &str) -> FusedRecord {
        let mut record = FusedRecord::empty(EntityKey::contact(Some(email), ""));
        record.fields.insert(
            "company_domain".to_string(),
            FusedField::Scalar(Attributed {
                value: json!(domain),
                confidence: 0.8,
                provider: "test".to_string(),
            }),
        );
        record
    }

    #[test]
    fn test_contacts_of_matches_normalized_domain() {
        let mut records = BTreeMap::new();
        let a = contact_record("a@acme.com", "www.acme.com");
        let b = contact_record("b@other.io", "other.io");
        records.insert(a.key.clone(), a);
        records.insert(b.key.clone(), b);

        let ctx = CapabilityContext::new("run-1", records);
        let contacts = ctx.contacts_of("ACME.com");
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].key.id, "a@acme.com");
    }

    #[test]
    fn test_error_feedback() {
        let err = CapabilityError::Unknown {
            name: "find_investors".to_string(),
            available: "research_company, terminate".to_string(),
        };
        assert!(err.is_validation());
        let feedback = err.to_feedback();
        assert_eq!(feedback["error"], "unknown_capability");
        assert!(feedback["message"]
            .as_str()
            .unwrap()
            .contains("find_investors"));

        assert!(!CapabilityError::Timeout(30).is_validation());
        assert_eq!(CapabilityError::Timeout(30).kind(), "timeout");
    }

    #[test]
    fn test_charged_failure_keeps_its_category() {
        let err = CapabilityError::Failed("empty draft".to_string())
            .with_spend(1.5, TokenUsage::new(1000, 500))
            .with_spend(0.5, TokenUsage::new(10, 0));

        assert_eq!(err.kind(), "execution_failed");
        assert_eq!(err.to_string(), "capability failed: empty draft");
        assert_eq!(err.spent(), (2.0, TokenUsage::new(1010, 500)));
        assert_eq!(err.to_feedback()["cost"], json!(2.0));

        // Nothing spent leaves the error untouched
        let plain = CapabilityError::Timeout(5).with_spend(f64::NAN, TokenUsage::default());
        assert!(matches!(plain, CapabilityError::Timeout(5)));
        assert_eq!(plain.spent().0, 0.0);
        assert!(plain.to_feedback().get("cost").is_none());
    }
}
