//! `terminate`
//!
//! The engine calls this to end the run. The loop stops with `Completed` once
//! a `terminate` step succeeds and takes the summary from its artifact.

use async_trait::async_trait;
use serde_json::json;

use sdk::capability::{Capability, CapabilityContext, CapabilityError};
use sdk::schema::{FieldKind, InputSchema};
use sdk::types::{CapabilityInput, CapabilityOutput};

pub struct TerminateCapability;

impl TerminateCapability {
    pub const NAME: &'static str = "terminate";
}

#[async_trait]
impl Capability for TerminateCapability {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Finish the run. Give a short summary of what was found and concrete next steps."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .required("summary", FieldKind::String, "What the run found")
            .optional("recommendations", FieldKind::StringList, "Next steps for the seller")
    }

    async fn invoke(
        &self,
        input: CapabilityInput,
        _ctx: &CapabilityContext,
    ) -> Result<CapabilityOutput, CapabilityError> {
        let summary = input.param_str("summary")?.trim().to_string();
        let recommendations: Vec<String> = input
            .param_str_list("recommendations")
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();

        Ok(CapabilityOutput::summary("Run finished.").with_artifact(json!({
            "summary": summary,
            "recommendations": recommendations,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_artifact_carries_report() {
        let out = TerminateCapability
            .invoke(
                CapabilityInput::new()
                    .with_param("summary", json!(" Acme is a fit. "))
                    .with_param("recommendations", json!(["Email Jane", " ", 3])),
                &CapabilityContext::default(),
            )
            .await
            .unwrap();
        let artifact = out.artifact.clone().unwrap();
        assert_eq!(artifact["summary"], json!("Acme is a fit."));
        assert_eq!(artifact["recommendations"], json!(["Email Jane"]));
        assert_eq!(out.total_cost(), 0.0);
    }
}
