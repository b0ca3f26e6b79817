//! Capability input/output types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::evidence::Evidence;

/// Validated input handed to a capability
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CapabilityInput {
    pub params: Map<String, Value>,
}

impl CapabilityInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Result<String, ParamError> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ParamError::MissingParameter(key.to_string()))
    }

    /// Get an optional, non-blank string parameter
    pub fn param_str_opt(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    }

    pub fn param_u64_opt(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(|v| v.as_u64())
    }

    pub fn param_bool_opt(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(|v| v.as_bool())
    }

    /// Get a list of strings; non-string items are skipped
    pub fn param_str_list(&self, key: &str) -> Vec<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get a parameter as a JSON value
    pub fn param_json(&self, key: &str) -> Result<&Value, ParamError> {
        self.params
            .get(key)
            .ok_or_else(|| ParamError::MissingParameter(key.to_string()))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

/// Tokens consumed by one model call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, other: TokenUsage) -> TokenUsage {
        TokenUsage::new(
            self.input_tokens.saturating_add(other.input_tokens),
            self.output_tokens.saturating_add(other.output_tokens),
        )
    }
}

/// Normalized outcome of a capability
///
/// `cost` is the flat cost of the call itself; per-evidence provider costs are
/// carried on each [`Evidence`] and added by [`total_cost`](Self::total_cost).
/// `usage` holds model tokens the capability spent on its own calls; their
/// price is already part of `cost`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CapabilityOutput {
    pub evidence: Vec<Evidence>,
    /// Short human-readable result the reasoning engine reads back
    pub summary: String,
    pub cost: f64,
    #[serde(default)]
    pub usage: TokenUsage,
    /// Structured result payload (pitch draft, stored opportunity id, final report)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Value>,
}

impl CapabilityOutput {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<Evidence>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = if cost.is_finite() && cost > 0.0 { cost } else { 0.0 };
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_artifact(mut self, artifact: Value) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Flat cost plus every evidence record's provider cost
    pub fn total_cost(&self) -> f64 {
        self.cost + self.evidence.iter().map(|e| e.cost).sum::<f64>()
    }
}

/// Parameter extraction errors
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{EntityKey, FieldMap};
    use serde_json::json;

    #[test]
    fn test_param_str_success() {
        let input = CapabilityInput::new().with_param("domain", json!("acme.com"));
        assert_eq!(input.param_str("domain").unwrap(), "acme.com");
    }

    #[test]
    fn test_param_str_missing() {
        let input = CapabilityInput::new();
        assert!(matches!(
            input.param_str("missing").unwrap_err(),
            ParamError::MissingParameter(_)
        ));
    }

    #[test]
    fn test_param_str_opt_blank_is_none() {
        let input = CapabilityInput::new().with_param("name", json!("   "));
        assert_eq!(input.param_str_opt("name"), None);
    }

    #[test]
    fn test_param_str_list_skips_non_strings() {
        let input = CapabilityInput::new().with_param("roles", json!(["CTO", 7, "VP Sales"]));
        assert_eq!(input.param_str_list("roles"), vec!["CTO", "VP Sales"]);
        assert!(input.param_str_list("missing").is_empty());
    }

    #[test]
    fn test_output_total_cost() {
        let evidence = vec![
            Evidence::new(EntityKey::company("a.com"), "p1", 0.5, FieldMap::new()).with_cost(0.10),
            Evidence::new(EntityKey::company("a.com"), "p2", 0.5, FieldMap::new()).with_cost(0.05),
        ];
        let output = CapabilityOutput::summary("ok")
            .with_evidence(evidence)
            .with_cost(0.01);
        assert!((output.total_cost() - 0.16).abs() < 1e-9);
    }

    #[test]
    fn test_token_usage_adds_up() {
        let total = TokenUsage::new(100, 20) + TokenUsage::new(u64::MAX, 5);
        assert_eq!(total, TokenUsage::new(u64::MAX, 25));
        assert!(TokenUsage::default().is_zero());
        assert_eq!(TokenUsage::new(3, 4).total(), 7);
    }

    #[test]
    fn test_param_error_display() {
        let err = ParamError::MissingParameter("domain".to_string());
        assert_eq!(err.to_string(), "Missing parameter: domain");
    }
}
