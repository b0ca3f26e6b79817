//! Reasoning Engine Abstraction Layer
//!
//! The orchestration loop treats the model as an opaque decision oracle behind
//! the [`ReasoningEngine`] trait. Given the conversation so far and the
//! capabilities on offer, an engine answers with zero or more capability
//! invocations, a finished flag and the tokens it spent doing so.
//!
//! Providers that support native tool calling (OpenAI, Anthropic) return
//! invocations directly. When a model answers in plain text instead,
//! [`parse_invocations`] recovers invocations written as JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use sdk::capability::CapabilityDescriptor;
use sdk::errors::EngineError;
pub use sdk::types::TokenUsage;

use crate::config::{LLMConfig, ProviderPricing};

pub mod anthropic;
pub mod openai;

/// Result type for reasoning engine operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur while talking to a reasoning engine
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,

    pub content: String,

    /// Set on tool result messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Invocations the assistant requested in this message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<Invocation>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_call_id: None,
            invocations: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            invocations: Vec::new(),
        }
    }

    /// Assistant turn that requested capabilities
    pub fn assistant_with_invocations(
        content: impl Into<String>,
        invocations: Vec<Invocation>,
    ) -> Self {
        Self {
            invocations,
            ..Self::assistant(content)
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_call_id: None,
            invocations: Vec::new(),
        }
    }

    /// Result of one invocation, answered back to the engine
    pub fn tool_result(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            invocations: Vec::new(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A capability call requested by the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invocation {
    /// Correlates the call with its result message
    pub id: String,

    /// Capability name
    pub capability: String,

    /// Arguments as sent by the engine; validated by the registry
    pub arguments: Value,
}

impl Invocation {
    pub fn new(id: impl Into<String>, capability: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            capability: capability.into(),
            arguments,
        }
    }

    /// Invocation with a freshly generated id
    pub fn generated(capability: impl Into<String>, arguments: Value) -> Self {
        Self::new(
            format!("call_{}", uuid::Uuid::new_v4().simple()),
            capability,
            arguments,
        )
    }
}

/// One answer from the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReasoningTurn {
    /// Requested invocations, in the order the engine listed them
    pub invocations: Vec<Invocation>,

    /// The engine considers the task done
    pub finished: bool,

    /// Free text that accompanied the turn
    pub content: String,

    pub usage: TokenUsage,
}

impl ReasoningTurn {
    /// A text-only turn that ends the conversation
    pub fn finished(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            invocations: Vec::new(),
            finished: true,
            content: content.into(),
            usage,
        }
    }

    pub fn invoking(invocations: Vec<Invocation>, usage: TokenUsage) -> Self {
        Self {
            invocations,
            finished: false,
            content: String::new(),
            usage,
        }
    }
}

/// Per-thousand-token rates for budget accounting
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl Pricing {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    pub fn cost_of(&self, usage: TokenUsage) -> f64 {
        usage.input_tokens as f64 / 1000.0 * self.input_per_1k
            + usage.output_tokens as f64 / 1000.0 * self.output_per_1k
    }
}

impl From<&ProviderPricing> for Pricing {
    fn from(p: &ProviderPricing) -> Self {
        Self::new(p.input_cost_per_1k, p.output_cost_per_1k)
    }
}

/// Strategy interface every reasoning engine implements
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Provider name (e.g., "openai", "anthropic")
    fn name(&self) -> &str;

    /// Rates used to convert token usage into cost
    fn pricing(&self) -> Pricing {
        Pricing::default()
    }

    /// Ask for the next action(s)
    ///
    /// # Arguments
    /// * `history` - Conversation so far, system prompt first
    /// * `capabilities` - What the engine may invoke this turn; empty means
    ///   plain completion
    async fn converse(
        &self,
        history: &[Message],
        capabilities: &[CapabilityDescriptor],
    ) -> Result<ReasoningTurn>;
}

/// Build the engine selected by `[llm] provider`
///
/// The API key is read from the environment variable the provider section
/// names.
pub fn build_engine(config: &LLMConfig) -> std::result::Result<Arc<dyn ReasoningEngine>, EngineError> {
    match config.provider.as_str() {
        "openai" => {
            let key = read_api_key(&config.openai.api_key_env)?;
            Ok(Arc::new(openai::OpenAIProvider::new(config.openai.clone(), key)))
        }
        "anthropic" => {
            let key = read_api_key(&config.anthropic.api_key_env)?;
            Ok(Arc::new(anthropic::AnthropicProvider::new(
                config.anthropic.clone(),
                key,
            )))
        }
        other => Err(EngineError::Config(format!(
            "unknown llm provider '{}'",
            other
        ))),
    }
}

fn read_api_key(var: &str) -> std::result::Result<String, EngineError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| EngineError::MissingApiKey(var.to_string()))
}

/// Map an unsuccessful HTTP status onto an [`LLMError`]
pub(crate) fn status_error(status: reqwest::StatusCode, body: String) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::AuthenticationFailed(body),
        429 => LLMError::RateLimitExceeded,
        500..=599 => LLMError::ProviderUnavailable(format!("{}: {}", status, body)),
        _ => LLMError::InvalidRequest(body),
    }
}

/// Recover invocations from a plain-text answer.
///
/// Handles several output formats:
/// 1. Raw JSON object `{"capability": "...", "arguments": {...}}` or an array of them
/// 2. Fenced JSON (with or without trailing text): ` ```json\n{...}\n``` `
/// 3. JSON objects embedded in prose; every `{"capability":` occurrence is tried
///
/// `"function"` (and `"name"` when `"arguments"` is present) are accepted in
/// place of `"capability"`.
pub fn parse_invocations(content: &str) -> Vec<Invocation> {
    let trimmed = content.trim();

    if let Some(found) = try_parse_json(trimmed) {
        return found;
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(found) = try_parse_json(inner.trim()) {
            return found;
        }
    }

    let mut found = Vec::new();
    for marker in ["{\"capability\"", "{\"function\""] {
        let mut rest = trimmed;
        while let Some(pos) = rest.find(marker) {
            let candidate = &rest[pos..];
            match extract_balanced_json(candidate) {
                Some(json_str) => {
                    if let Some(inv) = serde_json::from_str::<Value>(json_str)
                        .ok()
                        .and_then(|v| invocation_from_json(&v))
                    {
                        found.push(inv);
                    }
                    rest = &candidate[json_str.len()..];
                }
                None => break,
            }
        }
        if !found.is_empty() {
            break;
        }
    }
    found
}

fn try_parse_json(s: &str) -> Option<Vec<Invocation>> {
    match serde_json::from_str::<Value>(s).ok()? {
        Value::Array(items) => {
            let found: Vec<Invocation> = items.iter().filter_map(invocation_from_json).collect();
            (!found.is_empty()).then_some(found)
        }
        single => invocation_from_json(&single).map(|inv| vec![inv]),
    }
}

fn invocation_from_json(json: &Value) -> Option<Invocation> {
    let name = ["capability", "function"]
        .iter()
        .find_map(|k| json.get(*k).and_then(Value::as_str))
        .or_else(|| {
            // A bare "name" is only a call when arguments come with it
            json.get("arguments")?;
            json.get("name").and_then(Value::as_str)
        })?;
    let arguments = match json.get("arguments") {
        // Some models double-encode arguments
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        }
        Some(other) => other.clone(),
        None => Value::Object(serde_json::Map::new()),
    };
    Some(Invocation::generated(name, arguments))
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
