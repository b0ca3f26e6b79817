use super::{
    parse_invocations, status_error, Invocation, LLMError, Message, MessageRole, Pricing,
    ReasoningEngine, ReasoningTurn, TokenUsage,
};
use crate::config::AnthropicConfig;
use async_trait::async_trait;
use sdk::capability::CapabilityDescriptor;
use serde_json::{json, Value};

/// Anthropic Messages API with native tool use
pub struct AnthropicProvider {
    config: AnthropicConfig,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig, api_key: impl Into<String>) -> Self {
        Self {
            config,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Split out the system prompt and convert the rest into content blocks
    ///
    /// Consecutive tool results are grouped into a single user message, which
    /// the API requires after an assistant turn with several `tool_use` blocks.
    fn build_messages(history: &[Message]) -> (String, Vec<Value>) {
        let mut system_prompt = String::new();
        let mut api_messages: Vec<Value> = Vec::new();
        let mut pending_results: Vec<Value> = Vec::new();

        let flush = |pending: &mut Vec<Value>, out: &mut Vec<Value>| {
            if !pending.is_empty() {
                out.push(json!({"role": "user", "content": std::mem::take(pending)}));
            }
        };

        for msg in history {
            match msg.role {
                MessageRole::System => {
                    system_prompt.push_str(&msg.content);
                    system_prompt.push('\n');
                }
                MessageRole::Tool => pending_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content,
                })),
                MessageRole::Assistant => {
                    flush(&mut pending_results, &mut api_messages);
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": msg.content}));
                    }
                    for inv in &msg.invocations {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": inv.id,
                            "name": inv.capability,
                            "input": inv.arguments,
                        }));
                    }
                    if blocks.is_empty() {
                        blocks.push(json!({"type": "text", "text": "(no content)"}));
                    }
                    api_messages.push(json!({"role": "assistant", "content": blocks}));
                }
                MessageRole::User => {
                    flush(&mut pending_results, &mut api_messages);
                    api_messages.push(json!({"role": "user", "content": msg.content}));
                }
            }
        }
        flush(&mut pending_results, &mut api_messages);

        (system_prompt, api_messages)
    }
}

#[async_trait]
impl ReasoningEngine for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn pricing(&self) -> Pricing {
        Pricing::from(&self.config.pricing)
    }

    async fn converse(
        &self,
        history: &[Message],
        capabilities: &[CapabilityDescriptor],
    ) -> super::Result<ReasoningTurn> {
        let url = format!("{}/messages", self.config.base_url.trim_end_matches('/'));
        let (system_prompt, api_messages) = Self::build_messages(history);

        let mut payload = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": system_prompt,
            "messages": api_messages,
        });
        if !capabilities.is_empty() {
            let tools: Vec<Value> = capabilities
                .iter()
                .map(|c| {
                    json!({
                        "name": c.name,
                        "description": c.description,
                        "input_schema": c.parameters,
                    })
                })
                .collect();
            payload["tools"] = Value::Array(tools);
        }

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let content_arr = data
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LLMError::ParseError("No content array in response".to_string()))?;

        let mut full_content = String::new();
        let mut invocations = Vec::new();
        for item in content_arr {
            match item.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = item.get("text").and_then(Value::as_str) {
                        full_content.push_str(text);
                    }
                }
                Some("tool_use") => {
                    let id = item.get("id").and_then(Value::as_str);
                    let name = item.get("name").and_then(Value::as_str);
                    if let (Some(id), Some(name)) = (id, name) {
                        let input = item.get("input").cloned().unwrap_or_else(|| json!({}));
                        invocations.push(Invocation::new(id, name, input));
                    }
                }
                _ => {}
            }
        }

        if invocations.is_empty() && !capabilities.is_empty() {
            invocations = parse_invocations(&full_content);
        }

        let usage = TokenUsage::new(
            data.pointer("/usage/input_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            data.pointer("/usage/output_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        );
        let truncated = data.get("stop_reason").and_then(Value::as_str) == Some("max_tokens");

        Ok(ReasoningTurn {
            finished: invocations.is_empty() && !truncated,
            invocations,
            content: full_content,
            usage,
        })
    }
}
