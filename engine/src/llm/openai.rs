use super::{
    parse_invocations, status_error, Invocation, LLMError, Message, MessageRole, Pricing,
    ReasoningEngine, ReasoningTurn, TokenUsage,
};
use crate::config::OpenAIConfig;
use async_trait::async_trait;
use sdk::capability::CapabilityDescriptor;
use serde_json::{json, Value};

/// OpenAI-compatible chat completions with native tool calling
pub struct OpenAIProvider {
    config: OpenAIConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig, api_key: impl Into<String>) -> Self {
        Self {
            config,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn build_messages(history: &[Message]) -> Vec<Value> {
        history
            .iter()
            .map(|msg| match msg.role {
                MessageRole::Assistant if !msg.invocations.is_empty() => {
                    let calls: Vec<Value> = msg
                        .invocations
                        .iter()
                        .map(|inv| {
                            json!({
                                "id": inv.id,
                                "type": "function",
                                "function": {
                                    "name": inv.capability,
                                    "arguments": inv.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    json!({
                        "role": "assistant",
                        "content": if msg.content.is_empty() { Value::Null } else { json!(msg.content) },
                        "tool_calls": calls,
                    })
                }
                MessageRole::Tool => json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content,
                }),
                role => json!({
                    "role": role.to_string(),
                    "content": msg.content,
                }),
            })
            .collect()
    }

    fn build_tools(capabilities: &[CapabilityDescriptor]) -> Vec<Value> {
        capabilities
            .iter()
            .map(|c| {
                json!({
                    "type": "function",
                    "function": {
                        "name": c.name,
                        "description": c.description,
                        "parameters": c.parameters,
                    }
                })
            })
            .collect()
    }
}

#[async_trait]
impl ReasoningEngine for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn pricing(&self) -> Pricing {
        Pricing::from(&self.config.pricing)
    }

    async fn converse(
        &self,
        history: &[Message],
        capabilities: &[CapabilityDescriptor],
    ) -> super::Result<ReasoningTurn> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut payload = json!({
            "model": self.config.model,
            "messages": Self::build_messages(history),
            "max_tokens": self.config.max_tokens,
        });
        if !capabilities.is_empty() {
            payload["tools"] = Value::Array(Self::build_tools(capabilities));
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let usage = TokenUsage::new(
            data.pointer("/usage/prompt_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            data.pointer("/usage/completion_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        );

        let choice = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| LLMError::ParseError("No choices in response".to_string()))?;

        let message = choice
            .get("message")
            .ok_or_else(|| LLMError::ParseError("No message in choice".to_string()))?;

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut invocations: Vec<Invocation> = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| calls.iter().filter_map(parse_tool_call).collect())
            .unwrap_or_default();

        if invocations.is_empty() && !capabilities.is_empty() {
            invocations = parse_invocations(&content);
        }

        // "length" means the model was cut off, not that it is done
        let truncated = choice.get("finish_reason").and_then(Value::as_str) == Some("length");

        Ok(ReasoningTurn {
            finished: invocations.is_empty() && !truncated,
            invocations,
            content,
            usage,
        })
    }
}

fn parse_tool_call(call: &Value) -> Option<Invocation> {
    let id = call.get("id").and_then(Value::as_str)?;
    let name = call.pointer("/function/name").and_then(Value::as_str)?;
    let raw = call
        .pointer("/function/arguments")
        .and_then(Value::as_str)
        .unwrap_or("{}");
    // Unparseable arguments are passed on as a string and rejected by the registry
    let arguments = if raw.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    };
    Some(Invocation::new(id, name, arguments))
}
