//! Conversation history for the orchestration loop
//!
//! Stores messages in order (system prompt, initial instruction, assistant
//! turns, capability results) and trims the oldest exchanges when the estimate
//! passes the context limit. The system prompt and the initial instruction are
//! always kept, and an assistant turn is dropped together with the results
//! that answer it so the provider never sees an orphaned tool result.

use crate::llm::{Message, MessageRole};

/// Rough estimate: 1 token ≈ 4 characters
const CHARS_PER_TOKEN: usize = 4;

/// Messages at the head of the history that are never trimmed
const PINNED: usize = 2;

#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    context_limit: usize,
    token_count: usize,
}

impl Conversation {
    pub fn with_limit(context_limit: usize) -> Self {
        Self {
            messages: Vec::new(),
            context_limit,
            token_count: 0,
        }
    }

    /// Append a message, trimming old exchanges if the limit is passed
    pub fn push(&mut self, message: Message) {
        self.token_count += Self::estimate_tokens(&message);
        self.messages.push(message);

        if self.token_count > self.context_limit {
            self.trim();
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn context_limit(&self) -> usize {
        self.context_limit
    }

    /// Drop whole exchanges after the pinned head, oldest first
    ///
    /// The most recent exchange always survives, even when it alone is over
    /// the limit.
    fn trim(&mut self) {
        while self.token_count > self.context_limit {
            let Some(end) = self.first_exchange_end() else {
                break;
            };
            for removed in self.messages.drain(PINNED..end) {
                self.token_count = self
                    .token_count
                    .saturating_sub(Self::estimate_tokens(&removed));
            }
        }
    }

    /// End (exclusive) of the oldest exchange after the pinned head, if it is
    /// not the last one
    fn first_exchange_end(&self) -> Option<usize> {
        if self.messages.len() <= PINNED {
            return None;
        }
        let mut end = PINNED + 1;
        while end < self.messages.len() && self.messages[end].role == MessageRole::Tool {
            end += 1;
        }
        (end < self.messages.len()).then_some(end)
    }

    fn estimate_tokens(message: &Message) -> usize {
        let invocation_chars: usize = message
            .invocations
            .iter()
            .map(|inv| inv.capability.len() + inv.arguments.to_string().len() + inv.id.len())
            .sum();
        let id_chars = message.tool_call_id.as_ref().map(String::len).unwrap_or(0);

        // Role and structure overhead
        let overhead = 10;

        (message.content.len() + invocation_chars + id_chars).div_ceil(CHARS_PER_TOKEN) + overhead
    }
}
