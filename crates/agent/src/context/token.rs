//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, rounded up.
//! It never calls a tokenizer or the network because it runs on every trim
//! decision, every round, for every message and every tool schema.
//!
//! The free functions use [`EstimationConfig::DEFAULT`]; a [`TokenEstimator`]
//! carries configured constants.

use openloop_config::EstimationConfig;
use openloop_core::message::Message;
use openloop_core::provider::ToolDefinition;

/// Estimates token counts with a fixed set of constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimator {
    config: EstimationConfig,
}

impl TokenEstimator {
    pub const DEFAULT: Self = Self::new(EstimationConfig::DEFAULT);

    pub const fn new(config: EstimationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimationConfig {
        &self.config
    }

    /// Estimate the token count for a string. Empty text is zero.
    pub fn tokens(&self, text: &str) -> usize {
        text.len().div_ceil(self.config.chars_per_token.max(1))
    }

    /// Tokens of a JSON value's compact serialization; unserializable values cost nothing.
    fn json_tokens<T: serde::Serialize + ?Sized>(&self, value: &T) -> usize {
        serde_json::to_string(value)
            .map(|json| self.tokens(&json))
            .unwrap_or(0)
    }

    /// Estimate tokens for a single message including framing.
    pub fn message(&self, message: &Message) -> usize {
        let mut total = self.config.message_overhead + self.tokens(&message.content);

        for call in &message.tool_calls {
            total += self.tokens(&call.name)
                + self.json_tokens(&call.arguments)
                + self.config.tool_call_overhead;
        }

        if let Some(id) = message.tool_call_id.as_deref() {
            total += self.tokens(id) + self.config.tool_result_overhead;
        }

        total
    }

    /// Estimate tokens for a slice of messages.
    pub fn messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.message(m)).sum()
    }

    /// Estimate tokens for one tool definition.
    pub fn tool(&self, tool: &ToolDefinition) -> usize {
        self.tokens(&tool.name)
            + self.tokens(&tool.description)
            + self.json_tokens(&tool.parameters)
            + self.config.tool_definition_overhead
    }

    /// Estimate tokens for a tool catalog.
    pub fn tools(&self, tools: &[ToolDefinition]) -> usize {
        tools.iter().map(|t| self.tool(t)).sum()
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    TokenEstimator::DEFAULT.tokens(text)
}

/// Estimate tokens for a single message including per-message overhead.
pub fn estimate_message_tokens(message: &Message) -> usize {
    TokenEstimator::DEFAULT.message(message)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    TokenEstimator::DEFAULT.messages(messages)
}

/// Estimate tokens for a tool definition.
pub fn estimate_tool_tokens(tool: &ToolDefinition) -> usize {
    TokenEstimator::DEFAULT.tool(tool)
}

/// Estimate tokens for a slice of tool definitions.
pub fn estimate_tools_tokens(tools: &[ToolDefinition]) -> usize {
    TokenEstimator::DEFAULT.tools(tools)
}
