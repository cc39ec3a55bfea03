//! Message domain types.
//!
//! A conversation history is a plain `Vec<Message>` owned by whoever drives the
//! agent (the CLI session, the scheduler). Every message falls into exactly one
//! of three kinds, see [`MessageKind`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
///
/// System instructions travel separately in the provider request and never
/// appear in a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (tool results are also delivered as user turns)
    User,
    /// The AI assistant
    Assistant,
}

/// How a message participates in tool calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Plain text, no tool calls, no result marker.
    Ordinary,
    /// An assistant turn requesting one or more tools.
    Invocation,
    /// The output of a single tool call.
    Result,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID, echoed back in the matching result message
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as an opaque JSON value
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content (may be empty on invocations)
    #[serde(default)]
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    /// Create an assistant message carrying tool calls.
    pub fn invocation(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content.into())
        }
    }

    /// Create a tool result message for the given call.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::User, content.into())
        }
    }

    /// Classify this message. A non-empty `tool_call_id` always wins.
    pub fn kind(&self) -> MessageKind {
        if self.tool_call_id.as_deref().is_some_and(|id| !id.is_empty()) {
            MessageKind::Result
        } else if !self.tool_calls.is_empty() {
            MessageKind::Invocation
        } else {
            MessageKind::Ordinary
        }
    }

    pub fn is_invocation(&self) -> bool {
        self.kind() == MessageKind::Invocation
    }

    pub fn is_result(&self) -> bool {
        self.kind() == MessageKind::Result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
        assert_eq!(msg.kind(), MessageKind::Ordinary);
    }

    #[test]
    fn invocation_and_result_kinds() {
        let call = ToolCall::new("c1", "get_time", json!({}));
        let inv = Message::invocation("", vec![call]);
        assert_eq!(inv.role, Role::Assistant);
        assert!(inv.is_invocation());

        let res = Message::tool_result("c1", r#"{"day":"Sunday"}"#);
        assert_eq!(res.role, Role::User);
        assert!(res.is_result());
    }

    #[test]
    fn result_marker_takes_precedence_over_tool_calls() {
        let mut msg = Message::tool_result("c1", "{}");
        msg.tool_calls.push(ToolCall::new("c2", "get_time", json!({})));
        assert_eq!(msg.kind(), MessageKind::Result);
    }

    #[test]
    fn empty_tool_call_id_is_not_a_result() {
        let mut msg = Message::user("hi");
        msg.tool_call_id = Some(String::new());
        assert_eq!(msg.kind(), MessageKind::Ordinary);
    }

    #[test]
    fn serialization_skips_empty_tool_fields() {
        let json = serde_json::to_value(Message::assistant("done")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());
    }
}
