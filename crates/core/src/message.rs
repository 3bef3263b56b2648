//! Message domain types.
//!
//! Messages are the value objects that flow through the question graph:
//! the user question enters, the decide step appends an assistant message
//! (possibly carrying a tool call), the retrieve step appends a tool
//! message, and the generate step appends the final answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The agent asking the question
    User,
    /// The language model
    Assistant,
    /// Instructions (rules, prompt, context)
    System,
    /// Tool execution result
    Tool,
}

/// A single message in the graph state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// The first tool call with the given name, if the assistant requested one.
    pub fn tool_call(&self, name: &str) -> Option<&MessageToolCall> {
        self.tool_calls.iter().find(|c| c.name == name)
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("¿Cómo tramitar la insulina?");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "¿Cómo tramitar la insulina?");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn tool_result_links_call_id() {
        let msg = Message::tool_result("call_1", "FRAGMENT: ...");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn tool_call_lookup_by_name() {
        let mut msg = Message::assistant("");
        msg.tool_calls.push(MessageToolCall {
            id: "call_1".into(),
            name: "retrieve".into(),
            arguments: r#"{"query":"insulina"}"#.into(),
        });
        assert!(msg.tool_call("retrieve").is_some());
        assert!(msg.tool_call("calculator").is_none());
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
