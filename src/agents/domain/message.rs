//! Transcript and wire message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ToolCall;

/// Author name used for user turns
pub const USER_AUTHOR: &str = "User";

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (instructions to the model)
    System,
    /// User message
    User,
    /// Assistant (agent) message
    Assistant,
    /// Tool result message, only on the wire
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// One conversational turn of a session transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub user_id: String,
    pub role: Role,
    /// Agent name, or "User"
    pub author_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Links the message to the debug log captured while producing it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_log_id: Option<String>,
}

impl Message {
    fn new(role: Role, author_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: String::new(),
            tenant_id: String::new(),
            user_id: String::new(),
            role,
            author_name: author_name.into(),
            text: text.into(),
            timestamp: Utc::now(),
            debug_log_id: None,
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, USER_AUTHOR, text)
    }

    /// Create an assistant message attributed to an agent
    pub fn assistant(author_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, author_name, text)
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, "System", text)
    }

    /// Stamp the session identity onto the message
    pub fn in_session(
        mut self,
        session_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        self.session_id = session_id.into();
        self.tenant_id = tenant_id.into();
        self.user_id = user_id.into();
        self
    }
}

/// A message in completion-service wire format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: Role,
    /// Message content (text)
    pub content: String,
    /// Tool calls made by the assistant (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message is responding to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Create an assistant message with tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            tool_call_id: None,
        }
    }

    /// Create a tool result message
    pub fn tool_result(tool_call_id: impl Into<String>, result: &Value) -> Self {
        Self {
            role: Role::Tool,
            content: serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Requested tool calls, empty when none
    pub fn requested_tools(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self::plain(message.role, message.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_constructors() {
        let user = Message::user("hi").in_session("s1", "t1", "u1");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.author_name, "User");
        assert_eq!(user.session_id, "s1");
        assert!(user.debug_log_id.is_none());

        let reply = Message::assistant("Sales", "hello");
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.author_name, "Sales");
        assert_ne!(user.id, reply.id);
    }

    #[test]
    fn test_tool_result_serializes_payload() {
        let msg = ChatMessage::tool_result("call_1", &json!({"balance": 10}));
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.content, r#"{"balance":10}"#);
    }

    #[test]
    fn test_assistant_with_no_tools_has_none() {
        let msg = ChatMessage::assistant_with_tools("text", Vec::new());
        assert!(msg.tool_calls.is_none());
        assert!(msg.requested_tools().is_empty());
    }
}
