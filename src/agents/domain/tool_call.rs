//! Tool call types for agent interactions

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier echoed back with the result
    pub id: String,
    pub name: String,
    /// Arguments as JSON
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of executing one tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
    pub output: Value,
    pub execution_time_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResult {
    /// Create a successful tool call result
    pub fn success(call: &ToolCall, output: Value, execution_time_ms: u64) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            input: call.arguments.clone(),
            output,
            execution_time_ms,
            success: true,
            error: None,
        }
    }

    /// Create a failed tool call result
    pub fn failure(call: &ToolCall, error: String, execution_time_ms: u64) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            input: call.arguments.clone(),
            output: Value::Null,
            execution_time_ms,
            success: false,
            error: Some(error),
        }
    }

    /// Payload fed back to the model; failures become an inline error object
    pub fn payload(&self) -> Value {
        match &self.error {
            Some(error) => serde_json::json!({ "error": error }),
            None => self.output.clone(),
        }
    }
}

/// Definition of a tool offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema defining the tool's parameters
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}
