//! Structured decisions returned by the completion service

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

/// A named JSON schema the completion service must conform to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    pub description: String,
    pub schema: Value,
    /// Ask the service for strict schema adherence
    #[serde(default)]
    pub strict: bool,
}

/// A decision type that carries its own response schema
pub trait Decision: DeserializeOwned + Send {
    fn response_schema() -> ResponseSchema;
}

/// Which agent should speak next, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SelectionDecision {
    pub agent_name: String,
    /// Audit text only, never used for control flow
    pub reason: String,
}

impl Decision for SelectionDecision {
    fn response_schema() -> ResponseSchema {
        ResponseSchema {
            name: "agent_selection".to_string(),
            description: "Select the next agent and provide reasoning".to_string(),
            schema: json!({
                "type": "object",
                "properties": {
                    "AgentName": { "type": "string", "description": "Exact name of the next agent" },
                    "Reason": { "type": "string", "description": "Why this agent was selected" }
                },
                "required": ["AgentName", "Reason"],
                "additionalProperties": false
            }),
            strict: true,
        }
    }
}

/// Whether the conversation should continue
///
/// The loop terminates when `should_continue` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TerminationDecision {
    pub should_continue: bool,
    pub reason: String,
}

impl Decision for TerminationDecision {
    fn response_schema() -> ResponseSchema {
        ResponseSchema {
            name: "termination_decision".to_string(),
            description: "Determine if conversation should continue and provide reasoning"
                .to_string(),
            schema: json!({
                "type": "object",
                "properties": {
                    "ShouldContinue": { "type": "boolean", "description": "True to keep the conversation going" },
                    "Reason": { "type": "string", "description": "Why the conversation should continue or stop" }
                },
                "required": ["ShouldContinue", "Reason"],
                "additionalProperties": false
            }),
            strict: true,
        }
    }
}
