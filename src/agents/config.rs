//! Configuration types for agents and the orchestration loop

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single agent
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Unique agent name; the selector echoes it verbatim
    pub name: String,
    /// Human-readable description shown to the selector
    pub description: String,
    /// System prompt for the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// File holding the system prompt, relative to the configuration root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions_file: Option<String>,
    /// Tools bound to this agent by name
    #[serde(default)]
    pub tools: Vec<String>,
    /// Tools carrying any of these tags are also visible to the agent
    #[serde(default)]
    pub tool_tags: Vec<String>,
}

/// Statically declared tool table entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool arguments
    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Fixed result returned for every call, for demos
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_response: Option<serde_json::Value>,
}

fn default_parameters() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// LLM provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmProviderConfig {
    /// Provider type
    #[serde(default)]
    pub provider: LlmProviderType,
    /// Model name, or deployment name for Azure
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable containing the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Custom base URL (for self-hosted or proxied endpoints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// API version query parameter (Azure only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Default temperature for completions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Default max tokens for completions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderType::default(),
            model: default_model(),
            api_key_env: None,
            base_url: None,
            api_version: None,
            temperature: None,
            max_tokens: None,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderType {
    /// OpenAI (GPT-4o, GPT-4, etc.)
    #[default]
    OpenAI,
    /// Azure OpenAI
    #[serde(alias = "azure")]
    AzureOpenAI,
}

impl std::fmt::Display for LlmProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProviderType::OpenAI => write!(f, "openai"),
            LlmProviderType::AzureOpenAI => write!(f, "azure"),
        }
    }
}

/// Limits and policies for the orchestration loop
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestrationConfig {
    /// Hard ceiling on agent turns per user turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Agent used whenever selection cannot produce a registered agent
    #[serde(default = "default_agent")]
    pub default_agent: String,
    /// Messages shown to the selector; `None` means the full history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_window: Option<usize>,
    /// Messages shown to the termination check
    #[serde(default = "default_termination_window")]
    pub termination_window: usize,
    /// Rendered context is cut to this many characters
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Redact sensitive-looking data before it reaches a decision prompt
    #[serde(default = "default_true")]
    pub sanitize: bool,
    /// Wall-clock limit for a single selection or termination call
    #[serde(default = "default_decision_timeout")]
    pub decision_timeout_seconds: u64,
    /// Upper bound on tool-call rounds inside one agent turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Selection prompt override; supports `{participants}` and `{default_agent}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_prompt: Option<String>,
    /// Termination prompt override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_prompt: Option<String>,
    /// Summarise the discussion into the final response after the loop stops
    #[serde(default)]
    pub summarize_results: bool,
    /// Retry policy for agent completions
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            default_agent: default_agent(),
            selection_window: None,
            termination_window: default_termination_window(),
            max_context_chars: default_max_context_chars(),
            sanitize: true,
            decision_timeout_seconds: default_decision_timeout(),
            max_tool_rounds: default_max_tool_rounds(),
            selection_prompt: None,
            termination_prompt: None,
            summarize_results: false,
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestrationConfig {
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_seconds)
    }
}

fn default_max_iterations() -> u32 {
    8
}

fn default_agent() -> String {
    "Coordinator".to_string()
}

fn default_termination_window() -> usize {
    3
}

fn default_max_context_chars() -> usize {
    4000
}

fn default_true() -> bool {
    true
}

fn default_decision_timeout() -> u64 {
    30
}

fn default_max_tool_rounds() -> u32 {
    5
}

/// Exponential backoff policy for transient completion failures
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_interval")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_max_interval")]
    pub max_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_interval_ms: default_initial_interval(),
            max_interval_ms: default_max_interval(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_interval() -> u64 {
    500
}

fn default_max_interval() -> u64 {
    4000
}

/// Monitor sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Process-wide event history bound
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Number of events returned in session analytics
    #[serde(default = "default_recent_events")]
    pub recent_events: usize,
    /// Register Prometheus collectors
    #[serde(default = "default_true")]
    pub prometheus: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            recent_events: default_recent_events(),
            prometheus: true,
        }
    }
}

fn default_event_capacity() -> usize {
    1000
}

fn default_recent_events() -> usize {
    10
}
