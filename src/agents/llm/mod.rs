//! Completion service contract and providers
//!
//! - OpenAI and Azure OpenAI over HTTP
//! - A scripted in-memory provider for tests and benchmarks

mod openai;
mod scripted;

pub use openai::OpenAiProvider;
pub use scripted::{
    selection_reply, termination_reply, ScriptKind, ScriptedFailure, ScriptedProvider,
    ScriptedReply,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agents::config::LlmProviderConfig;
use crate::agents::domain::{ChatMessage, ResponseSchema, ToolDefinition};
use crate::agents::error::LlmResult;

/// Trait for completion service providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;

    /// Complete a request
    ///
    /// A policy refusal must surface either as `LlmError::ContentFiltered` or
    /// as `FinishReason::ContentFilter`, never as a generic error.
    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse>;
}

/// Request for completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Messages in the conversation, system prompt first
    pub messages: Vec<ChatMessage>,
    /// Model to use (overrides provider default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Tools available for calling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Constrain the reply to a JSON schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseSchema>,
}

/// Tool choice mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Let the model decide
    Auto,
    /// Don't use tools
    None,
    /// Must use a tool
    Required,
}

/// Response from completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated message
    pub message: ChatMessage,
    /// Reason the completion stopped
    pub finish_reason: FinishReason,
    /// Token usage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Reason completion stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop
    Stop,
    /// Hit max tokens
    Length,
    /// Tool call requested
    ToolCalls,
    /// Content filtered
    ContentFilter,
}

impl FinishReason {
    pub(crate) fn from_wire(reason: Option<&str>) -> Self {
        match reason {
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Create a provider from configuration
pub fn create_provider(config: &LlmProviderConfig) -> LlmResult<Arc<dyn LlmProvider>> {
    Ok(Arc::new(OpenAiProvider::new(config)?))
}
