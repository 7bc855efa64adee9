//! Session naming and the post-loop result filter

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

use crate::agents::context::{ContextWindow, ConversationContext};
use crate::agents::domain::{ChatMessage, Message};
use crate::agents::llm::{CompletionRequest, FinishReason, LlmProvider};

pub const SESSION_NAME_PROMPT: &str = "Summarize the text into exactly two words:";

pub const SUMMARY_FILTER_PROMPT: &str = "\
You write the closing reply of a support conversation. Combine what the agents said into one answer \
for the user. Keep every amount, date and reference number exactly as stated. Do not add new facts.";

/// Names sessions from their first prompt
pub struct Summarizer {
    provider: Arc<dyn LlmProvider>,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// At most two words; empty when the call fails
    pub async fn session_name(&self, prompt: &str) -> String {
        let request = CompletionRequest {
            messages: vec![ChatMessage::system(SESSION_NAME_PROMPT), ChatMessage::user(prompt)],
            max_tokens: Some(10),
            ..Default::default()
        };
        match self.provider.complete(request).await {
            Ok(response) if response.finish_reason != FinishReason::ContentFilter => response
                .message
                .content
                .split_whitespace()
                .take(2)
                .collect::<Vec<_>>()
                .join(" "),
            Ok(_) => {
                warn!("Session name request was content filtered");
                String::new()
            }
            Err(e) => {
                error!("Failed to summarize session name: {}", e);
                String::new()
            }
        }
    }
}

/// Rewrites the final reply once the loop is done
#[async_trait]
pub trait ResultFilter: Send + Sync {
    fn name(&self) -> &str;

    /// Replacement text for `last`, given the full transcript
    async fn filter(&self, transcript: &[Message], last: &Message) -> anyhow::Result<String>;
}

/// Asks the model for a single closing answer over the transcript
pub struct SummaryFilter {
    provider: Arc<dyn LlmProvider>,
    context: ConversationContext,
}

impl SummaryFilter {
    pub fn new(provider: Arc<dyn LlmProvider>, context: ConversationContext) -> Self {
        Self { provider, context }
    }
}

#[async_trait]
impl ResultFilter for SummaryFilter {
    fn name(&self) -> &str {
        "summary"
    }

    async fn filter(&self, transcript: &[Message], last: &Message) -> anyhow::Result<String> {
        let rendered = self.context.build(transcript, ContextWindow::Full);
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(SUMMARY_FILTER_PROMPT),
                ChatMessage::user(format!(
                    "Chat history:\n{}\n\nLatest reply from {}:\n{}",
                    rendered, last.author_name, last.text
                )),
            ],
            ..Default::default()
        };
        let response = self.provider.complete(request).await?;
        anyhow::ensure!(
            response.finish_reason != FinishReason::ContentFilter,
            "summary was content filtered"
        );
        let text = response.message.content.trim();
        anyhow::ensure!(!text.is_empty(), "summary was empty");
        Ok(text.to_string())
    }
}
