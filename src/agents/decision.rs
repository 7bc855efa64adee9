//! Schema-constrained decision calls
//!
//! A decision call sends `[system prompt, rendered history]` to the
//! completion service with a response schema attached and deserializes the
//! reply. There is no retry here; a call either yields a decision or one of
//! three failure kinds, and the caller owns the fallback policy.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::agents::context::{ContextWindow, ConversationContext};
use crate::agents::domain::{ChatMessage, Decision, Message};
use crate::agents::error::DecisionError;
use crate::agents::llm::{CompletionRequest, FinishReason, LlmProvider};

/// Issues structured decision requests against one provider
#[derive(Clone)]
pub struct DecisionClient {
    provider: Arc<dyn LlmProvider>,
    context: ConversationContext,
    timeout: Duration,
}

impl DecisionClient {
    pub fn new(provider: Arc<dyn LlmProvider>, context: ConversationContext, timeout: Duration) -> Self {
        Self {
            provider,
            context,
            timeout,
        }
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Ask the service for a decision over a window of the history
    pub async fn decide<D: Decision>(
        &self,
        history: &[Message],
        window: ContextWindow,
        system_prompt: &str,
    ) -> Result<D, DecisionError> {
        let rendered = self.context.build(history, window);
        let schema = D::response_schema();
        debug!("Requesting '{}' decision over {} chars of context", schema.name, rendered.chars().count());

        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(format!("Chat history:\n{}", rendered)),
            ],
            response_format: Some(schema),
            ..Default::default()
        };

        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                DecisionError::Transport(format!(
                    "decision call timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;

        if response.finish_reason == FinishReason::ContentFilter {
            return Err(DecisionError::ContentFiltered);
        }

        parse_decision(&response.message.content)
    }
}

/// Deserialize a decision payload, tolerating a surrounding code fence
pub fn parse_decision<D: Decision>(content: &str) -> Result<D, DecisionError> {
    let body = strip_code_fence(content.trim());
    serde_json::from_str(body).map_err(|e| DecisionError::SchemaParse(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag on the opening fence
    let inner = inner.split_once('\n').map_or(inner, |(_, rest)| rest);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::domain::{SelectionDecision, TerminationDecision};
    use crate::agents::llm::{ScriptKind, ScriptedFailure, ScriptedProvider, ScriptedReply};

    fn client(provider: ScriptedProvider, timeout: Duration) -> (Arc<ScriptedProvider>, DecisionClient) {
        let provider = Arc::new(provider);
        let client = DecisionClient::new(provider.clone(), ConversationContext::new(4000), timeout);
        (provider, client)
    }

    #[test]
    fn test_parse_plain_and_fenced() {
        let plain: SelectionDecision =
            parse_decision(r#" {"AgentName":"Sales","Reason":"r"} "#).unwrap();
        assert_eq!(plain.agent_name, "Sales");

        let fenced: TerminationDecision =
            parse_decision("```json\n{\"ShouldContinue\": true, \"Reason\": \"more\"}\n```").unwrap();
        assert!(fenced.should_continue);
    }

    #[test]
    fn test_parse_rejects_schema_mismatch() {
        let result: Result<SelectionDecision, _> = parse_decision(r#"{"Agent":"Sales"}"#);
        assert!(matches!(result, Err(DecisionError::SchemaParse(_))));
        let result: Result<SelectionDecision, _> = parse_decision("Sales, obviously");
        assert!(matches!(result, Err(DecisionError::SchemaParse(_))));
    }

    #[tokio::test]
    async fn test_decide_sends_prompt_and_history() {
        let (provider, client) = client(
            ScriptedProvider::new().select("Sales", "new account"),
            Duration::from_secs(5),
        );
        let history = vec![Message::user("I want to open an account")];
        let decision: SelectionDecision = client
            .decide(&history, ContextWindow::Full, "pick one")
            .await
            .unwrap();
        assert_eq!(decision.agent_name, "Sales");

        let sent = &provider.requests()[0];
        assert_eq!(sent.messages[0].content, "pick one");
        assert_eq!(sent.messages[1].content, "Chat history:\nuser: I want to open an account");
        assert_eq!(
            sent.response_format.as_ref().map(|f| f.name.as_str()),
            Some("agent_selection")
        );
    }

    #[tokio::test]
    async fn test_filtered_completion_is_content_filtered() {
        let (_, client) = client(
            ScriptedProvider::new().fail(ScriptKind::Selection, ScriptedFailure::FilteredCompletion),
            Duration::from_secs(5),
        );
        let result: Result<SelectionDecision, _> =
            client.decide(&[], ContextWindow::Full, "pick").await;
        assert!(matches!(result, Err(DecisionError::ContentFiltered)));
    }

    #[tokio::test]
    async fn test_non_json_reply_is_schema_parse() {
        let (_, client) = client(
            ScriptedProvider::new().push(ScriptKind::Termination, ScriptedReply::Text("yes".into())),
            Duration::from_secs(5),
        );
        let result: Result<TerminationDecision, _> =
            client.decide(&[], ContextWindow::Last(3), "stop?").await;
        assert!(matches!(result, Err(DecisionError::SchemaParse(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transport() {
        let (_, client) = client(
            ScriptedProvider::new().fail(ScriptKind::Selection, ScriptedFailure::Hang),
            Duration::from_secs(2),
        );
        let result: Result<SelectionDecision, _> =
            client.decide(&[], ContextWindow::Full, "pick").await;
        assert!(matches!(result, Err(DecisionError::Transport(msg)) if msg.contains("timed out")));
    }
}
