//! Conservative "are we done?" check after each agent turn

use tracing::{debug, warn};

use crate::agents::context::ContextWindow;
use crate::agents::decision::DecisionClient;
use crate::agents::domain::{Message, TerminationDecision};

/// Termination prompt used unless configured otherwise
pub const DEFAULT_TERMINATION_PROMPT: &str = "\
Decide whether the support team should keep working on the user's latest request.

Continue when the request has not been fully answered, an agent handed the conversation to another agent, \
or an agent promised a follow-up that has not happened yet.
Stop when the latest agent reply answers the request, asks the user a question, or waits for user input.";

/// Outcome of one termination check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationCheck {
    pub terminate: bool,
    pub reason: String,
    /// The decision call failed and the loop continues by default
    pub failed: bool,
}

/// Asks the model whether the turn is complete
pub struct TerminationStrategy {
    client: DecisionClient,
    window: ContextWindow,
    prompt: String,
}

impl TerminationStrategy {
    pub fn new(client: DecisionClient, window: ContextWindow) -> Self {
        Self {
            client,
            window,
            prompt: DEFAULT_TERMINATION_PROMPT.to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// `terminate` is the negation of the model's `ShouldContinue`
    ///
    /// Any failure answers "continue"; the iteration ceiling bounds the loop.
    pub async fn should_terminate(&self, history: &[Message]) -> TerminationCheck {
        match self
            .client
            .decide::<TerminationDecision>(history, self.window, &self.prompt)
            .await
        {
            Ok(decision) => {
                debug!(
                    should_continue = decision.should_continue,
                    "Termination decision: {}", decision.reason
                );
                TerminationCheck {
                    terminate: !decision.should_continue,
                    reason: decision.reason,
                    failed: false,
                }
            }
            Err(e) => {
                warn!("Termination check failed, continuing: {}", e);
                TerminationCheck {
                    terminate: false,
                    reason: format!("Termination check failed: {}", e),
                    failed: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::context::ConversationContext;
    use crate::agents::llm::{ScriptKind, ScriptedFailure, ScriptedProvider, ScriptedReply};
    use std::sync::Arc;
    use std::time::Duration;

    fn strategy(provider: ScriptedProvider) -> (Arc<ScriptedProvider>, TerminationStrategy) {
        let provider = Arc::new(provider);
        let client = DecisionClient::new(
            provider.clone(),
            ConversationContext::new(4000),
            Duration::from_secs(5),
        );
        (provider, TerminationStrategy::new(client, ContextWindow::Last(3)))
    }

    #[tokio::test]
    async fn test_terminate_inverts_should_continue() {
        let (_, s) = strategy(
            ScriptedProvider::new()
                .keep_going(true, "transfer pending")
                .keep_going(false, "answered"),
        );
        let first = s.should_terminate(&[Message::user("hi")]).await;
        assert!(!first.terminate);
        assert_eq!(first.reason, "transfer pending");
        let second = s.should_terminate(&[Message::user("hi")]).await;
        assert!(second.terminate);
        assert!(!second.failed);
    }

    #[tokio::test]
    async fn test_failures_continue() {
        let (_, s) = strategy(
            ScriptedProvider::new()
                .fail(ScriptKind::Termination, ScriptedFailure::ContentFiltered)
                .push(ScriptKind::Termination, ScriptedReply::Text("done".into()))
                .fail(ScriptKind::Termination, ScriptedFailure::Timeout),
        );
        for _ in 0..3 {
            let check = s.should_terminate(&[]).await;
            assert!(!check.terminate);
            assert!(check.failed);
        }
    }

    #[tokio::test]
    async fn test_only_tail_is_sent() {
        let (provider, s) = strategy(ScriptedProvider::new().keep_going(false, "ok"));
        let history: Vec<Message> = (1..=5).map(|i| Message::user(format!("m{}", i))).collect();
        s.should_terminate(&history).await;
        let sent = &provider.requests()[0].messages[1].content;
        assert_eq!(sent, "Chat history:\nuser: m3\nuser: m4\nuser: m5");
    }
}
