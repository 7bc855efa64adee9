//! Next-speaker selection with deterministic fallbacks

use std::sync::Arc;

use tracing::{debug, warn};

use crate::agents::context::ContextWindow;
use crate::agents::decision::DecisionClient;
use crate::agents::domain::{Agent, Message, SelectionDecision};
use crate::agents::error::{DecisionError, DispatchError, DispatchResult};
use crate::agents::registry::AgentRegistry;

/// Selector prompt; `{participants}` and `{default_agent}` are substituted
pub const DEFAULT_SELECTION_PROMPT: &str = "\
You decide which participant of a support team responds next in the conversation.

Participants:
{participants}

Rules:
- Reply with the participant name exactly as written above.
- Pick the specialist whose description best matches the user's latest request.
- Pick {default_agent} when the request is unclear, spans several areas, or no specialist fits.
- Explain the choice briefly in the reason.";

/// Keyword routes tried in order when the selector call is content filtered
const KEYWORD_ROUTES: &[(&[&str], &str)] = &[
    (&["transaction", "transfer", "payment", "balance"], "Transactions"),
    (&["account", "open", "register", "offer", "product"], "Sales"),
    (&["complaint", "problem", "issue", "support"], "CustomerSupport"),
];

/// How a selection was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    /// The model named a registered agent
    Ai,
    /// The model named an unregistered agent; the default was used
    UnknownAgent,
    /// The call was content filtered; keyword routing was used
    KeywordFallback,
    /// The call failed; the default was used
    ErrorFallback,
}

impl SelectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionSource::Ai => "ai",
            SelectionSource::UnknownAgent => "unknown_agent",
            SelectionSource::KeywordFallback => "keyword_fallback",
            SelectionSource::ErrorFallback => "error_fallback",
        }
    }

    pub fn is_fallback(&self) -> bool {
        *self != SelectionSource::Ai
    }
}

/// Outcome of one selection step
#[derive(Debug, Clone)]
pub struct Selection {
    pub agent: Arc<Agent>,
    pub reason: String,
    pub source: SelectionSource,
}

/// Chooses which agent acts next
pub struct SelectionStrategy {
    client: DecisionClient,
    registry: Arc<AgentRegistry>,
    default_agent: Arc<Agent>,
    window: ContextWindow,
    prompt: String,
}

impl SelectionStrategy {
    /// The default agent must be registered
    pub fn new(
        client: DecisionClient,
        registry: Arc<AgentRegistry>,
        default_agent: &str,
        window: ContextWindow,
    ) -> DispatchResult<Self> {
        let default_agent = registry.get_agent(default_agent).map_err(|_| {
            DispatchError::Configuration(format!(
                "default agent '{}' is not registered",
                default_agent
            ))
        })?;
        let prompt = render_prompt(DEFAULT_SELECTION_PROMPT, &registry, &default_agent.name);
        Ok(Self {
            client,
            registry,
            default_agent,
            window,
            prompt,
        })
    }

    /// Replace the prompt template
    pub fn with_prompt(mut self, template: &str) -> Self {
        self.prompt = render_prompt(template, &self.registry, &self.default_agent.name);
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn default_agent(&self) -> &Arc<Agent> {
        &self.default_agent
    }

    /// Pick the next speaker; never fails
    pub async fn select_next(&self, history: &[Message]) -> Selection {
        match self
            .client
            .decide::<SelectionDecision>(history, self.window, &self.prompt)
            .await
        {
            Ok(decision) => match self.registry.resolve_selection(&decision.agent_name) {
                Ok(agent) => {
                    debug!(agent = %agent.name, "Selected next agent: {}", decision.reason);
                    Selection {
                        agent,
                        reason: decision.reason,
                        source: SelectionSource::Ai,
                    }
                }
                Err(_) => {
                    warn!(
                        selected = %decision.agent_name,
                        fallback = %self.default_agent.name,
                        "Selector returned unknown agent '{}', using default",
                        decision.agent_name
                    );
                    Selection {
                        agent: self.default_agent.clone(),
                        reason: format!(
                            "Unknown agent '{}' selected ({}); defaulted to {}",
                            decision.agent_name, decision.reason, self.default_agent.name
                        ),
                        source: SelectionSource::UnknownAgent,
                    }
                }
            },
            Err(DecisionError::ContentFiltered) => {
                let raw = self.client.context().build_raw(history, self.window);
                let agent = self.keyword_route(&raw);
                warn!(agent = %agent.name, "Selection was content filtered, routed by keyword");
                Selection {
                    reason: format!("Content filter fallback: routed to {} by keyword", agent.name),
                    agent,
                    source: SelectionSource::KeywordFallback,
                }
            }
            Err(e) => {
                warn!(fallback = %self.default_agent.name, "Selection failed: {}", e);
                Selection {
                    agent: self.default_agent.clone(),
                    reason: e.to_string(),
                    source: SelectionSource::ErrorFallback,
                }
            }
        }
    }

    /// Route by the first keyword group found in `raw`
    ///
    /// A route whose agent is not registered falls through to the default.
    pub fn keyword_route(&self, raw: &str) -> Arc<Agent> {
        let text = raw.to_lowercase();
        KEYWORD_ROUTES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
            .and_then(|(_, name)| self.registry.get_agent(name).ok())
            .unwrap_or_else(|| self.default_agent.clone())
    }
}

fn render_prompt(template: &str, registry: &AgentRegistry, default_agent: &str) -> String {
    template
        .replace("{participants}", &registry.participants())
        .replace("{default_agent}", default_agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::context::{ConversationContext, TRUNCATION_MARKER};
    use crate::agents::llm::{ScriptKind, ScriptedFailure, ScriptedProvider, ScriptedReply};
    use std::time::Duration;

    fn banking_registry() -> Arc<AgentRegistry> {
        Arc::new(
            AgentRegistry::new(vec![
                Agent::new("Coordinator", "Routes requests", "route"),
                Agent::new("Sales", "Accounts and offers", "sell"),
                Agent::new("Transactions", "Transfers and balances", "move money"),
                Agent::new("CustomerSupport", "Complaints and service requests", "help"),
            ])
            .unwrap(),
        )
    }

    fn strategy(provider: ScriptedProvider) -> SelectionStrategy {
        let client = DecisionClient::new(
            Arc::new(provider),
            ConversationContext::new(4000).with_sanitizer(true),
            Duration::from_secs(5),
        );
        SelectionStrategy::new(client, banking_registry(), "Coordinator", ContextWindow::Full).unwrap()
    }

    #[test]
    fn test_default_agent_must_be_registered() {
        let client = DecisionClient::new(
            Arc::new(ScriptedProvider::new()),
            ConversationContext::new(100),
            Duration::from_secs(1),
        );
        let result = SelectionStrategy::new(client, banking_registry(), "Manager", ContextWindow::Full);
        assert!(matches!(result, Err(DispatchError::Configuration(_))));
    }

    #[test]
    fn test_prompt_lists_participants() {
        let s = strategy(ScriptedProvider::new());
        assert!(s.prompt().contains("- Transactions: Transfers and balances"));
        assert!(s.prompt().contains("Pick Coordinator when"));

        let s = s.with_prompt("Team:\n{participants}\nFallback: {default_agent}");
        assert!(s.prompt().ends_with("Fallback: Coordinator"));
    }

    #[tokio::test]
    async fn test_registered_answer_is_used() {
        let s = strategy(ScriptedProvider::new().select("sales", "wants an offer"));
        let selection = s.select_next(&[Message::user("any offers?")]).await;
        assert_eq!(selection.agent.name, "Sales");
        assert_eq!(selection.source, SelectionSource::Ai);
        assert_eq!(selection.reason, "wants an offer");
    }

    #[tokio::test]
    async fn test_unknown_agent_uses_default() {
        let s = strategy(ScriptedProvider::new().select("NotARealAgent", "guess"));
        let selection = s.select_next(&[Message::user("hi")]).await;
        assert_eq!(selection.agent.name, "Coordinator");
        assert_eq!(selection.source, SelectionSource::UnknownAgent);
        assert!(selection.reason.contains("NotARealAgent"));
    }

    #[tokio::test]
    async fn test_content_filter_routes_by_raw_keywords() {
        let s = strategy(
            ScriptedProvider::new().fail(ScriptKind::Selection, ScriptedFailure::ContentFiltered),
        );
        // The sanitizer would rewrite "fraud"; routing must still see the raw text
        let selection = s
            .select_next(&[Message::user("I want to transfer $500 after the fraud")])
            .await;
        assert_eq!(selection.agent.name, "Transactions");
        assert_eq!(selection.source, SelectionSource::KeywordFallback);
    }

    #[tokio::test]
    async fn test_long_history_keeps_newest_prompt_visible() {
        let provider = Arc::new(ScriptedProvider::new().select("Transactions", "wants a transfer"));
        let client = DecisionClient::new(
            provider.clone(),
            ConversationContext::new(4000),
            Duration::from_secs(5),
        );
        let s = SelectionStrategy::new(client, banking_registry(), "Coordinator", ContextWindow::Full).unwrap();

        let mut history: Vec<Message> = (0..20)
            .map(|i| Message::user(format!("older question {} {}", i, "x".repeat(250))))
            .collect();
        history.push(Message::user("I want to transfer $500 today"));

        let selection = s.select_next(&history).await;
        assert_eq!(selection.agent.name, "Transactions");

        let requests = provider.requests_of(ScriptKind::Selection);
        let context = &requests[0].messages[1].content;
        assert!(context.ends_with("user: I want to transfer $500 today"));
        assert!(context.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn test_keyword_route_order_and_default() {
        let s = strategy(ScriptedProvider::new());
        assert_eq!(s.keyword_route("user: open an account").name, "Sales");
        assert_eq!(s.keyword_route("user: I have a complaint").name, "CustomerSupport");
        assert_eq!(s.keyword_route("user: payment for my account").name, "Transactions");
        assert_eq!(s.keyword_route("user: hello there").name, "Coordinator");
    }

    #[test]
    fn test_keyword_route_skips_unregistered_agent() {
        let registry = Arc::new(
            AgentRegistry::new(vec![Agent::new("Coordinator", "Routes", "route")]).unwrap(),
        );
        let client = DecisionClient::new(
            Arc::new(ScriptedProvider::new()),
            ConversationContext::new(100),
            Duration::from_secs(1),
        );
        let s = SelectionStrategy::new(client, registry, "Coordinator", ContextWindow::Full).unwrap();
        assert_eq!(s.keyword_route("transfer money").name, "Coordinator");
    }

    #[tokio::test]
    async fn test_other_errors_use_default_with_message() {
        let s = strategy(
            ScriptedProvider::new()
                .push(ScriptKind::Selection, ScriptedReply::Text("Sales".into()))
                .fail(ScriptKind::Selection, ScriptedFailure::Network),
        );
        let parse_failure = s.select_next(&[]).await;
        assert_eq!(parse_failure.agent.name, "Coordinator");
        assert_eq!(parse_failure.source, SelectionSource::ErrorFallback);
        assert!(parse_failure.reason.contains("schema"));

        let transport_failure = s.select_next(&[]).await;
        assert!(transport_failure.reason.contains("connection reset"));
    }
}
