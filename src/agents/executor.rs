//! Runs one agent turn, including its tool-calling rounds

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::ExponentialBackoffBuilder;
use tracing::{debug, warn};

use crate::agents::config::RetryConfig;
use crate::agents::domain::{Agent, ChatMessage, Message, ToolCall, ToolCallResult};
use crate::agents::error::{DispatchError, DispatchResult, LlmError};
use crate::agents::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ToolChoice};
use crate::agents::monitor::OrchestrationMonitor;
use crate::agents::tools::ToolTable;

/// Reply attributed to an agent whose call was content filtered
pub const CONTENT_FILTER_REPLY: &str =
    "I'm unable to help with that request as written. Could you rephrase it?";

/// Result of one agent execution
#[derive(Debug, Clone)]
pub struct AgentTurn {
    /// Final assistant message attributed to the agent
    pub message: Message,
    pub tool_calls: Vec<ToolCallResult>,
    /// Completion calls made, including tool rounds
    pub rounds: u32,
    pub content_filtered: bool,
}

/// Invokes agents against the completion service
pub struct AgentExecutor {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolTable>,
    monitor: Arc<OrchestrationMonitor>,
    max_tool_rounds: u32,
    retry: RetryConfig,
}

impl AgentExecutor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolTable>,
        monitor: Arc<OrchestrationMonitor>,
        max_tool_rounds: u32,
        retry: RetryConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            monitor,
            max_tool_rounds,
            retry,
        }
    }

    /// Produce the agent's reply to `history`
    ///
    /// Tool failures go back to the model as inline error payloads. After
    /// `max_tool_rounds` rounds one last call is made with tools disabled.
    pub async fn run(&self, agent: &Agent, history: &[Message], session_id: &str) -> DispatchResult<AgentTurn> {
        let definitions = self.tools.definitions_for(agent);
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(&agent.instructions));
        messages.extend(history.iter().map(ChatMessage::from));

        let mut tool_calls = Vec::new();
        let mut rounds = 0;

        loop {
            let last_round = rounds >= self.max_tool_rounds;
            let request = CompletionRequest {
                messages: messages.clone(),
                tools: (!definitions.is_empty()).then(|| definitions.clone()),
                tool_choice: (!definitions.is_empty()).then(|| {
                    if last_round {
                        ToolChoice::None
                    } else {
                        ToolChoice::Auto
                    }
                }),
                ..Default::default()
            };
            rounds += 1;

            let response = match self.complete_with_retry(request).await {
                Ok(response) if response.finish_reason != FinishReason::ContentFilter => response,
                Ok(_) | Err(DispatchError::ContentFiltered) => {
                    warn!(session_id, agent = %agent.name, "Agent call was content filtered");
                    return Ok(AgentTurn {
                        message: Message::assistant(&agent.name, CONTENT_FILTER_REPLY),
                        tool_calls,
                        rounds,
                        content_filtered: true,
                    });
                }
                Err(e) => return Err(e),
            };

            let requested = response.message.requested_tools().to_vec();
            if requested.is_empty() || last_round {
                return Ok(AgentTurn {
                    message: Message::assistant(&agent.name, response.message.content),
                    tool_calls,
                    rounds,
                    content_filtered: false,
                });
            }

            messages.push(response.message);
            for call in &requested {
                let result = self.execute_tool(agent, call, session_id).await;
                messages.push(ChatMessage::tool_result(&call.id, &result.payload()));
                tool_calls.push(result);
            }
        }
    }

    async fn execute_tool(&self, agent: &Agent, call: &ToolCall, session_id: &str) -> ToolCallResult {
        let start = Instant::now();
        let outcome = if self.tools.is_visible(agent, &call.name) {
            self.tools.invoke(&call.name, call.arguments.clone()).await
        } else {
            Err(DispatchError::ToolExecution {
                tool: call.name.clone(),
                message: format!("tool '{}' is not available to {}", call.name, agent.name),
            })
        };
        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        match outcome {
            Ok(output) => {
                debug!(session_id, agent = %agent.name, tool = %call.name, elapsed_ms, "Tool executed");
                self.monitor
                    .log_tool_execution(session_id, &agent.name, &call.name, elapsed, None);
                ToolCallResult::success(call, output, elapsed_ms)
            }
            Err(e) => {
                let message = match e {
                    DispatchError::ToolExecution { message, .. } => message,
                    other => other.to_string(),
                };
                warn!(session_id, agent = %agent.name, tool = %call.name, "Tool failed: {}", message);
                self.monitor
                    .log_tool_execution(session_id, &agent.name, &call.name, elapsed, Some(&message));
                ToolCallResult::failure(call, message, elapsed_ms)
            }
        }
    }

    /// Retry transient failures with exponential backoff
    async fn complete_with_retry(&self, request: CompletionRequest) -> DispatchResult<CompletionResponse> {
        let max_attempts = self.retry.max_attempts.max(1);
        let max_interval = Duration::from_millis(self.retry.max_interval_ms);
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.retry.initial_interval_ms))
            .with_max_interval(max_interval)
            .with_max_elapsed_time(None)
            .build();
        let counter = AtomicU32::new(0);
        let (attempts, provider, request) = (&counter, &self.provider, &request);

        let result = backoff::future::retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            provider.complete(request.clone()).await.map_err(|e| {
                if !e.is_transient() || attempt >= max_attempts {
                    return backoff::Error::permanent(e);
                }
                warn!(attempt, max_attempts, "Completion call failed, retrying: {}", e);
                match e {
                    // Server-requested waits are still bounded by the retry policy
                    LlmError::RateLimited { retry_after_ms } => {
                        backoff::Error::retry_after(e, Duration::from_millis(retry_after_ms).min(max_interval))
                    }
                    e => backoff::Error::transient(e),
                }
            })
        })
        .await;

        result.map_err(|e| {
            if e.is_transient() {
                DispatchError::Unreachable {
                    attempts: attempts.load(Ordering::SeqCst),
                    message: e.to_string(),
                }
            } else {
                DispatchError::from(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::domain::{Role, ToolDefinition};
    use crate::agents::llm::{ScriptKind, ScriptedFailure, ScriptedProvider, ScriptedReply};
    use crate::agents::tools::{FnTool, StaticTool, ToolSpec};
    use serde_json::{json, Value};

    fn tool_table() -> Arc<ToolTable> {
        let table = ToolTable::new()
            .with(
                ToolSpec::new(
                    ToolDefinition::new("get_balance", "Balance", json!({"type": "object"})),
                    Arc::new(StaticTool(json!({"balance": 250}))),
                )
                .with_tags(["Transactions"]),
            )
            .unwrap()
            .with(
                ToolSpec::new(
                    ToolDefinition::new("transfer", "Transfer", json!({"type": "object"})),
                    Arc::new(FnTool(|_: Value| -> anyhow::Result<Value> {
                        anyhow::bail!("daily limit exceeded")
                    })),
                )
                .with_tags(["Transactions"]),
            )
            .unwrap()
            .with(ToolSpec::new(
                ToolDefinition::new("close_account", "Close", json!({"type": "object"})),
                Arc::new(StaticTool(json!({"closed": true}))),
            ))
            .unwrap();
        Arc::new(table)
    }

    fn executor(provider: Arc<ScriptedProvider>, monitor: Arc<OrchestrationMonitor>) -> AgentExecutor {
        AgentExecutor::new(
            provider,
            tool_table(),
            monitor,
            3,
            RetryConfig {
                max_attempts: 3,
                initial_interval_ms: 10,
                max_interval_ms: 20,
            },
        )
    }

    fn transactions() -> Agent {
        Agent::new("Transactions", "Moves money", "You handle transfers").with_tool_tags(["Transactions"])
    }

    fn monitored(session_id: &str) -> Arc<OrchestrationMonitor> {
        let monitor = Arc::new(OrchestrationMonitor::default());
        monitor.start_session(session_id, "t", "u", &["Transactions".to_string()]);
        monitor
    }

    #[tokio::test]
    async fn test_plain_reply_is_attributed_to_agent() {
        let provider = Arc::new(ScriptedProvider::new().reply("Your balance is 250"));
        let turn = executor(provider.clone(), monitored("s1"))
            .run(&transactions(), &[Message::user("balance?")], "s1")
            .await
            .unwrap();
        assert_eq!(turn.message.author_name, "Transactions");
        assert_eq!(turn.message.role, Role::Assistant);
        assert_eq!(turn.message.text, "Your balance is 250");

        let sent = &provider.requests()[0];
        assert_eq!(sent.messages[0].content, "You handle transfers");
        assert_eq!(sent.tools.as_ref().map(Vec::len), Some(2));
        assert_eq!(sent.tool_choice, Some(ToolChoice::Auto));
    }

    #[tokio::test]
    async fn test_tool_results_and_errors_fed_back() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .call_tools(vec![
                    ToolCall::new("c1", "get_balance", json!({})),
                    ToolCall::new("c2", "transfer", json!({"amount": 900})),
                    ToolCall::new("c3", "close_account", json!({})),
                ])
                .reply("Transfer failed: limit exceeded"),
        );
        let monitor = monitored("s1");
        let turn = executor(provider.clone(), monitor.clone())
            .run(&transactions(), &[Message::user("move 900")], "s1")
            .await
            .unwrap();

        assert_eq!(turn.rounds, 2);
        assert_eq!(turn.tool_calls.len(), 3);
        assert!(turn.tool_calls[0].success);
        assert_eq!(turn.tool_calls[1].error.as_deref(), Some("daily limit exceeded"));
        assert!(turn.tool_calls[2].error.as_deref().unwrap().contains("not available"));

        let second = &provider.requests()[1].messages;
        let tool_messages: Vec<_> = second.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_messages[0].content, r#"{"balance":250}"#);
        assert_eq!(tool_messages[1].content, r#"{"error":"daily limit exceeded"}"#);

        let analytics = monitor.get_session_analytics("s1").unwrap();
        assert_eq!(analytics.metrics.tool_calls_executed, 3);
        assert_eq!(analytics.metrics.failed_tool_calls, 2);
    }

    #[tokio::test]
    async fn test_tool_rounds_are_capped() {
        let call = ScriptedReply::ToolCalls(vec![ToolCall::new("c", "get_balance", json!({}))]);
        let provider = Arc::new(ScriptedProvider::new().fallback(ScriptKind::Agent, call));
        let turn = executor(provider.clone(), monitored("s1"))
            .run(&transactions(), &[], "s1")
            .await
            .unwrap();
        assert_eq!(turn.rounds, 4);
        let requests = provider.requests();
        assert_eq!(requests.last().unwrap().tool_choice, Some(ToolChoice::None));
    }

    #[tokio::test]
    async fn test_content_filter_yields_refusal() {
        let provider = Arc::new(
            ScriptedProvider::new().fail(ScriptKind::Agent, ScriptedFailure::ContentFiltered),
        );
        let turn = executor(provider, monitored("s1"))
            .run(&transactions(), &[], "s1")
            .await
            .unwrap();
        assert!(turn.content_filtered);
        assert_eq!(turn.message.text, CONTENT_FILTER_REPLY);
        assert_eq!(turn.message.author_name, "Transactions");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .fail(ScriptKind::Agent, ScriptedFailure::Network)
                .fail(ScriptKind::Agent, ScriptedFailure::Unavailable)
                .reply("recovered"),
        );
        let turn = executor(provider.clone(), monitored("s1"))
            .run(&transactions(), &[], "s1")
            .await
            .unwrap();
        assert_eq!(turn.message.text, "recovered");
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_unreachable() {
        let provider = Arc::new(ScriptedProvider::new().fallback(
            ScriptKind::Agent,
            ScriptedReply::Fail(ScriptedFailure::Timeout),
        ));
        let err = executor(provider.clone(), monitored("s1"))
            .run(&transactions(), &[], "s1")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unreachable { attempts: 3, .. }));
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_is_capped_by_max_interval() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .fail(ScriptKind::Agent, ScriptedFailure::RateLimited(3_600_000))
                .fail(ScriptKind::Agent, ScriptedFailure::RateLimited(u64::MAX))
                .reply("after the wait"),
        );
        let started = tokio::time::Instant::now();
        let turn = executor(provider.clone(), monitored("s1"))
            .run(&transactions(), &[], "s1")
            .await
            .unwrap();

        assert_eq!(turn.message.text, "after the wait");
        assert_eq!(provider.requests().len(), 3);
        assert!(started.elapsed() <= Duration::from_millis(40));
    }
}
