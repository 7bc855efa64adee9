//! Turn-level entry point wrapping the orchestration loop

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::agents::config::OrchestrationConfig;
use crate::agents::context::{ContextWindow, ConversationContext};
use crate::agents::decision::DecisionClient;
use crate::agents::domain::{Agent, DebugLog, LogProperty, Message};
use crate::agents::error::{DispatchError, DispatchResult};
use crate::agents::executor::AgentExecutor;
use crate::agents::llm::LlmProvider;
use crate::agents::monitor::{DispatchMetrics, OrchestrationMonitor};
use crate::agents::orchestration::{keys, OrchestrationLoop, OrchestrationSession, TurnOutcome};
use crate::agents::registry::AgentRegistry;
use crate::agents::selection::SelectionStrategy;
use crate::agents::summarize::{Summarizer, SummaryFilter};
use crate::agents::termination::TerminationStrategy;
use crate::agents::tools::ToolTable;
use crate::config::Settings;

/// Author of the generic failure message
pub const FAILURE_AUTHOR: &str = "Error";

/// Text returned to the user when a turn fails hard
pub const FAILURE_MESSAGE: &str =
    "Sorry, I encountered an error while processing your request. Please try again.";

/// One user turn to orchestrate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub session_id: String,
    pub tenant_id: String,
    pub user_id: String,
    /// Prior transcript, oldest first
    #[serde(default)]
    pub history: Vec<Message>,
    pub user_prompt: String,
}

/// Builds the engine once and runs turns against it
pub struct DispatchHandler {
    registry: Arc<AgentRegistry>,
    orchestration: OrchestrationLoop,
    monitor: Arc<OrchestrationMonitor>,
    summarizer: Summarizer,
}

impl DispatchHandler {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<AgentRegistry>,
        tools: Arc<ToolTable>,
        monitor: Arc<OrchestrationMonitor>,
        config: &OrchestrationConfig,
    ) -> DispatchResult<Self> {
        let context = ConversationContext::new(config.max_context_chars).with_sanitizer(config.sanitize);
        let decisions = DecisionClient::new(provider.clone(), context.clone(), config.decision_timeout());

        let mut selection = SelectionStrategy::new(
            decisions.clone(),
            registry.clone(),
            &config.default_agent,
            ContextWindow::from(config.selection_window),
        )?;
        if let Some(template) = &config.selection_prompt {
            selection = selection.with_prompt(template);
        }

        let mut termination = TerminationStrategy::new(decisions, ContextWindow::Last(config.termination_window));
        if let Some(prompt) = &config.termination_prompt {
            termination = termination.with_prompt(prompt.as_str());
        }

        let executor = AgentExecutor::new(
            provider.clone(),
            tools,
            monitor.clone(),
            config.max_tool_rounds,
            config.retry.clone(),
        );

        let mut orchestration = OrchestrationLoop::new(
            selection,
            termination,
            executor,
            monitor.clone(),
            config.max_iterations,
        );
        if config.summarize_results {
            orchestration = orchestration.with_filter(Arc::new(SummaryFilter::new(provider.clone(), context)));
        }

        Ok(Self {
            registry,
            orchestration,
            monitor,
            summarizer: Summarizer::new(provider),
        })
    }

    /// Wire the engine from loaded settings
    pub fn from_settings(settings: &Settings, provider: Arc<dyn LlmProvider>) -> DispatchResult<Self> {
        let registry = Arc::new(AgentRegistry::new(settings.agents.iter().map(Agent::from))?);
        let tools = Arc::new(ToolTable::from_configs(&settings.tools)?);

        let mut monitor = OrchestrationMonitor::new(&settings.monitor);
        if settings.monitor.prometheus {
            let metrics = DispatchMetrics::new()
                .map_err(|e| DispatchError::Configuration(format!("metrics: {}", e)))?;
            monitor = monitor.with_metrics(Arc::new(metrics));
        }

        Self::new(provider, registry, tools, Arc::new(monitor), &settings.orchestration)
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<OrchestrationMonitor> {
        &self.monitor
    }

    /// Run one turn and return the caller-facing result
    ///
    /// A hard failure yields a single generic message whose debug log holds
    /// every property recorded before the failure. A cancelled turn yields
    /// nothing.
    pub async fn get_response(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> (Vec<Message>, Vec<DebugLog>) {
        let (session, result) = self.run_turn(request, cancel).await;
        match result {
            Ok(outcome) => (outcome.messages, outcome.debug_logs),
            Err(DispatchError::Cancelled) => {
                info!(session_id = %session.session_id, "Turn cancelled, returning no responses");
                (Vec::new(), Vec::new())
            }
            Err(e) => {
                error!(session_id = %session.session_id, "Turn failed: {}", e);
                let (message, log) = failure_response(&session, &e);
                (vec![message], vec![log])
            }
        }
    }

    /// Run one turn, returning the final session state alongside the result
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> (OrchestrationSession, DispatchResult<TurnOutcome>) {
        let TurnRequest {
            session_id,
            tenant_id,
            user_id,
            mut history,
            user_prompt,
        } = request;
        history.push(Message::user(user_prompt).in_session(&session_id, &tenant_id, &user_id));

        let mut session = OrchestrationSession::new(
            session_id,
            tenant_id,
            user_id,
            history,
            self.orchestration.default_agent().name.clone(),
        );
        self.monitor.start_session(
            &session.session_id,
            &session.tenant_id,
            &session.user_id,
            &self.registry.names(),
        );

        let result = self.orchestration.run(&mut session, &cancel).await;
        self.monitor.end_session(&session.session_id);
        (session, result)
    }

    /// Two-word name for a new session; empty on failure
    pub async fn summarize_session_name(&self, prompt: &str) -> String {
        self.summarizer.session_name(prompt).await
    }
}

fn failure_response(session: &OrchestrationSession, err: &DispatchError) -> (Message, DebugLog) {
    let mut message = Message::assistant(FAILURE_AUTHOR, FAILURE_MESSAGE).in_session(
        &session.session_id,
        &session.tenant_id,
        &session.user_id,
    );
    let mut log = DebugLog::new(&message.id, &session.session_id, &session.tenant_id, &session.user_id);
    log.property_bag = session.all_properties();
    if !log.property_bag.iter().any(|p| p.key == keys::ERROR) {
        log.property_bag.push(LogProperty::new(keys::ERROR, err.to_string()));
    }
    message.debug_log_id = Some(log.id.clone());
    (message, log)
}
