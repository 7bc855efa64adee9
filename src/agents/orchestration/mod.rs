//! The select / execute / check-termination loop
//!
//! ```text
//! SELECT -> EXECUTE -> CHECK_TERMINATION -> SELECT ...
//!                              |
//!                              +-> DONE (AI stop or iteration ceiling)
//! ```
//!
//! Cancellation is observed between states, never mid-call.

mod session;

pub use session::{keys, OrchestrationSession, StopReason, TurnOutcome};

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agents::domain::{Agent, LogProperty};
use crate::agents::error::{DispatchError, DispatchResult};
use crate::agents::executor::AgentExecutor;
use crate::agents::monitor::OrchestrationMonitor;
use crate::agents::selection::SelectionStrategy;
use crate::agents::summarize::ResultFilter;
use crate::agents::termination::TerminationStrategy;

enum LoopState {
    Select,
    Execute(Arc<Agent>),
    CheckTermination,
    Done(StopReason),
}

impl LoopState {
    fn name(&self) -> &'static str {
        match self {
            LoopState::Select => "SELECT",
            LoopState::Execute(_) => "EXECUTE",
            LoopState::CheckTermination => "CHECK_TERMINATION",
            LoopState::Done(_) => "DONE",
        }
    }
}

/// Drives one user turn to completion
pub struct OrchestrationLoop {
    selection: SelectionStrategy,
    termination: TerminationStrategy,
    executor: AgentExecutor,
    monitor: Arc<OrchestrationMonitor>,
    max_iterations: u32,
    filter: Option<Arc<dyn ResultFilter>>,
}

impl OrchestrationLoop {
    pub fn new(
        selection: SelectionStrategy,
        termination: TerminationStrategy,
        executor: AgentExecutor,
        monitor: Arc<OrchestrationMonitor>,
        max_iterations: u32,
    ) -> Self {
        Self {
            selection,
            termination,
            executor,
            monitor,
            max_iterations: max_iterations.max(1),
            filter: None,
        }
    }

    /// Rewrite the final response once the loop is done
    pub fn with_filter(mut self, filter: Arc<dyn ResultFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn monitor(&self) -> &Arc<OrchestrationMonitor> {
        &self.monitor
    }

    pub fn default_agent(&self) -> &Arc<Agent> {
        self.selection.default_agent()
    }

    /// Run the state machine over `session` until DONE
    ///
    /// Only an unreachable completion service or cancellation returns an
    /// error; every decision failure is recovered inside its strategy.
    pub async fn run(
        &self,
        session: &mut OrchestrationSession,
        cancel: &CancellationToken,
    ) -> DispatchResult<TurnOutcome> {
        let mut state = LoopState::Select;

        loop {
            if cancel.is_cancelled() && !matches!(state, LoopState::Done(_)) {
                warn!(
                    session_id = %session.session_id,
                    iteration = session.iteration_count,
                    "Turn cancelled before {}",
                    state.name()
                );
                session.note_on_last(
                    keys::CANCELLED,
                    format!("Cancelled before {} at iteration {}", state.name(), session.iteration_count),
                );
                self.monitor.log_error(&session.session_id, "Turn cancelled");
                self.monitor.log_stop("cancelled");
                return Err(DispatchError::Cancelled);
            }

            state = match state {
                LoopState::Select => self.select(session).await,
                LoopState::Execute(agent) => self.execute(session, &agent).await?,
                LoopState::CheckTermination => self.check_termination(session).await,
                LoopState::Done(reason) => {
                    self.apply_filter(session).await;
                    self.monitor.log_stop(reason.as_str());
                    info!(
                        session_id = %session.session_id,
                        iterations = session.iteration_count,
                        reason = reason.as_str(),
                        "Orchestration finished"
                    );
                    return Ok(session.outcome(reason));
                }
            };
        }
    }

    async fn select(&self, session: &mut OrchestrationSession) -> LoopState {
        let start = Instant::now();
        let selection = self.selection.select_next(&session.history).await;
        let elapsed = start.elapsed();

        session.iteration_count += 1;
        session.last_selected_agent = selection.agent.name.clone();
        session.note(
            keys::SELECT_NEXT_AGENT,
            format!(
                "{} [{}] (iteration {}): {}",
                selection.agent.name,
                selection.source.as_str(),
                session.iteration_count,
                selection.reason
            ),
        );
        self.monitor.log_selection(
            &session.session_id,
            &selection.agent.name,
            &selection.reason,
            selection.source.as_str(),
            elapsed,
        );
        LoopState::Execute(selection.agent)
    }

    async fn execute(&self, session: &mut OrchestrationSession, agent: &Agent) -> DispatchResult<LoopState> {
        let start = Instant::now();
        let turn = match self.executor.run(agent, &session.history, &session.session_id).await {
            Ok(turn) => turn,
            Err(e) => {
                error!(
                    session_id = %session.session_id,
                    agent = %agent.name,
                    iteration = session.iteration_count,
                    "Agent execution failed: {}",
                    e
                );
                session.note(keys::ERROR, e.to_string());
                self.monitor.log_error(&session.session_id, &e.to_string());
                self.monitor.log_stop("failure");
                return Err(e);
            }
        };
        let elapsed = start.elapsed();

        let mut properties: Vec<LogProperty> = turn
            .tool_calls
            .iter()
            .map(|call| {
                let status = match &call.error {
                    None => "ok".to_string(),
                    Some(e) => format!("error: {}", e),
                };
                LogProperty::new(
                    keys::TOOL_CALL,
                    format!("{}({}) -> {} in {}ms", call.tool_name, call.input, status, call.execution_time_ms),
                )
            })
            .collect();
        properties.push(LogProperty::new(
            keys::AGENT_RESPONSE,
            format!(
                "{} responded in {}ms after {} round(s){}",
                agent.name,
                elapsed.as_millis(),
                turn.rounds,
                if turn.content_filtered { " (content filtered)" } else { "" }
            ),
        ));

        self.monitor.log_response(
            &session.session_id,
            &agent.name,
            &turn.message.text,
            elapsed,
            turn.tool_calls.len(),
        );
        session.record_response(turn.message, properties);
        Ok(LoopState::CheckTermination)
    }

    async fn check_termination(&self, session: &mut OrchestrationSession) -> LoopState {
        let start = Instant::now();
        let check = self.termination.should_terminate(&session.history).await;
        let elapsed = start.elapsed();

        session.note_on_last(
            keys::SHOULD_TERMINATE,
            format!("terminate={}: {}", check.terminate, check.reason),
        );
        self.monitor.log_termination(
            &session.session_id,
            check.terminate,
            &check.reason,
            elapsed,
            check.failed,
        );

        if check.terminate {
            return LoopState::Done(StopReason::AiDecision);
        }
        if session.iteration_count >= self.max_iterations {
            warn!(
                session_id = %session.session_id,
                iterations = session.iteration_count,
                "Iteration ceiling reached, stopping without an AI stop decision"
            );
            session.note_on_last(
                keys::ITERATION_CEILING,
                format!("Stopped at iteration ceiling of {}", self.max_iterations),
            );
            self.monitor.log_iteration_ceiling(
                &session.session_id,
                session.iteration_count,
                self.max_iterations,
            );
            return LoopState::Done(StopReason::IterationCeiling);
        }
        LoopState::Select
    }

    async fn apply_filter(&self, session: &mut OrchestrationSession) {
        let Some(filter) = &self.filter else {
            return;
        };
        let Some(last) = session.responses().last().cloned() else {
            return;
        };
        match filter.filter(&session.history, &last).await {
            Ok(text) => {
                session.rewrite_last_response(text);
                session.note_on_last(keys::FILTER_RESULTS, format!("Applied {} filter", filter.name()));
            }
            Err(e) => {
                warn!(session_id = %session.session_id, "Result filter '{}' failed: {}", filter.name(), e);
                session.note_on_last(
                    keys::FILTER_RESULTS,
                    format!("{} filter failed, kept original: {}", filter.name(), e),
                );
            }
        }
    }
}
