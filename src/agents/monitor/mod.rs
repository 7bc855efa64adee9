//! Observational record of orchestration activity
//!
//! The monitor never influences control flow. Per-session records sit
//! behind their own mutex; the process-wide event queue has an independent
//! lock and drops its oldest entries once full.

mod metrics;
mod models;

pub use metrics::DispatchMetrics;
pub use models::*;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::agents::config::MonitorConfig;

/// Characters of a response kept in its event preview
const PREVIEW_CHARS: usize = 100;

/// Thread-safe event log and session analytics
pub struct OrchestrationMonitor {
    sessions: RwLock<HashMap<String, Arc<Mutex<MonitoredSession>>>>,
    history: Mutex<VecDeque<OrchestrationEvent>>,
    capacity: usize,
    recent_events: usize,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl Default for OrchestrationMonitor {
    fn default() -> Self {
        Self::new(&MonitorConfig::default())
    }
}

impl OrchestrationMonitor {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(config.event_capacity)),
            capacity: config.event_capacity.max(1),
            recent_events: config.recent_events,
            metrics: None,
        }
    }

    /// Feed a Prometheus collector from every log call
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn metrics(&self) -> Option<&Arc<DispatchMetrics>> {
        self.metrics.as_ref()
    }

    fn session(&self, session_id: &str) -> Option<Arc<Mutex<MonitoredSession>>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Append to the global queue and to the session's bounded list
    fn record(&self, session: &mut MonitoredSession, event: OrchestrationEvent) {
        let event = self.push_global(event);
        session.last_activity = event.timestamp;
        session.events.push_back(event);
        while session.events.len() > self.capacity {
            session.events.pop_front();
        }
    }

    /// Events are stamped under the queue lock, so queue order is timestamp order
    fn push_global(&self, mut event: OrchestrationEvent) -> OrchestrationEvent {
        let mut history = self.history.lock();
        event.timestamp = Utc::now();
        history.push_back(event.clone());
        while history.len() > self.capacity {
            history.pop_front();
        }
        event
    }

    /// Begin tracking a turn. A turn on a session that is already active
    /// joins its record instead of replacing it.
    pub fn start_session(&self, session_id: &str, tenant_id: &str, user_id: &str, available_agents: &[String]) {
        let event = OrchestrationEvent::new(
            session_id,
            OrchestrationEventType::SessionStarted,
            format!(
                "Session started with {} available agents: {}",
                available_agents.len(),
                available_agents.join(", ")
            ),
        );

        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.get(session_id) {
            let mut session = existing.lock();
            session.open_turns += 1;
            let open_turns = session.open_turns;
            self.record(&mut session, event);
            debug!(session_id, open_turns, "Turn joined active monitoring session");
            return;
        }

        let mut session = MonitoredSession::new(session_id, tenant_id, user_id, available_agents.to_vec());
        self.record(&mut session, event);
        sessions.insert(session_id.to_string(), Arc::new(Mutex::new(session)));
        drop(sessions);

        if let Some(m) = &self.metrics {
            m.sessions_active.inc();
        }
        info!(session_id, user_id, "Started monitoring session");
    }

    pub fn log_selection(&self, session_id: &str, agent_name: &str, reason: &str, outcome: &str, elapsed: Duration) {
        if let Some(m) = &self.metrics {
            m.selections_total.with_label_values(&[agent_name, outcome]).inc();
            m.selection_duration.observe(elapsed.as_secs_f64());
        }
        let Some(session) = self.session(session_id) else {
            return;
        };
        let event = OrchestrationEvent::new(session_id, OrchestrationEventType::AgentSelected, reason)
            .agent(agent_name)
            .took(elapsed)
            .detail("SelectionReason", reason)
            .detail("SelectedAgent", agent_name)
            .detail("Outcome", outcome)
            .detail("SelectionTimeMs", elapsed.as_millis() as u64);

        let mut session = session.lock();
        let metrics = &mut session.metrics;
        metrics.total_selections += 1;
        metrics.average_selection_time =
            SessionMetrics::rolling(metrics.average_selection_time, metrics.total_selections, elapsed);
        *metrics.agent_usage_count.entry(agent_name.to_string()).or_insert(0) += 1;
        session.agent_flow.push(agent_name.to_string());
        self.record(&mut session, event);

        debug!(session_id, agent = agent_name, elapsed_ms = elapsed.as_millis() as u64, "Agent selected");
    }

    pub fn log_response(&self, session_id: &str, agent_name: &str, response: &str, elapsed: Duration, tool_calls: usize) {
        if let Some(m) = &self.metrics {
            m.responses_total.with_label_values(&[agent_name]).inc();
            m.response_duration
                .with_label_values(&[agent_name])
                .observe(elapsed.as_secs_f64());
        }
        let Some(session) = self.session(session_id) else {
            return;
        };
        let length = response.chars().count();
        let event = OrchestrationEvent::new(
            session_id,
            OrchestrationEventType::AgentResponse,
            format!("Agent response ({} chars)", length),
        )
        .agent(agent_name)
        .took(elapsed)
        .detail("ResponseLength", length)
        .detail("ResponseTimeMs", elapsed.as_millis() as u64)
        .detail("HasToolCalls", tool_calls > 0)
        .detail("ResponsePreview", preview(response));

        let mut session = session.lock();
        let metrics = &mut session.metrics;
        metrics.total_responses += 1;
        metrics.average_response_time =
            SessionMetrics::rolling(metrics.average_response_time, metrics.total_responses, elapsed);
        metrics.total_response_length += length;
        self.record(&mut session, event);

        debug!(session_id, agent = agent_name, elapsed_ms = elapsed.as_millis() as u64, "Agent responded");
    }

    /// `failed` marks a check that fell back to "continue"
    pub fn log_termination(&self, session_id: &str, terminate: bool, reason: &str, elapsed: Duration, failed: bool) {
        if let Some(m) = &self.metrics {
            let outcome = match (failed, terminate) {
                (true, _) => "error",
                (false, true) => "stop",
                (false, false) => "continue",
            };
            m.termination_decisions_total.with_label_values(&[outcome]).inc();
            m.decision_duration.observe(elapsed.as_secs_f64());
        }
        let Some(session) = self.session(session_id) else {
            return;
        };
        let event_type = if terminate {
            OrchestrationEventType::TerminationDecision
        } else {
            OrchestrationEventType::ContinuationDecision
        };
        let event = OrchestrationEvent::new(session_id, event_type, reason)
            .took(elapsed)
            .detail("ShouldContinue", !terminate)
            .detail("TerminationReason", reason)
            .detail("DecisionFailed", failed)
            .detail("DecisionTimeMs", elapsed.as_millis() as u64);

        let mut session = session.lock();
        let metrics = &mut session.metrics;
        metrics.total_termination_checks += 1;
        metrics.average_decision_time = SessionMetrics::rolling(
            metrics.average_decision_time,
            metrics.total_termination_checks,
            elapsed,
        );
        self.record(&mut session, event);

        debug!(session_id, should_continue = !terminate, "Termination decision logged");
    }

    /// `error` is `None` for a successful call
    pub fn log_tool_execution(
        &self,
        session_id: &str,
        agent_name: &str,
        tool_name: &str,
        elapsed: Duration,
        error: Option<&str>,
    ) {
        if let Some(m) = &self.metrics {
            let status = if error.is_none() { "success" } else { "error" };
            m.tool_calls_total.with_label_values(&[tool_name, status]).inc();
        }
        let Some(session) = self.session(session_id) else {
            return;
        };
        let (event_type, message) = match error {
            None => (
                OrchestrationEventType::ToolExecuted,
                format!("Tool {} executed successfully", tool_name),
            ),
            Some(e) => (
                OrchestrationEventType::ToolError,
                format!("Tool {} failed: {}", tool_name, e),
            ),
        };
        let event = OrchestrationEvent::new(session_id, event_type, message)
            .agent(agent_name)
            .took(elapsed)
            .detail("ToolName", tool_name)
            .detail("ExecutionTimeMs", elapsed.as_millis() as u64)
            .detail("Successful", error.is_none())
            .detail("ErrorMessage", error.unwrap_or_default());

        let mut session = session.lock();
        let metrics = &mut session.metrics;
        metrics.tool_calls_executed += 1;
        if error.is_none() {
            metrics.successful_tool_calls += 1;
        } else {
            metrics.failed_tool_calls += 1;
        }
        self.record(&mut session, event);

        debug!(session_id, agent = agent_name, tool = tool_name, ok = error.is_none(), "Tool execution logged");
    }

    pub fn log_iteration_ceiling(&self, session_id: &str, iterations: u32, max_iterations: u32) {
        let Some(session) = self.session(session_id) else {
            return;
        };
        let event = OrchestrationEvent::new(
            session_id,
            OrchestrationEventType::IterationCeiling,
            format!("Iteration ceiling reached after {} of {} iterations", iterations, max_iterations),
        )
        .detail("Iterations", iterations)
        .detail("MaxIterations", max_iterations);
        self.record(&mut session.lock(), event);
    }

    pub fn log_error(&self, session_id: &str, message: &str) {
        let Some(session) = self.session(session_id) else {
            return;
        };
        let event = OrchestrationEvent::new(session_id, OrchestrationEventType::Error, message);
        self.record(&mut session.lock(), event);
    }

    /// Count a loop exit; `reason` is a metrics label
    pub fn log_stop(&self, reason: &str) {
        if let Some(m) = &self.metrics {
            m.loop_stops_total.with_label_values(&[reason]).inc();
        }
    }

    /// End one turn. Once the last open turn ends the session stops being
    /// tracked and its finalised record is returned.
    pub fn end_session(&self, session_id: &str) -> Option<MonitoredSession> {
        let mut sessions = self.sessions.write();
        let entry = sessions.get(session_id)?.clone();
        let mut live = entry.lock();
        live.open_turns = live.open_turns.saturating_sub(1);
        if live.open_turns > 0 {
            debug!(session_id, open_turns = live.open_turns, "Turn ended, session still active");
            return None;
        }
        sessions.remove(session_id);
        drop(sessions);
        let mut session = live.clone();
        drop(live);

        let now = Utc::now();
        session.end_time = Some(now);
        session.duration = session.elapsed(now);

        let event = OrchestrationEvent::new(
            session_id,
            OrchestrationEventType::SessionEnded,
            format!(
                "Session ended after {:.2} minutes with {} responses",
                session.duration.as_secs_f64() / 60.0,
                session.metrics.total_responses
            ),
        )
        .detail("DurationMs", json!(session.duration.as_millis() as u64));
        self.record(&mut session, event);

        if let Some(m) = &self.metrics {
            m.sessions_active.dec();
        }
        info!(
            session_id,
            elapsed_ms = session.duration.as_millis() as u64,
            responses = session.metrics.total_responses,
            "Ended monitoring session"
        );
        Some(session)
    }

    /// Live analytics for an active session
    pub fn get_session_analytics(&self, session_id: &str) -> Option<SessionAnalytics> {
        let session = self.session(session_id)?;
        let session = session.lock();
        let duration = session.elapsed(Utc::now());
        let minutes = duration.as_secs_f64() / 60.0;

        Some(SessionAnalytics {
            session_id: session.session_id.clone(),
            duration,
            is_active: true,
            metrics: session.metrics.clone(),
            agent_flow: session.agent_flow.clone(),
            recent_events: session
                .events
                .iter()
                .rev()
                .take(self.recent_events)
                .cloned()
                .collect(),
            performance: PerformanceMetrics {
                responses_per_minute: if minutes > 0.0 {
                    session.metrics.total_responses as f64 / minutes
                } else {
                    0.0
                },
                average_response_time: session.metrics.average_response_time,
                average_selection_time: session.metrics.average_selection_time,
                tool_call_success_rate: session.metrics.tool_call_success_rate(),
            },
        })
    }

    pub fn get_overall_statistics(&self) -> OrchestrationStatistics {
        let mut event_type_counts = HashMap::new();
        let total_events_logged = {
            let history = self.history.lock();
            for event in history.iter() {
                *event_type_counts.entry(event.event_type).or_insert(0) += 1;
            }
            history.len()
        };

        let sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        let now = Utc::now();
        let mut total_duration = Duration::ZERO;
        let mut agent_counts: HashMap<String, u64> = HashMap::new();
        for session in &sessions {
            let session = session.lock();
            total_duration += session.elapsed(now);
            for (agent, count) in &session.metrics.agent_usage_count {
                *agent_counts.entry(agent.clone()).or_insert(0) += count;
            }
        }

        let average_session_duration = if sessions.is_empty() {
            Duration::ZERO
        } else {
            total_duration / sessions.len() as u32
        };

        // Ties resolve by name so the answer is stable
        let most_active_agent = agent_counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(agent, _)| agent)
            .unwrap_or_else(|| "None".to_string());

        OrchestrationStatistics {
            active_session_count: sessions.len(),
            total_events_logged,
            average_session_duration,
            most_active_agent,
            event_type_counts,
            last_updated: now,
        }
    }

    /// Snapshot of the process-wide queue, oldest first
    pub fn event_history(&self) -> Vec<OrchestrationEvent> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(capacity: usize) -> OrchestrationMonitor {
        OrchestrationMonitor::new(&MonitorConfig {
            event_capacity: capacity,
            ..Default::default()
        })
    }

    fn agents() -> Vec<String> {
        vec!["Coordinator".to_string(), "Sales".to_string()]
    }

    #[test]
    fn test_session_counters() {
        let m = monitor(1000);
        m.start_session("s1", "t1", "u1", &agents());
        m.log_selection("s1", "Sales", "wants offer", "ai", Duration::from_millis(10));
        m.log_selection("s1", "Sales", "again", "ai", Duration::from_millis(30));
        m.log_response("s1", "Sales", "hello", Duration::from_millis(50), 1);
        m.log_tool_execution("s1", "Sales", "list_offers", Duration::from_millis(5), None);
        m.log_tool_execution("s1", "Sales", "transfer", Duration::from_millis(5), Some("denied"));
        m.log_termination("s1", true, "answered", Duration::from_millis(7), false);

        let analytics = m.get_session_analytics("s1").unwrap();
        assert_eq!(analytics.metrics.total_selections, 2);
        assert_eq!(analytics.metrics.average_selection_time, Duration::from_millis(20));
        assert_eq!(analytics.metrics.tool_calls_executed, 2);
        assert_eq!(analytics.performance.tool_call_success_rate, 0.5);
        assert_eq!(analytics.agent_flow, vec!["Sales", "Sales"]);
        assert_eq!(
            analytics.recent_events[0].event_type,
            OrchestrationEventType::TerminationDecision
        );

        let stats = m.get_overall_statistics();
        assert_eq!(stats.active_session_count, 1);
        assert_eq!(stats.most_active_agent, "Sales");
    }

    #[test]
    fn test_unknown_session_is_ignored() {
        let m = monitor(1000);
        m.log_selection("ghost", "Sales", "r", "ai", Duration::ZERO);
        assert!(m.event_history().is_empty());
        assert!(m.get_session_analytics("ghost").is_none());
        assert!(m.end_session("ghost").is_none());
    }

    #[test]
    fn test_end_session_finalises_record() {
        let m = monitor(1000);
        m.start_session("s1", "t1", "u1", &agents());
        m.log_response("s1", "Coordinator", "hi", Duration::from_millis(1), 0);
        let record = m.end_session("s1").unwrap();
        assert!(record.end_time.is_some());
        assert_eq!(
            record.events.back().map(|e| e.event_type),
            Some(OrchestrationEventType::SessionEnded)
        );
        assert!(!m.is_active("s1"));
        assert_eq!(m.get_overall_statistics().most_active_agent, "None");
    }

    #[test]
    fn test_overlapping_turns_share_one_record() {
        let m = monitor(1000);
        m.start_session("s1", "t1", "u1", &agents());
        m.log_selection("s1", "Sales", "first turn", "ai", Duration::from_millis(1));
        m.start_session("s1", "t1", "u1", &agents());
        m.log_selection("s1", "Coordinator", "second turn", "ai", Duration::from_millis(1));

        // The second turn finishes first; the first turn keeps logging
        assert!(m.end_session("s1").is_none());
        m.log_response("s1", "Sales", "late reply", Duration::from_millis(1), 0);

        let analytics = m.get_session_analytics("s1").unwrap();
        assert_eq!(analytics.metrics.total_selections, 2);
        assert_eq!(analytics.metrics.total_responses, 1);
        assert_eq!(analytics.agent_flow, vec!["Sales", "Coordinator"]);

        let record = m.end_session("s1").unwrap();
        assert_eq!(record.metrics.total_responses, 1);
        assert!(!m.is_active("s1"));
        assert!(m.end_session("s1").is_none());
    }

    #[test]
    fn test_response_preview_is_truncated() {
        let m = monitor(1000);
        m.start_session("s1", "t1", "u1", &agents());
        m.log_response("s1", "Sales", &"x".repeat(150), Duration::ZERO, 0);
        let event = m.event_history().pop().unwrap();
        let preview = event.details["ResponsePreview"].as_str().unwrap();
        assert_eq!(preview.len(), 103);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_global_queue_drops_oldest() {
        let m = monitor(5);
        m.start_session("s1", "t1", "u1", &agents());
        for i in 0..10 {
            m.log_error("s1", &format!("e{}", i));
        }
        let history = m.event_history();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].message, "e5");
        assert_eq!(history[4].message, "e9");
        assert_eq!(m.get_overall_statistics().total_events_logged, 5);
    }

    #[test]
    fn test_metrics_fed_from_log_calls() {
        let metrics = Arc::new(DispatchMetrics::new().unwrap());
        let m = monitor(10).with_metrics(metrics.clone());
        m.start_session("s1", "t1", "u1", &agents());
        m.log_selection("s1", "Sales", "r", "keyword_fallback", Duration::ZERO);
        m.log_stop("iteration_ceiling");
        let text = metrics.encode().unwrap();
        assert!(text.contains("outcome=\"keyword_fallback\""));
        assert!(text.contains("dispatch_sessions_active 1"));
    }
}
