//! Per-turn orchestration state and its debug trail

use serde::{Deserialize, Serialize};

use crate::agents::domain::{DebugLog, LogProperty, Message};

/// Property keys written to debug logs
pub mod keys {
    pub const SELECT_NEXT_AGENT: &str = "SelectNextAgent";
    pub const SHOULD_TERMINATE: &str = "ShouldTerminate";
    pub const AGENT_RESPONSE: &str = "AgentResponse";
    pub const TOOL_CALL: &str = "ToolCall";
    pub const ITERATION_CEILING: &str = "IterationCeiling";
    pub const FILTER_RESULTS: &str = "FilterResults";
    pub const CANCELLED: &str = "Cancelled";
    pub const ERROR: &str = "Error";
}

/// Why the loop reached DONE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The termination check answered "stop"
    AiDecision,
    /// `max_iterations` was reached while the check said "continue"
    IterationCeiling,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::AiDecision => "ai_stop",
            StopReason::IterationCeiling => "iteration_ceiling",
        }
    }
}

/// What one user turn produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Agent responses in order, each linked to its debug log
    pub messages: Vec<Message>,
    pub debug_logs: Vec<DebugLog>,
    /// Author of the last response
    pub final_agent: String,
    pub stop_reason: StopReason,
    pub iterations: u32,
}

impl TurnOutcome {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Runtime state of one user turn; never persisted
#[derive(Debug, Clone)]
pub struct OrchestrationSession {
    pub session_id: String,
    pub tenant_id: String,
    pub user_id: String,
    /// Full transcript, including this turn's responses
    pub history: Vec<Message>,
    pub iteration_count: u32,
    pub last_selected_agent: String,
    responses: Vec<Message>,
    debug_logs: Vec<DebugLog>,
    /// Properties recorded since the last response
    pending: Vec<LogProperty>,
}

impl OrchestrationSession {
    pub fn new(
        session_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        history: Vec<Message>,
        default_agent: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            history,
            iteration_count: 0,
            last_selected_agent: default_agent.into(),
            responses: Vec::new(),
            debug_logs: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Record a property for the next response's debug log
    pub fn note(&mut self, key: &str, value: impl Into<String>) {
        self.pending.push(LogProperty::new(key, value));
    }

    /// Record a property on the most recent response's debug log
    pub fn note_on_last(&mut self, key: &str, value: impl Into<String>) {
        match self.debug_logs.last_mut() {
            Some(log) => log.push(key, value),
            None => self.note(key, value),
        }
    }

    /// Append a response, linking it to a debug log holding the pending properties
    pub fn record_response(&mut self, message: Message, properties: Vec<LogProperty>) -> &Message {
        let mut message = message.in_session(&self.session_id, &self.tenant_id, &self.user_id);
        let mut log = DebugLog::new(&message.id, &self.session_id, &self.tenant_id, &self.user_id);
        log.property_bag.append(&mut self.pending);
        log.property_bag.extend(properties);
        message.debug_log_id = Some(log.id.clone());

        self.debug_logs.push(log);
        self.history.push(message.clone());
        self.responses.push(message);
        &self.responses[self.responses.len() - 1]
    }

    /// Replace the text of the most recent response in place
    pub fn rewrite_last_response(&mut self, text: String) -> bool {
        let Some(last) = self.responses.last_mut() else {
            return false;
        };
        if let Some(entry) = self.history.iter_mut().rev().find(|m| m.id == last.id) {
            entry.text = text.clone();
        }
        last.text = text;
        true
    }

    pub fn responses(&self) -> &[Message] {
        &self.responses
    }

    pub fn debug_logs(&self) -> &[DebugLog] {
        &self.debug_logs
    }

    /// Every property recorded this turn, linked or not, in order
    pub fn all_properties(&self) -> Vec<LogProperty> {
        let mut properties: Vec<LogProperty> = self
            .debug_logs
            .iter()
            .flat_map(|log| log.property_bag.iter().cloned())
            .chain(self.pending.iter().cloned())
            .collect();
        properties.sort_by_key(|p| p.timestamp);
        properties
    }

    pub(crate) fn outcome(&self, stop_reason: StopReason) -> TurnOutcome {
        TurnOutcome {
            messages: self.responses.clone(),
            debug_logs: self.debug_logs.clone(),
            final_agent: self
                .responses
                .last()
                .map(|m| m.author_name.clone())
                .unwrap_or_else(|| self.last_selected_agent.clone()),
            stop_reason,
            iterations: self.iteration_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> OrchestrationSession {
        OrchestrationSession::new("s1", "t1", "u1", vec![Message::user("hi")], "Coordinator")
    }

    #[test]
    fn test_response_links_debug_log() {
        let mut s = session();
        s.note(keys::SELECT_NEXT_AGENT, "Sales");
        let message = s
            .record_response(
                Message::assistant("Sales", "hello"),
                vec![LogProperty::new(keys::AGENT_RESPONSE, "Sales")],
            )
            .clone();

        let log = &s.debug_logs()[0];
        assert_eq!(message.debug_log_id.as_deref(), Some(log.id.as_str()));
        assert_eq!(log.message_id, message.id);
        assert_eq!(message.session_id, "s1");
        assert_eq!(log.values(keys::SELECT_NEXT_AGENT).collect::<Vec<_>>(), vec!["Sales"]);
        assert_eq!(s.history.len(), 2);
    }

    #[test]
    fn test_note_on_last_without_response_stays_pending() {
        let mut s = session();
        s.note_on_last(keys::CANCELLED, "before select");
        assert!(s.debug_logs().is_empty());
        assert_eq!(s.all_properties().len(), 1);
    }

    #[test]
    fn test_rewrite_updates_history_too() {
        let mut s = session();
        s.record_response(Message::assistant("Sales", "draft"), Vec::new());
        assert!(s.rewrite_last_response("final".to_string()));
        assert_eq!(s.responses()[0].text, "final");
        assert_eq!(s.history.last().map(|m| m.text.as_str()), Some("final"));
    }

    #[test]
    fn test_outcome_final_agent_defaults_to_last_selected() {
        let s = session();
        let outcome = s.outcome(StopReason::AiDecision);
        assert_eq!(outcome.final_agent, "Coordinator");
        assert!(outcome.messages.is_empty());
    }
}
