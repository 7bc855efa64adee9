//! Event and analytics records kept by the monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use uuid::Uuid;

/// Kinds of orchestration events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrchestrationEventType {
    SessionStarted,
    SessionEnded,
    AgentSelected,
    AgentResponse,
    ToolExecuted,
    ToolError,
    /// Termination check answered "continue"
    ContinuationDecision,
    /// Termination check answered "stop"
    TerminationDecision,
    IterationCeiling,
    Error,
}

/// One timestamped event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationEvent {
    pub event_id: String,
    pub session_id: String,
    pub event_type: OrchestrationEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl OrchestrationEvent {
    pub fn new(
        session_id: impl Into<String>,
        event_type: OrchestrationEventType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            event_type,
            timestamp: Utc::now(),
            agent_name: None,
            message: message.into(),
            duration: None,
            details: Map::new(),
        }
    }

    pub fn agent(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    pub fn took(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Counters derived from a session's events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub total_selections: u64,
    pub total_responses: u64,
    pub total_termination_checks: u64,
    pub tool_calls_executed: u64,
    pub successful_tool_calls: u64,
    pub failed_tool_calls: u64,
    pub total_response_length: usize,
    pub average_selection_time: Duration,
    pub average_response_time: Duration,
    pub average_decision_time: Duration,
    pub agent_usage_count: HashMap<String, u64>,
}

impl SessionMetrics {
    /// Fold one sample into a running mean over `count` samples
    pub(crate) fn rolling(average: Duration, count: u64, sample: Duration) -> Duration {
        if count <= 1 {
            return sample;
        }
        let n = count as u128;
        let nanos = (average.as_nanos() * (n - 1) + sample.as_nanos()) / n;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Successful share of executed tool calls, 0 when none ran
    pub fn tool_call_success_rate(&self) -> f64 {
        if self.tool_calls_executed == 0 {
            return 0.0;
        }
        self.successful_tool_calls as f64 / self.tool_calls_executed as f64
    }
}

/// A session tracked by the monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredSession {
    pub session_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Set when the session ends
    pub duration: Duration,
    pub last_activity: DateTime<Utc>,
    pub available_agents: Vec<String>,
    /// Most recent events, oldest first
    pub events: VecDeque<OrchestrationEvent>,
    /// Selected agents in order
    pub agent_flow: Vec<String>,
    pub metrics: SessionMetrics,
    /// Turns currently running against this session
    #[serde(skip)]
    pub(crate) open_turns: usize,
}

impl MonitoredSession {
    pub(crate) fn new(session_id: &str, tenant_id: &str, user_id: &str, available_agents: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            start_time: now,
            end_time: None,
            duration: Duration::ZERO,
            last_activity: now,
            available_agents,
            events: VecDeque::new(),
            agent_flow: Vec::new(),
            metrics: SessionMetrics::default(),
            open_turns: 1,
        }
    }

    pub(crate) fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.start_time).to_std().unwrap_or_default()
    }
}

/// Rates derived from session metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub responses_per_minute: f64,
    pub average_response_time: Duration,
    pub average_selection_time: Duration,
    pub tool_call_success_rate: f64,
}

/// Point-in-time view of one active session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAnalytics {
    pub session_id: String,
    pub duration: Duration,
    pub is_active: bool,
    pub metrics: SessionMetrics,
    pub agent_flow: Vec<String>,
    /// Newest first
    pub recent_events: Vec<OrchestrationEvent>,
    pub performance: PerformanceMetrics,
}

/// Process-wide view across sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationStatistics {
    pub active_session_count: usize,
    pub total_events_logged: usize,
    pub average_session_duration: Duration,
    /// "None" when no selection has been logged
    pub most_active_agent: String,
    pub event_type_counts: HashMap<OrchestrationEventType, usize>,
    pub last_updated: DateTime<Utc>,
}
