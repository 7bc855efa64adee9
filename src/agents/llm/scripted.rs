//! In-memory provider that replays scripted completions
//!
//! Replies are queued per call kind, keyed off the requested response
//! schema: selection decisions, termination decisions, and everything else
//! (agent turns and plain completions). Each queue may carry a fallback
//! reply that repeats once the queue is drained.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;

use super::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use crate::agents::domain::{ChatMessage, Decision, SelectionDecision, TerminationDecision, ToolCall};
use crate::agents::error::{LlmError, LlmResult};

/// Which queue a request draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Selection,
    Termination,
    Agent,
}

impl ScriptKind {
    pub fn of(request: &CompletionRequest) -> Self {
        let selection = SelectionDecision::response_schema().name;
        let termination = TerminationDecision::response_schema().name;
        match request.response_format.as_ref().map(|f| f.name.as_str()) {
            Some(name) if name == selection => ScriptKind::Selection,
            Some(name) if name == termination => ScriptKind::Termination,
            _ => ScriptKind::Agent,
        }
    }
}

/// One scripted completion
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Content is the serialized value
    Json(Value),
    /// Content is the raw text
    Text(String),
    /// The assistant asks for tool calls
    ToolCalls(Vec<ToolCall>),
    Fail(ScriptedFailure),
}

/// Failure modes a scripted call can simulate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// The service rejects the prompt
    ContentFiltered,
    /// The service answers with finish reason `content_filter`
    FilteredCompletion,
    Timeout,
    Network,
    /// HTTP 503
    Unavailable,
    /// HTTP 429 asking the caller to wait this many milliseconds
    RateLimited(u64),
    /// Never answers
    Hang,
}

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<ScriptedReply>,
    fallback: Option<ScriptedReply>,
}

impl Script {
    fn next(&mut self) -> Option<ScriptedReply> {
        self.queue.pop_front().or_else(|| self.fallback.clone())
    }
}

/// Deterministic provider for tests and benchmarks; not selectable from settings
#[derive(Debug)]
pub struct ScriptedProvider {
    model: String,
    selection: Mutex<Script>,
    termination: Mutex<Script>,
    agent: Mutex<Script>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            model: "scripted".to_string(),
            selection: Mutex::new(Script::default()),
            termination: Mutex::new(Script::default()),
            agent: Mutex::new(Script::default()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn script(&self, kind: ScriptKind) -> &Mutex<Script> {
        match kind {
            ScriptKind::Selection => &self.selection,
            ScriptKind::Termination => &self.termination,
            ScriptKind::Agent => &self.agent,
        }
    }

    /// Queue a reply for the given call kind
    pub fn push(self, kind: ScriptKind, reply: ScriptedReply) -> Self {
        self.script(kind).lock().queue.push_back(reply);
        self
    }

    /// Reply repeated for `kind` once its queue is empty
    pub fn fallback(self, kind: ScriptKind, reply: ScriptedReply) -> Self {
        self.script(kind).lock().fallback = Some(reply);
        self
    }

    /// Queue a selection decision naming `agent`
    pub fn select(self, agent: &str, reason: &str) -> Self {
        self.push(ScriptKind::Selection, selection_reply(agent, reason))
    }

    /// Queue a termination decision
    pub fn keep_going(self, should_continue: bool, reason: &str) -> Self {
        self.push(ScriptKind::Termination, termination_reply(should_continue, reason))
    }

    /// Queue an agent text reply
    pub fn reply(self, text: &str) -> Self {
        self.push(ScriptKind::Agent, ScriptedReply::Text(text.to_string()))
    }

    /// Queue an agent tool-call request
    pub fn call_tools(self, calls: Vec<ToolCall>) -> Self {
        self.push(ScriptKind::Agent, ScriptedReply::ToolCalls(calls))
    }

    /// Queue a failure for the given call kind
    pub fn fail(self, kind: ScriptKind, failure: ScriptedFailure) -> Self {
        self.push(kind, ScriptedReply::Fail(failure))
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Requests of one kind, in arrival order
    pub fn requests_of(&self, kind: ScriptKind) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| ScriptKind::of(r) == kind)
            .cloned()
            .collect()
    }

    /// Replies still queued for `kind`
    pub fn remaining(&self, kind: ScriptKind) -> usize {
        self.script(kind).lock().queue.len()
    }
}

/// Selection decision payload
pub fn selection_reply(agent: &str, reason: &str) -> ScriptedReply {
    ScriptedReply::Json(json!({ "AgentName": agent, "Reason": reason }))
}

/// Termination decision payload
pub fn termination_reply(should_continue: bool, reason: &str) -> ScriptedReply {
    ScriptedReply::Json(json!({ "ShouldContinue": should_continue, "Reason": reason }))
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        let kind = ScriptKind::of(&request);
        self.requests.lock().push(request);

        // Lock is released before any await below
        let reply = self.script(kind).lock().next();
        let reply = reply.ok_or_else(|| {
            LlmError::InvalidRequest(format!("no scripted reply left for {:?} call", kind))
        })?;

        let (message, finish_reason) = match reply {
            ScriptedReply::Json(value) => (ChatMessage::assistant(value.to_string()), FinishReason::Stop),
            ScriptedReply::Text(text) => (ChatMessage::assistant(text), FinishReason::Stop),
            ScriptedReply::ToolCalls(calls) => (
                ChatMessage::assistant_with_tools(String::new(), calls),
                FinishReason::ToolCalls,
            ),
            ScriptedReply::Fail(failure) => match failure {
                ScriptedFailure::ContentFiltered => return Err(LlmError::ContentFiltered),
                ScriptedFailure::FilteredCompletion => {
                    (ChatMessage::assistant(String::new()), FinishReason::ContentFilter)
                }
                ScriptedFailure::Timeout => return Err(LlmError::Timeout),
                ScriptedFailure::Network => {
                    return Err(LlmError::Network("connection reset by peer".to_string()))
                }
                ScriptedFailure::Unavailable => {
                    return Err(LlmError::Api {
                        status: 503,
                        message: "service unavailable".to_string(),
                    })
                }
                ScriptedFailure::RateLimited(retry_after_ms) => {
                    return Err(LlmError::RateLimited { retry_after_ms })
                }
                ScriptedFailure::Hang => std::future::pending().await,
            },
        };

        Ok(CompletionResponse {
            message,
            finish_reason,
            usage: None,
        })
    }
}
