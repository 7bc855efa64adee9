//! Error types for the dispatch engine

use thiserror::Error;

/// Errors that can surface from the orchestration engine
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A structured decision payload did not match its schema
    #[error("Schema parse error: {0}")]
    SchemaParse(String),

    /// The completion service refused the request on policy grounds
    #[error("Content filtered by safety system")]
    ContentFiltered,

    /// Network, timeout or service-unavailable failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The selector named an agent that is not registered
    #[error("Unknown agent selected: {0}")]
    UnknownAgentSelected(String),

    /// A tool invocation failed
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// Agent lookup by name failed
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Duplicate or malformed agent/tool registration
    #[error("Registry error: {0}")]
    Registry(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The surrounding request was cancelled
    #[error("Operation was cancelled")]
    Cancelled,

    /// The completion service could not be reached on any attempt
    #[error("Completion service unreachable after {attempts} attempt(s): {message}")]
    Unreachable { attempts: u32, message: String },
}

/// Failure of a single structured decision call
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("Decision payload did not match schema: {0}")]
    SchemaParse(String),

    #[error("Content filtered by safety system")]
    ContentFiltered,

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors specific to completion service operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// API error
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limited
    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Content filtered
    #[error("Content filtered by safety system")]
    ContentFiltered,

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Timeout
    #[error("Request timed out")]
    Timeout,
}

impl LlmError {
    /// Whether the same request may succeed if sent again
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Network(_) | LlmError::Timeout | LlmError::RateLimited { .. } => true,
            LlmError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::Network(format!("Connection error: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for DecisionError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::ContentFiltered => DecisionError::ContentFiltered,
            LlmError::Parse(msg) => DecisionError::SchemaParse(msg),
            other => DecisionError::Transport(other.to_string()),
        }
    }
}

impl From<DecisionError> for DispatchError {
    fn from(err: DecisionError) -> Self {
        match err {
            DecisionError::SchemaParse(msg) => DispatchError::SchemaParse(msg),
            DecisionError::ContentFiltered => DispatchError::ContentFiltered,
            DecisionError::Transport(msg) => DispatchError::Transport(msg),
        }
    }
}

impl From<LlmError> for DispatchError {
    fn from(err: LlmError) -> Self {
        DecisionError::from(err).into()
    }
}

/// Result type alias for engine operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type alias for completion service operations
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Timeout.is_transient());
        assert!(LlmError::Network("reset".into()).is_transient());
        assert!(LlmError::Api { status: 503, message: String::new() }.is_transient());
        assert!(!LlmError::Api { status: 400, message: String::new() }.is_transient());
        assert!(!LlmError::ContentFiltered.is_transient());
        assert!(!LlmError::Authentication("bad key".into()).is_transient());
    }

    #[test]
    fn test_decision_error_from_llm_error() {
        assert!(matches!(
            DecisionError::from(LlmError::ContentFiltered),
            DecisionError::ContentFiltered
        ));
        assert!(matches!(
            DecisionError::from(LlmError::Parse("bad json".into())),
            DecisionError::SchemaParse(_)
        ));
        assert!(matches!(
            DecisionError::from(LlmError::Timeout),
            DecisionError::Transport(_)
        ));
    }
}
