//! Multi-agent dispatch engine
//!
//! Routes a user turn through a team of instruction-bound agents, letting
//! the completion service decide who speaks next and when the turn is done.
//!
//! ## Architecture
//!
//! - `registry` - immutable agent definitions
//! - `context` - bounded, sanitized transcript rendering
//! - `decision` - schema-constrained decision calls
//! - `selection` / `termination` - decision strategies with fallbacks
//! - `executor` - agent turns with tool calling
//! - `orchestration` - the bounded select/execute/terminate loop
//! - `monitor` - event log, analytics and Prometheus metrics
//! - `llm` - completion service providers

pub mod config;
pub mod context;
pub mod decision;
pub mod domain;
pub mod error;
pub mod executor;
pub mod handler;
pub mod llm;
pub mod monitor;
pub mod orchestration;
pub mod registry;
pub mod selection;
pub mod summarize;
pub mod termination;
pub mod tools;

// Re-export commonly used types
pub use config::*;
pub use domain::*;
pub use error::*;
pub use handler::{DispatchHandler, TurnRequest, FAILURE_AUTHOR, FAILURE_MESSAGE};
pub use orchestration::{OrchestrationLoop, OrchestrationSession, StopReason, TurnOutcome};
pub use registry::AgentRegistry;
