//! Domain types for the dispatch engine
//!
//! Core abstractions shared by the registry, the decision strategies and the
//! orchestration loop.

mod agent;
mod debug_log;
mod decision;
mod message;
mod tool_call;

pub use agent::*;
pub use debug_log::*;
pub use decision::*;
pub use message::*;
pub use tool_call::*;
