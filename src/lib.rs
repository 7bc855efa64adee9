//! # Metis Dispatch - multi-agent dispatch engine
//!
//! Routes a user's conversational turn through a small team of
//! instruction-bound agents. A completion service decides, turn by turn,
//! which agent speaks next and when the turn is complete; a hard iteration
//! ceiling bounds every turn regardless of what the model says.
//!
//! ## Features
//!
//! - **Schema-constrained decisions**: selection and termination answers are
//!   parsed from JSON-schema responses
//! - **Layered fallbacks**: unknown agents, content-filter rejections and
//!   transport errors never surface to the user as a failed turn
//! - **Tool calling**: statically declared tool table with per-agent visibility
//! - **Monitoring**: per-session analytics, bounded event history and
//!   Prometheus metrics
//! - **Validation**: every configuration problem reported at once
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use metis_dispatch::agents::llm::create_provider;
//! use metis_dispatch::agents::{DispatchHandler, TurnRequest};
//! use metis_dispatch::config::Settings;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::new()?;
//!     let provider = create_provider(&settings.llm)?;
//!     let handler = DispatchHandler::from_settings(&settings, provider)?;
//!
//!     let request = TurnRequest {
//!         session_id: "session-1".to_string(),
//!         tenant_id: "tenant".to_string(),
//!         user_id: "user".to_string(),
//!         history: Vec::new(),
//!         user_prompt: "I want to transfer $500".to_string(),
//!     };
//!     let (messages, debug_logs) = handler.get_response(request, CancellationToken::new()).await;
//!     println!("{} messages, {} debug logs", messages.len(), debug_logs.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! - **agents**: the engine (registry, context, decisions, loop, monitor)
//! - **config**: settings loading and validation
//! - **cli**: arguments for the `metis-dispatch` binary

pub mod agents;
pub mod cli;
pub mod config;
