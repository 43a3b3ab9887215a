//! # Agora
//!
//! Agora runs turn-based discussions between LLM-backed agents and turns the
//! conversation into one validated trading [`Decision`].
//!
//! The crate is layered:
//!
//! * **Message bus**: [`bus::MessageBus`] gives every agent its own FIFO queue,
//!   routes broadcast and addressed messages, keeps the authoritative history
//!   and notifies observers in publish order.
//! * **Agents**: [`Agent`] owns a persona, a [`tool_protocol::ToolBelt`] and a
//!   [`ClientWrapper`]. Each turn it builds a prompt from its inbox, runs any
//!   tools the model asks for and produces at most one message.
//! * **Tools**: local closures (sync or async) and remote JSON-RPC procedures
//!   behind one [`tool_protocol::Tool`] type, with schema validation and
//!   per-call timeouts.
//! * **Decision extraction**: [`decision_extractor::DecisionExtractor`] tries a
//!   structured payload, then a delimited JSON block, then lexical salvage,
//!   and always returns a sanitized record.
//! * **Meetings**: [`Meeting`] drives the round-robin, evaluates the
//!   [`termination::TerminationPolicy`], synthesizes the final decision and
//!   optionally hands it to an execution venue.
//!
//! LLM providers are not bundled. Implement [`ClientWrapper`] for the one you
//! use.
//!
//! ## A complete meeting
//!
//! ```rust,no_run
//! use agora::client_wrapper::{ClientWrapper, Generation, GenerationRequest};
//! use agora::termination::TerminationPolicy;
//! use agora::{Agent, Meeting};
//! use async_trait::async_trait;
//! use std::error::Error;
//! use std::sync::Arc;
//!
//! struct Canned(&'static str);
//!
//! #[async_trait]
//! impl ClientWrapper for Canned {
//!     async fn generate(
//!         &self,
//!         _request: GenerationRequest,
//!     ) -> Result<Generation, Box<dyn Error + Send + Sync>> {
//!         Ok(Generation::Text(self.0.to_string()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn Error>> {
//!     agora::init_logger();
//!
//!     let mut meeting = Meeting::new("BTC this week?", TerminationPolicy::new().with_max_turns(4))
//!         .with_leader("pm");
//!     let pm = Canned("Go long 5% with 3x leverage.");
//!     meeting.add_agent(Agent::new("pm", "PM", Arc::new(pm)))?;
//!     meeting.add_agent(Agent::new("risk", "Risk", Arc::new(Canned("I agree, keep it small."))))?;
//!
//!     let summary = meeting.run().await?;
//!     println!("{}", serde_json::to_string_pretty(&summary)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! Every module logs through the [`log`] facade. Call [`init_logger`] once to
//! install [`env_logger`] and control verbosity with `RUST_LOG`, for example
//! `RUST_LOG=agora=debug`.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// ```rust
/// agora::init_logger();
/// agora::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `agora` module.
pub mod agora;

// Re-exporting key items for easier external access.
pub use agora::agent;
pub use agora::agent::Agent;
pub use agora::bus;
pub use agora::bus::MessageBus;
pub use agora::client_wrapper;
pub use agora::client_wrapper::ClientWrapper;
pub use agora::config;
pub use agora::decision;
pub use agora::decision::Decision;
pub use agora::decision_extractor;
pub use agora::event;
pub use agora::event::{AgentEvent, EventHandler, LifecycleEvent};
pub use agora::meeting;
pub use agora::message;
pub use agora::message::Message;
pub use agora::termination;
pub use agora::tool_protocol;
pub use agora::tool_protocols;
pub use agora::{Meeting, MeetingError, MeetingSummary};
