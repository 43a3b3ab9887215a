//! Agent and meeting event system.
//!
//! Two event families flow through a single [`EventHandler`] trait:
//!
//! - [`LifecycleEvent`]: the externally visible stream (`started`, `thinking`,
//!   `message`, `completed`, `error`), one JSON object per event, suitable for
//!   forwarding to a dashboard transport.
//! - [`AgentEvent`]: fine-grained notifications from inside an agent's turn
//!   (generation round-trips, tool calls, iteration caps).
//!
//! Both handler methods default to no-ops, so implementors override only what
//! they need. The handler is shared as `Arc<dyn EventHandler>`; a meeting
//! propagates its handler to every agent it runs.
//!
//! # Example
//!
//! ```rust,no_run
//! use agora::event::{AgentEvent, EventHandler, LifecycleEvent};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_lifecycle_event(&self, event: &LifecycleEvent) {
//!         println!("{}", event.to_json());
//!     }
//!     async fn on_agent_event(&self, event: &AgentEvent) {
//!         if let AgentEvent::ToolCallDetected { agent_id, tool_name, .. } = event {
//!             println!("{} -> {}", agent_id, tool_name);
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEventType {
    Started,
    Thinking,
    Message,
    Completed,
    Error,
}

/// One entry of the lifecycle stream.
///
/// ```rust
/// use agora::event::{LifecycleEvent, LifecycleEventType};
///
/// let event = LifecycleEvent::new("analyst", LifecycleEventType::Thinking, "turn 2")
///     .with_progress(0.25);
/// let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
/// assert_eq!(json["event_type"], "thinking");
/// assert_eq!(json["progress"], 0.25);
/// assert!(json.get("data").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub agent_name: String,
    pub event_type: LifecycleEventType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(
        agent_name: impl Into<String>,
        event_type: LifecycleEventType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            event_type,
            message: message.into(),
            progress: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    /// Progress is clamped into `0..=1`.
    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(if progress.is_finite() {
            progress.clamp(0.0, 1.0)
        } else {
            0.0
        });
        self
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize as a single JSON object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "agent_name": self.agent_name,
                "event_type": "error",
                "message": format!("event serialization failed: {}", e),
                "timestamp": self.timestamp.to_rfc3339(),
            })
            .to_string()
        })
    }
}

/// Events emitted by an [`Agent`](crate::agent::Agent) during its turn.
///
/// ```text
/// GenerationStarted { iteration: 1 }
/// GenerationCompleted { iteration: 1 }
/// (if a tool was requested)
///   ├─ ToolCallDetected { iteration: 1 }
///   ├─ ToolExecutionCompleted { iteration: 1 }
///   ├─ GenerationStarted { iteration: 2 }
///   └─ GenerationCompleted { iteration: 2 }
/// (until an utterance or the iteration cap)
/// ```
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Before each round-trip to the generation capability. Iteration 1 is the
    /// initial call; later iterations follow tool results.
    GenerationStarted {
        agent_id: String,
        agent_name: String,
        iteration: usize,
    },

    GenerationCompleted {
        agent_id: String,
        agent_name: String,
        iteration: usize,
        /// Character length of a text response, or 0 for a structured call.
        response_length: usize,
    },

    /// A tool request was recognized in the response.
    ToolCallDetected {
        agent_id: String,
        agent_name: String,
        tool_name: String,
        parameters: JsonValue,
        iteration: usize,
    },

    /// A tool finished executing (success or failure).
    ToolExecutionCompleted {
        agent_id: String,
        agent_name: String,
        tool_name: String,
        parameters: JsonValue,
        success: bool,
        error: Option<String>,
        iteration: usize,
    },

    /// The tool loop hit `max_tool_iterations`; the turn becomes a no-op.
    ToolMaxIterationsReached {
        agent_id: String,
        agent_name: String,
        max_iterations: usize,
    },
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_agent_event(&self, _event: &AgentEvent) {}

    async fn on_lifecycle_event(&self, _event: &LifecycleEvent) {}
}

/// Writes every event to the `log` facade.
pub struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    async fn on_agent_event(&self, event: &AgentEvent) {
        log::trace!("{:?}", event);
    }

    async fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        match event.event_type {
            LifecycleEventType::Error => {
                log::error!("[{}] {}", event.agent_name, event.message)
            }
            LifecycleEventType::Thinking => {
                log::debug!("[{}] {}", event.agent_name, event.message)
            }
            _ => log::info!("[{}] {}", event.agent_name, event.message),
        }
    }
}

/// Forwards lifecycle events into a tokio channel, e.g. for a streaming
/// transport. Agent events are dropped.
pub struct ChannelEventHandler {
    sender: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelEventHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventHandler for ChannelEventHandler {
    async fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        let _ = self.sender.send(event.clone());
    }
}
