//! Configuration for meetings and the agents in them.
//!
//! Plain structs with defaults. Callers construct them however they want; no
//! config-file format is imposed. [`RoleDescriptor`] derives `Deserialize` so a
//! roster can be kept in JSON by the embedding application.
//!
//! # Example
//!
//! ```rust
//! use agora::config::{MeetingConfig, RoleDescriptor};
//! use std::time::Duration;
//!
//! let config = MeetingConfig {
//!     require_stimulus: true,
//!     generation_timeout: Duration::from_secs(20),
//!     ..MeetingConfig::default()
//! };
//! assert_eq!(config.max_tool_iterations, 3);
//!
//! let roster: Vec<RoleDescriptor> = serde_json::from_str(r#"[
//!     {"id": "analyst", "persona": "You read charts.", "expertise": "Technical analysis"},
//!     {"id": "risk", "name": "Risk Officer", "persona": "You size positions.", "temperature": 0.2}
//! ]"#).unwrap();
//! assert_eq!(roster[0].display_name(), "analyst");
//! assert_eq!(roster[1].role_config().temperature, Some(0.2));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Knobs shared by every turn of a meeting.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingConfig {
    /// Upper bound on each generation round-trip.
    pub generation_timeout: Duration,
    /// Upper bound on each tool invocation.
    pub tool_timeout: Duration,
    /// Upper bound on the execution venue call after synthesis.
    pub execution_timeout: Duration,
    /// Tools an agent may invoke in a single turn.
    pub max_tool_iterations: usize,
    /// Minimum intent confidence needed to override the default message type.
    pub intent_confidence_threshold: f64,
    /// Skip agents whose queue is empty.
    pub require_stimulus: bool,
    /// Public history messages shown to an agent in its prompt.
    pub history_window: usize,
    /// Salvaged (lexical/default) decisions above this size are not executed.
    pub salvaged_magnitude_limit: f64,
}

impl MeetingConfig {
    /// Zero timeouts would fail every call before it starts.
    pub fn validate(&self) -> Result<(), String> {
        for (name, limit) in [
            ("generation_timeout", self.generation_timeout),
            ("tool_timeout", self.tool_timeout),
            ("execution_timeout", self.execution_timeout),
        ] {
            if limit.is_zero() {
                return Err(format!("{} must be greater than zero", name));
            }
        }
        Ok(())
    }
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
            execution_timeout: Duration::from_secs(30),
            max_tool_iterations: 3,
            intent_confidence_threshold: 0.6,
            require_stimulus: false,
            history_window: 20,
            salvaged_magnitude_limit: 10.0,
        }
    }
}

/// Persona and generation parameters of one agent. Opaque to the meeting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub persona: String,
    #[serde(default)]
    pub expertise: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

impl RoleConfig {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            ..Self::default()
        }
    }
}

/// One entry of a meeting roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub persona: String,
    #[serde(default)]
    pub expertise: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    /// Publish ToolCall/ToolResult messages for this agent's invocations.
    #[serde(default)]
    pub tool_transcripts: bool,
}

impl RoleDescriptor {
    pub fn new(id: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            persona: persona.into(),
            expertise: None,
            personality: None,
            temperature: None,
            max_tokens: None,
            tool_transcripts: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_expertise(mut self, expertise: impl Into<String>) -> Self {
        self.expertise = Some(expertise.into());
        self
    }

    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality = Some(personality.into());
        self
    }

    /// `name` if given, otherwise `id`.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn role_config(&self) -> RoleConfig {
        RoleConfig {
            persona: self.persona.clone(),
            expertise: self.expertise.clone(),
            personality: self.personality.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}
