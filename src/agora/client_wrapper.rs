use crate::agora::decision::Decision;
use crate::agora::tool_protocol::ToolMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::fmt;

// A ClientWrapper is the generative-reasoning capability behind an agent.
// It does not keep the conversation: every call receives the full prompt the
// agent built for this turn. Implementations wrap a concrete model service;
// tests use scripted in-memory clients.

/// Represents the possible roles for a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    // persona and rules for the turn
    System,
    // the conversation so far, rendered by the agent
    User,
    // a previous response of this agent within the same turn
    Assistant,
}

/// One prompt entry sent to the capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Everything the capability needs to produce one response.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<PromptMessage>,
    /// Tool schemas the model may ask for.
    pub tools: Vec<ToolMetadata>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

/// A native structured invocation returned by the capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredCall {
    pub name: String,
    pub arguments: JsonValue,
}

/// What the capability produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    Text(String),
    ToolCall(StructuredCall),
}

/// Trait defining the interface to the generation service.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Produce either an utterance or a structured call for `request`.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<Generation, Box<dyn Error + Send + Sync>>;

    /// Identifier used in logs.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Outcome reported by an execution venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub message: String,
}

/// Venue-side execution of a synthesized decision.
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    async fn execute(
        &self,
        decision: &Decision,
    ) -> Result<ExecutionReport, Box<dyn Error + Send + Sync>>;
}

/// An external capability (generation or venue) failed or timed out.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityUnavailableError {
    pub capability: String,
    pub reason: String,
}

impl CapabilityUnavailableError {
    pub fn new(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CapabilityUnavailableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unavailable: {}", self.capability, self.reason)
    }
}

impl Error for CapabilityUnavailableError {}
