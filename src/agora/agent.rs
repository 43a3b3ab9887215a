//! Autonomous meeting participants.
//!
//! An [`Agent`] owns its role configuration, its [`ToolBelt`] and its
//! [`TurnStats`]. The meeting hands it the drained inbox once per turn through
//! [`Agent::take_turn`]; the agent builds a prompt, calls its
//! [`ClientWrapper`], runs any tools the model asks for, and returns at most
//! one [`MessageDraft`] for the meeting to publish.
//!
//! ```text
//! take_turn(inbox)
//!   ├─ prompt = persona + rules + tools + public history + inbox
//!   ├─ loop
//!   │    ├─ generate            (per-call timeout)
//!   │    ├─ tool request?  ──►  ToolBelt::invoke (per-call timeout), feed result back
//!   │    └─ utterance      ──►  break
//!   ├─ @agent_id addressing, reply_to
//!   └─ intent classification ──► message type
//! ```
//!
//! Every failure (generation error or timeout, tool error, loop cap) ends the
//! turn as a no-op carrying a [`TurnError`]; nothing escapes to the meeting.

use crate::agora::client_wrapper::{
    CapabilityUnavailableError, ClientWrapper, Generation, GenerationRequest, PromptMessage, Role,
    StructuredCall,
};
use crate::agora::config::{MeetingConfig, RoleConfig, RoleDescriptor};
use crate::agora::decision::MessageIntent;
use crate::agora::decision_extractor::{balanced_objects, DecisionExtractor, ExtractionInput};
use crate::agora::event::{AgentEvent, EventHandler};
use crate::agora::message::{Message, MessageDraft, MessageType, Recipient};
use crate::agora::tool_protocol::{Tool, ToolBelt, ToolInvocationError};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    static ref ADDRESS_PREFIX: Regex = Regex::new(r"^\s*@([A-Za-z0-9_-]+)\s*[:,]?\s*").unwrap();
}

/// Metadata key holding the JSON of a non-tool structured call.
pub const META_STRUCTURED_CALL: &str = "structured_call";
/// Metadata key holding the provenance of the intent classification.
pub const META_INTENT_PROVENANCE: &str = "intent_provenance";
/// Metadata key holding the comma-separated tools used this turn.
pub const META_TOOLS: &str = "tools";
/// Metadata key holding the meeting turn that produced the message.
pub const META_TURN: &str = "turn";

/// Counters mutated only by the agent's own turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnStats {
    pub messages_sent: usize,
    pub tool_calls_made: usize,
}

/// Read-only view of the meeting handed to an agent for one turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub topic: &'a str,
    /// 1-based number of the turn being taken.
    pub turn: usize,
    /// Tail of the public transcript.
    pub public_history: &'a [Message],
    /// Every participant id, including this agent's.
    pub roster: &'a [String],
    pub config: &'a MeetingConfig,
}

/// A tool call performed during a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationRecord {
    pub tool_name: String,
    pub arguments: JsonValue,
    pub output: JsonValue,
}

/// Why a turn produced nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnError {
    Generation(CapabilityUnavailableError),
    Tool(ToolInvocationError),
    ToolLoopExhausted { max_iterations: usize },
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::Generation(e) => write!(f, "{}", e),
            TurnError::Tool(e) => write!(f, "{}", e),
            TurnError::ToolLoopExhausted { max_iterations } => write!(
                f,
                "tool loop exceeded {} invocation(s) in one turn",
                max_iterations
            ),
        }
    }
}

impl Error for TurnError {}

/// Result of one turn.
#[derive(Debug, Default)]
pub struct TurnOutcome {
    /// The utterance to publish, if any.
    pub message: Option<MessageDraft>,
    /// Tools that ran successfully this turn, in order.
    pub tool_invocations: Vec<ToolInvocationRecord>,
    /// ToolCall/ToolResult drafts, when the agent publishes tool transcripts.
    pub transcript: Vec<MessageDraft>,
    pub error: Option<TurnError>,
}

impl TurnOutcome {
    pub fn is_noop(&self) -> bool {
        self.message.is_none()
    }
}

/// A tool request recognized in a model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub parameters: JsonValue,
}

enum Step {
    /// Tool to run, plus the response text to echo back as the assistant turn.
    Tool(ToolCall, String),
    Utterance(String, Option<StructuredCall>),
}

/// A meeting participant with a persona, a tool belt and a generation client.
pub struct Agent {
    /// Stable identifier, unique within a meeting.
    pub id: String,
    /// Human-readable display name for prompts and lifecycle events.
    pub name: String,
    pub role: RoleConfig,
    /// Arbitrary metadata associated with the agent (e.g. desk, region).
    pub metadata: HashMap<String, String>,
    client: Arc<dyn ClientWrapper>,
    tools: ToolBelt,
    stats: TurnStats,
    tool_transcripts: bool,
    intent_extractor: DecisionExtractor<MessageIntent>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: RoleConfig::default(),
            metadata: HashMap::new(),
            client,
            tools: ToolBelt::new(),
            stats: TurnStats::default(),
            tool_transcripts: false,
            intent_extractor: DecisionExtractor::intent(),
            event_handler: None,
        }
    }

    /// Build an agent from a roster entry.
    pub fn from_descriptor(descriptor: &RoleDescriptor, client: Arc<dyn ClientWrapper>) -> Self {
        Agent::new(&descriptor.id, descriptor.display_name(), client)
            .with_role(descriptor.role_config())
            .with_tool_transcripts(descriptor.tool_transcripts)
    }

    pub fn with_role(mut self, role: RoleConfig) -> Self {
        self.role = role;
        self
    }

    /// Base system prompt for the agent.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.role.persona = persona.into();
        self
    }

    /// Attach a brief description of the agent's domain expertise.
    pub fn with_expertise(mut self, expertise: impl Into<String>) -> Self {
        self.role.expertise = Some(expertise.into());
        self
    }

    /// Attach a personality descriptor used to diversify prompts.
    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.role.personality = Some(personality.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_tools(mut self, tools: ToolBelt) -> Self {
        self.tools = tools;
        self
    }

    /// Publish ToolCall/ToolResult broadcasts for each successful invocation.
    pub fn with_tool_transcripts(mut self, enabled: bool) -> Self {
        self.tool_transcripts = enabled;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn set_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.event_handler = Some(handler);
    }

    pub fn tools(&self) -> &ToolBelt {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolBelt {
        &mut self.tools
    }

    pub fn stats(&self) -> TurnStats {
        self.stats
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_agent_event(&event).await;
        }
    }

    /// Generate the system prompt augmented with the agent's expertise and personality.
    fn augment_system_prompt(&self, base_prompt: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!("You are {}.\n", self.name));

        if let Some(expertise) = &self.role.expertise {
            prompt.push_str(&format!("Your expertise: {}\n", expertise));
        }

        if let Some(personality) = &self.role.personality {
            prompt.push_str(&format!("Your approach: {}\n", personality));
        }

        prompt.push('\n');
        prompt.push_str(base_prompt);

        prompt
    }

    fn system_prompt(&self, ctx: &TurnContext<'_>) -> String {
        let mut prompt = self.augment_system_prompt(&self.role.persona);

        let others: Vec<&str> = ctx
            .roster
            .iter()
            .map(|s| s.as_str())
            .filter(|id| *id != self.id)
            .collect();
        prompt.push_str(&format!(
            "\n\nYou are \"{}\" in a meeting about: {}\n",
            self.id, ctx.topic
        ));
        if !others.is_empty() {
            prompt.push_str(&format!("Other participants: {}\n", others.join(", ")));
        }
        prompt.push_str(
            "Speak once per turn. To address one participant, start your reply with @their_id. \
             Say \"privately\" to keep an addressed reply out of the public record.\n",
        );

        if !self.tools.is_empty() {
            prompt.push_str("\nYou have access to the following tools:\n");
            for metadata in self.tools.schemas() {
                prompt.push_str(&metadata.prompt_line());
                prompt.push('\n');
            }
            prompt.push_str(
                "\nTo use a tool, respond with a JSON object in the following format:\n\
                 {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}\n\
                 After tool execution, I'll provide the result and you can continue.\n",
            );
        }

        prompt
    }

    fn user_prompt(&self, inbox: &[Message], ctx: &TurnContext<'_>) -> String {
        let mut prompt = String::new();

        let window = ctx.config.history_window;
        let start = ctx.public_history.len().saturating_sub(window);
        let history = &ctx.public_history[start..];
        if !history.is_empty() {
            prompt.push_str("Recent discussion:\n");
            for m in history {
                prompt.push_str(&m.render());
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        prompt.push_str("New messages for you:\n");
        if inbox.is_empty() {
            prompt.push_str("(none)\n");
        } else {
            for m in inbox {
                prompt.push_str(&m.render());
                prompt.push('\n');
            }
        }

        prompt.push_str(&format!(
            "\nTurn {}. Give your next contribution.",
            ctx.turn
        ));
        prompt
    }

    async fn generate(
        &self,
        request: GenerationRequest,
        limit: Duration,
    ) -> Result<Generation, CapabilityUnavailableError> {
        match tokio::time::timeout(limit, self.client.generate(request)).await {
            Ok(result) => result.map_err(|e| {
                log::error!(
                    "agent '{}' generation failed on {}: {}",
                    self.id,
                    self.client.model_name(),
                    e
                );
                CapabilityUnavailableError::new("generation", e.to_string())
            }),
            Err(_) => Err(CapabilityUnavailableError::new(
                "generation",
                format!("timed out after {}ms", limit.as_millis()),
            )),
        }
    }

    /// Take one turn. `inbox` is this agent's drained queue.
    pub async fn take_turn(&mut self, inbox: Vec<Message>, ctx: &TurnContext<'_>) -> TurnOutcome {
        let mut outcome = TurnOutcome::default();
        let max_tool_iterations = ctx.config.max_tool_iterations;

        let mut messages = vec![
            PromptMessage::new(Role::System, self.system_prompt(ctx)),
            PromptMessage::new(Role::User, self.user_prompt(&inbox, ctx)),
        ];
        let tool_schemas = self.tools.schemas();

        let mut iteration = 0;
        let mut tool_iteration = 0;

        let (text, structured) = loop {
            iteration += 1;

            self.emit(AgentEvent::GenerationStarted {
                agent_id: self.id.clone(),
                agent_name: self.name.clone(),
                iteration,
            })
            .await;

            let request = GenerationRequest {
                messages: messages.clone(),
                tools: tool_schemas.clone(),
                temperature: self.role.temperature,
                max_tokens: self.role.max_tokens,
            };

            let generation = match self.generate(request, ctx.config.generation_timeout).await {
                Ok(generation) => generation,
                Err(e) => {
                    log::warn!("agent '{}' turn {}: {}", self.id, ctx.turn, e);
                    return self.finish_failed(outcome, TurnError::Generation(e));
                }
            };

            self.emit(AgentEvent::GenerationCompleted {
                agent_id: self.id.clone(),
                agent_name: self.name.clone(),
                iteration,
                response_length: match &generation {
                    Generation::Text(t) => t.len(),
                    Generation::ToolCall(_) => 0,
                },
            })
            .await;

            let (tool_call, request_echo) = match self.classify(generation) {
                Step::Utterance(text, structured) => break (text, structured),
                Step::Tool(call, echo) => (call, echo),
            };

            if tool_iteration >= max_tool_iterations {
                self.emit(AgentEvent::ToolMaxIterationsReached {
                    agent_id: self.id.clone(),
                    agent_name: self.name.clone(),
                    max_iterations: max_tool_iterations,
                })
                .await;
                log::warn!(
                    "agent '{}' turn {}: tool loop exhausted",
                    self.id,
                    ctx.turn
                );
                return self.finish_failed(
                    outcome,
                    TurnError::ToolLoopExhausted {
                        max_iterations: max_tool_iterations,
                    },
                );
            }

            tool_iteration += 1;
            self.stats.tool_calls_made += 1;

            self.emit(AgentEvent::ToolCallDetected {
                agent_id: self.id.clone(),
                agent_name: self.name.clone(),
                tool_name: tool_call.name.clone(),
                parameters: tool_call.parameters.clone(),
                iteration: tool_iteration,
            })
            .await;

            let result = self
                .tools
                .invoke_within(
                    &tool_call.name,
                    tool_call.parameters.clone(),
                    Some(ctx.config.tool_timeout),
                )
                .await;

            self.emit(AgentEvent::ToolExecutionCompleted {
                agent_id: self.id.clone(),
                agent_name: self.name.clone(),
                tool_name: tool_call.name.clone(),
                parameters: tool_call.parameters.clone(),
                success: result.is_ok(),
                error: result.as_ref().err().map(|e| e.to_string()),
                iteration: tool_iteration,
            })
            .await;

            match result {
                Ok(result) => {
                    let rendered = serde_json::to_string_pretty(&result.output)
                        .unwrap_or_else(|_| result.output.to_string());
                    messages.push(PromptMessage::new(Role::Assistant, request_echo));
                    messages.push(PromptMessage::new(
                        Role::User,
                        format!(
                            "Tool '{}' executed successfully. Result: {}",
                            tool_call.name, rendered
                        ),
                    ));
                    outcome.tool_invocations.push(ToolInvocationRecord {
                        tool_name: tool_call.name,
                        arguments: tool_call.parameters,
                        output: result.output,
                    });
                }
                Err(e) => {
                    log::warn!("agent '{}' turn {}: {}", self.id, ctx.turn, e);
                    return self.finish_failed(outcome, TurnError::Tool(e));
                }
            }
        };

        outcome.message = self.compose_utterance(&text, structured.as_ref(), &inbox, &outcome, ctx);
        if outcome.message.is_some() {
            self.stats.messages_sent += 1;
        } else {
            log::debug!("agent '{}' turn {}: empty utterance", self.id, ctx.turn);
        }
        self.attach_transcript(&mut outcome);
        outcome
    }

    /// Decide whether a generation is a tool request or the final utterance.
    fn classify(&self, generation: Generation) -> Step {
        match generation {
            Generation::ToolCall(call) if self.tools.contains(&call.name) => {
                let echo = tool_call_json(&call.name, &call.arguments);
                Step::Tool(
                    ToolCall {
                        name: call.name,
                        parameters: call.arguments,
                    },
                    echo,
                )
            }
            // Not a tool: a decision payload kept for synthesis.
            Generation::ToolCall(call) => {
                Step::Utterance(structured_call_content(&call), Some(call))
            }
            Generation::Text(text) => match self.parse_tool_call(&text) {
                Some(call) => Step::Tool(call, text),
                None => Step::Utterance(text, None),
            },
        }
    }

    fn finish_failed(&self, mut outcome: TurnOutcome, error: TurnError) -> TurnOutcome {
        outcome.error = Some(error);
        self.attach_transcript(&mut outcome);
        outcome
    }

    fn attach_transcript(&self, outcome: &mut TurnOutcome) {
        if !self.tool_transcripts {
            return;
        }
        for record in &outcome.tool_invocations {
            outcome.transcript.push(
                MessageDraft::broadcast(
                    &self.id,
                    format!("{}({})", record.tool_name, record.arguments),
                )
                .with_type(MessageType::ToolCall),
            );
            outcome.transcript.push(
                MessageDraft::broadcast(&self.id, record.output.to_string())
                    .with_type(MessageType::ToolResult)
                    .with_metadata(META_TOOLS, record.tool_name.clone()),
            );
        }
    }

    /// Turn the final utterance into a draft: addressing, reply_to, type.
    fn compose_utterance(
        &self,
        text: &str,
        structured: Option<&StructuredCall>,
        inbox: &[Message],
        outcome: &TurnOutcome,
        ctx: &TurnContext<'_>,
    ) -> Option<MessageDraft> {
        let text = text.trim();
        if text.is_empty() && structured.is_none() {
            return None;
        }

        let (addressee, body) = split_addressee(text, &self.id);
        let addressed = addressee.is_some();

        let intent = self.intent_extractor.extract(&ExtractionInput::text(body));
        let default_type = if addressed {
            MessageType::Direct
        } else {
            MessageType::Broadcast
        };
        let message_type = if intent.confidence >= ctx.config.intent_confidence_threshold {
            intent.kind.message_type(addressed).unwrap_or(default_type)
        } else {
            default_type
        };

        let reply_to = match &addressee {
            Some(target) => inbox
                .iter()
                .rev()
                .find(|m| m.sender_id() == target)
                .or_else(|| inbox.last()),
            None => inbox.last(),
        }
        .map(|m| m.id().to_string());

        let recipient = match addressee {
            Some(target) => Recipient::Agent(target),
            None => Recipient::Broadcast,
        };

        let mut draft = MessageDraft {
            sender_id: self.id.clone(),
            recipient,
            content: body.to_string(),
            message_type,
            metadata: HashMap::new(),
            reply_to,
        }
        .with_metadata(META_INTENT_PROVENANCE, intent.provenance.as_str())
        .with_metadata(META_TURN, ctx.turn.to_string());

        if !outcome.tool_invocations.is_empty() {
            let names: Vec<&str> = outcome
                .tool_invocations
                .iter()
                .map(|r| r.tool_name.as_str())
                .collect();
            draft = draft.with_metadata(META_TOOLS, names.join(","));
        }
        if let Some(call) = structured {
            if let Ok(json) = serde_json::to_string(call) {
                draft = draft.with_metadata(META_STRUCTURED_CALL, json);
            }
        }

        Some(draft)
    }

    /// Find an embedded `{"tool_call": {"name": ..., "parameters": ...}}`
    /// naming a tool in this agent's belt.
    fn parse_tool_call(&self, response: &str) -> Option<ToolCall> {
        for candidate in balanced_objects(response) {
            if !candidate.text.contains("\"tool_call\"") {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<JsonValue>(candidate.text) else {
                continue;
            };
            let Some(call) = parsed.get("tool_call") else {
                continue;
            };
            if let Some(name) = call.get("name").and_then(|v| v.as_str()) {
                if self.tools.contains(name) {
                    return Some(ToolCall {
                        name: name.to_string(),
                        parameters: call.get("parameters").cloned().unwrap_or(JsonValue::Null),
                    });
                }
            }
        }
        None
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tools", &self.tools)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Split a leading `@agent_id` off an utterance. Addressing oneself is
/// ignored.
fn split_addressee<'a>(text: &'a str, self_id: &str) -> (Option<String>, &'a str) {
    if let Some(caps) = ADDRESS_PREFIX.captures(text) {
        if let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) {
            if id.as_str() != self_id {
                let body = text[whole.end()..].trim();
                let body = if body.is_empty() { text } else { body };
                return (Some(id.as_str().to_string()), body);
            }
        }
    }
    (None, text)
}

fn tool_call_json(name: &str, arguments: &JsonValue) -> String {
    serde_json::json!({"tool_call": {"name": name, "parameters": arguments}}).to_string()
}

/// Content for a message whose substance is a structured (non-tool) call.
fn structured_call_content(call: &StructuredCall) -> String {
    call.arguments
        .get("reasoning")
        .and_then(|r| r.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("{} {}", call.name, call.arguments))
}
