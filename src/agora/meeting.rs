//! Turn-based meeting orchestration.
//!
//! A [`Meeting`] owns one [`MessageBus`], the roster of [`Agent`]s and the
//! [`TerminationPolicy`]. [`Meeting::run`] drives it through an explicit state
//! machine:
//!
//! ```text
//! Pending ──► Running ──► Synthesizing ──► Completed
//!    │           │              │
//!    └───────────┴──────────────┴──► Aborted   (fatal configuration, cancellation)
//! ```
//!
//! While `Running`, agents take turns in registration order. Each turn drains
//! the agent's queue, calls [`Agent::take_turn`], publishes what it produced
//! and re-evaluates termination. With `require_stimulus`, agents with nothing
//! in their queue are skipped, and a full rotation with nobody eligible ends
//! the meeting as [`TerminationCause::Quiescent`].
//!
//! `Synthesizing` runs the [`DecisionExtractor`] once over the leader's last
//! substantive message, tallies the other agents' stances and, if an
//! [`ExecutionVenue`] is attached and the decision passes the risk gate,
//! executes it.
//!
//! # Example
//!
//! ```rust,no_run
//! use agora::agent::Agent;
//! use agora::client_wrapper::ClientWrapper;
//! use agora::meeting::Meeting;
//! use agora::termination::TerminationPolicy;
//! use std::sync::Arc;
//!
//! # async fn demo(client: Arc<dyn ClientWrapper>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut meeting = Meeting::new(
//!     "Should we open a BTC position this week?",
//!     TerminationPolicy::new().with_max_turns(9),
//! )
//! .with_leader("pm");
//!
//! meeting.add_agent(Agent::new("pm", "Portfolio Manager", client.clone()))?;
//! meeting.add_agent(Agent::new("analyst", "Analyst", client.clone()))?;
//! meeting.add_agent(Agent::new("risk", "Risk Officer", client))?;
//!
//! let summary = meeting.run().await?;
//! println!("{} after {} turns", summary.final_decision.direction, summary.total_turns);
//! # Ok(())
//! # }
//! ```

use crate::agora::agent::{
    Agent, TurnContext, TurnError, TurnOutcome, TurnStats, META_STRUCTURED_CALL,
};
use crate::agora::bus::MessageBus;
use crate::agora::client_wrapper::{
    CapabilityUnavailableError, ClientWrapper, ExecutionReport, ExecutionVenue, StructuredCall,
};
use crate::agora::config::{MeetingConfig, RoleDescriptor};
use crate::agora::decision::{Decision, Direction, Provenance};
use crate::agora::decision_extractor::{DecisionExtractor, ExtractionInput};
use crate::agora::event::{EventHandler, LifecycleEvent, LifecycleEventType};
use crate::agora::message::{Message, MessageDraft};
use crate::agora::termination::{TerminationCause, TerminationPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reserved sender id for messages published by the meeting itself.
pub const MODERATOR_ID: &str = "moderator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingPhase {
    Pending,
    Running,
    Synthesizing,
    Completed,
    Aborted,
}

impl fmt::Display for MeetingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MeetingPhase::Pending => "pending",
            MeetingPhase::Running => "running",
            MeetingPhase::Synthesizing => "synthesizing",
            MeetingPhase::Completed => "completed",
            MeetingPhase::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Errors returned by [`Meeting`] operations.
#[derive(Debug, Clone, PartialEq)]
pub enum MeetingError {
    /// The meeting cannot start as configured.
    FatalConfiguration(String),
    /// The meeting stopped without a summary.
    Aborted { reason: String, turn: usize },
    /// The operation is not allowed in the current phase.
    InvalidPhase(MeetingPhase),
}

impl fmt::Display for MeetingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeetingError::FatalConfiguration(msg) => {
                write!(f, "Fatal configuration error: {}", msg)
            }
            MeetingError::Aborted { reason, turn } => {
                write!(f, "Meeting aborted at turn {}: {}", turn, reason)
            }
            MeetingError::InvalidPhase(phase) => {
                write!(f, "Operation not allowed while meeting is {}", phase)
            }
        }
    }
}

impl Error for MeetingError {}

/// A per-turn failure that did not stop the meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub turn: usize,
    pub agent_id: String,
    /// `generation`, `tool`, `tool_loop`, `routing` or `execution`.
    pub kind: String,
    pub error: String,
}

/// What happened to the final decision at the execution venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Executed { success: bool, message: String },
    /// The risk gate declined to send the decision.
    Refused { reason: String },
    /// The venue was unavailable or timed out.
    Failed { reason: String },
}

/// Produced once, when a meeting completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingSummary {
    pub meeting_id: String,
    pub topic: String,
    pub started_at: DateTime<Utc>,
    pub total_turns: usize,
    pub total_messages: usize,
    pub total_duration_seconds: f64,
    pub termination_cause: TerminationCause,
    pub agent_stats: BTreeMap<String, TurnStats>,
    pub message_type_stats: BTreeMap<String, usize>,
    pub final_decision: Decision,
    pub stance_tally: BTreeMap<String, Direction>,
    pub incidents: Vec<Incident>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionOutcome>,
    pub conversation_history: Vec<Message>,
}

/// A turn-based discussion between a fixed roster of agents.
pub struct Meeting {
    id: String,
    topic: String,
    bus: Arc<MessageBus>,
    agents: HashMap<String, Agent>,
    agent_order: Vec<String>,
    leader: Option<String>,
    policy: TerminationPolicy,
    config: MeetingConfig,
    cancel: CancellationToken,
    event_handler: Option<Arc<dyn EventHandler>>,
    venue: Option<Arc<dyn ExecutionVenue>>,
    extractor: DecisionExtractor<Decision>,
    phase: MeetingPhase,
    turn: usize,
    started_at: Option<DateTime<Utc>>,
    incidents: Vec<Incident>,
    summary: Option<MeetingSummary>,
}

impl Meeting {
    pub fn new(topic: impl Into<String>, policy: TerminationPolicy) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let prefix: String = id.chars().take(8).collect();
        Self {
            bus: Arc::new(MessageBus::new(prefix)),
            id,
            topic: topic.into(),
            agents: HashMap::new(),
            agent_order: Vec::new(),
            leader: None,
            policy,
            config: MeetingConfig::default(),
            cancel: CancellationToken::new(),
            event_handler: None,
            venue: None,
            extractor: DecisionExtractor::final_decision(),
            phase: MeetingPhase::Pending,
            turn: 0,
            started_at: None,
            incidents: Vec::new(),
            summary: None,
        }
    }

    /// Assemble a meeting from a roster. `client_for` supplies each agent's
    /// generation client.
    pub fn from_descriptors<F>(
        topic: impl Into<String>,
        policy: TerminationPolicy,
        descriptors: &[RoleDescriptor],
        client_for: F,
    ) -> Result<Self, MeetingError>
    where
        F: Fn(&RoleDescriptor) -> Arc<dyn ClientWrapper>,
    {
        let mut meeting = Meeting::new(topic, policy);
        for descriptor in descriptors {
            meeting.add_agent(Agent::from_descriptor(descriptor, client_for(descriptor)))?;
        }
        Ok(meeting)
    }

    pub fn with_config(mut self, config: MeetingConfig) -> Self {
        self.config = config;
        self
    }

    /// The agent whose last message is synthesized into the final decision.
    /// Defaults to the first registered agent.
    pub fn with_leader(mut self, agent_id: impl Into<String>) -> Self {
        self.leader = Some(agent_id.into());
        self
    }

    /// Register a handler for lifecycle events. It is propagated to every
    /// agent, already added or added later.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        for agent in self.agents.values_mut() {
            agent.set_event_handler(Arc::clone(&handler));
        }
        self.event_handler = Some(handler);
        self
    }

    pub fn with_venue(mut self, venue: Arc<dyn ExecutionVenue>) -> Self {
        self.venue = Some(venue);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// A handle that aborts the meeting at its next turn boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Add an agent to the roster. Only allowed while `Pending`.
    pub fn add_agent(&mut self, mut agent: Agent) -> Result<(), MeetingError> {
        if self.phase != MeetingPhase::Pending {
            return Err(MeetingError::InvalidPhase(self.phase));
        }
        let id = agent.id.clone();
        if id == MODERATOR_ID {
            return Err(MeetingError::FatalConfiguration(format!(
                "agent id '{}' is reserved",
                MODERATOR_ID
            )));
        }
        if self.agents.contains_key(&id) {
            return Err(MeetingError::FatalConfiguration(format!(
                "Agent with id '{}' already exists",
                id
            )));
        }

        if let Some(handler) = &self.event_handler {
            agent.set_event_handler(Arc::clone(handler));
        }

        self.agent_order.push(id.clone());
        self.agents.insert(id, agent);
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The meeting's bus, e.g. to subscribe an observer before `run`.
    pub fn bus(&self) -> Arc<MessageBus> {
        Arc::clone(&self.bus)
    }

    pub fn phase(&self) -> MeetingPhase {
        self.phase
    }

    /// Completed agent turns so far.
    pub fn turn(&self) -> usize {
        self.turn
    }

    pub fn summary(&self) -> Option<&MeetingSummary> {
        self.summary.as_ref()
    }

    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.get(agent_id)
    }

    pub fn agent_ids(&self) -> &[String] {
        &self.agent_order
    }

    async fn emit(&self, event: LifecycleEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_lifecycle_event(&event).await;
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.agent_order.is_empty() {
            return Err("No agents in meeting".to_string());
        }
        self.policy.validate()?;
        self.config.validate()?;
        if let Some(leader) = &self.leader {
            if !self.agents.contains_key(leader) {
                return Err(format!("Leader '{}' is not a registered agent", leader));
            }
        }
        Ok(())
    }

    fn leader_id(&self) -> String {
        self.leader
            .clone()
            .or_else(|| self.agent_order.first().cloned())
            .unwrap_or_default()
    }

    fn progress(&self, elapsed: std::time::Duration) -> f64 {
        if let Some(max) = self.policy.max_turns {
            self.turn as f64 / max as f64
        } else if let Some(max) = self.policy.max_duration {
            elapsed.as_secs_f64() / max.as_secs_f64()
        } else {
            0.0
        }
    }

    async fn abort(&mut self, reason: impl Into<String>) -> MeetingError {
        let reason = reason.into();
        self.phase = MeetingPhase::Aborted;
        log::warn!("meeting {} aborted at turn {}: {}", self.id, self.turn, reason);
        self.emit(LifecycleEvent::new(
            MODERATOR_ID,
            LifecycleEventType::Error,
            format!("Meeting aborted: {}", reason),
        ))
        .await;
        MeetingError::Aborted {
            reason,
            turn: self.turn,
        }
    }

    /// Run the meeting to completion.
    ///
    /// Returns the summary, also retrievable afterwards through
    /// [`summary`](Self::summary). A meeting runs at most once.
    pub async fn run(&mut self) -> Result<MeetingSummary, MeetingError> {
        if self.phase != MeetingPhase::Pending {
            return Err(MeetingError::InvalidPhase(self.phase));
        }

        if let Err(reason) = self.validate() {
            self.phase = MeetingPhase::Aborted;
            log::error!("meeting {}: {}", self.id, reason);
            self.emit(LifecycleEvent::new(
                MODERATOR_ID,
                LifecycleEventType::Error,
                reason.clone(),
            ))
            .await;
            return Err(MeetingError::FatalConfiguration(reason));
        }

        for agent_id in &self.agent_order {
            self.bus.register(agent_id.clone());
        }

        self.phase = MeetingPhase::Running;
        self.started_at = Some(Utc::now());
        let clock = Instant::now();
        log::info!(
            "meeting {} started with {} agents: {}",
            self.id,
            self.agent_order.len(),
            self.topic
        );
        self.emit(
            LifecycleEvent::new(
                MODERATOR_ID,
                LifecycleEventType::Started,
                format!("Meeting started: {}", self.topic),
            )
            .with_progress(0.0)
            .with_data(serde_json::json!({
                "meeting_id": self.id,
                "agents": self.agent_order,
            })),
        )
        .await;

        if let Err(e) = self
            .bus
            .post(MessageDraft::broadcast(MODERATOR_ID, self.topic.clone()))
        {
            log::warn!("meeting {}: topic not delivered: {}", self.id, e);
        }

        let cause = loop {
            let mut took_turn = false;
            let mut stop = None;

            for agent_id in self.agent_order.clone() {
                if self.cancel.is_cancelled() {
                    return Err(self.abort("cancelled").await);
                }
                if self.config.require_stimulus && self.bus.pending(&agent_id) == 0 {
                    continue;
                }
                took_turn = true;

                let outcome = self.run_turn(&agent_id, clock.elapsed()).await;

                // In-flight work finished after cancellation is discarded.
                if self.cancel.is_cancelled() {
                    return Err(self.abort("cancelled").await);
                }

                self.publish_outcome(&agent_id, outcome).await;
                self.turn += 1;

                let recent = self.bus.recent(self.policy.window());
                if let Some(cause) = self.policy.evaluate(self.turn, clock.elapsed(), &recent) {
                    stop = Some(cause);
                    break;
                }
            }

            if let Some(cause) = stop {
                break cause;
            }
            if !took_turn {
                break TerminationCause::Quiescent;
            }
        };

        log::info!(
            "meeting {} stopped after {} turns ({})",
            self.id,
            self.turn,
            cause
        );

        if self.cancel.is_cancelled() {
            return Err(self.abort("cancelled").await);
        }

        self.phase = MeetingPhase::Synthesizing;
        let summary = self.synthesize(cause, clock.elapsed()).await;

        self.phase = MeetingPhase::Completed;
        self.emit(
            LifecycleEvent::new(
                MODERATOR_ID,
                LifecycleEventType::Completed,
                format!(
                    "Meeting completed after {} turns: {} {}%",
                    summary.total_turns,
                    summary.final_decision.direction,
                    summary.final_decision.magnitude
                ),
            )
            .with_progress(1.0)
            .with_data(serde_json::json!({
                "termination_cause": summary.termination_cause,
                "final_decision": summary.final_decision,
            })),
        )
        .await;

        self.summary = Some(summary.clone());
        Ok(summary)
    }

    async fn run_turn(&mut self, agent_id: &str, elapsed: std::time::Duration) -> TurnOutcome {
        let Some(mut agent) = self.agents.remove(agent_id) else {
            return TurnOutcome::default();
        };

        self.emit(
            LifecycleEvent::new(
                agent.name.clone(),
                LifecycleEventType::Thinking,
                format!("Turn {}", self.turn + 1),
            )
            .with_progress(self.progress(elapsed)),
        )
        .await;

        let inbox = self.bus.drain(agent_id);
        let public = self.bus.public_transcript();
        let start = public.len().saturating_sub(self.config.history_window);
        let ctx = TurnContext {
            topic: &self.topic,
            turn: self.turn + 1,
            public_history: &public[start..],
            roster: &self.agent_order,
            config: &self.config,
        };

        let remaining = self.policy.max_duration.map(|max| max.saturating_sub(elapsed));
        let deadline = async move {
            match remaining {
                Some(remaining) => tokio::time::sleep(remaining).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            outcome = agent.take_turn(inbox, &ctx) => outcome,
            _ = self.cancel.cancelled() => {
                log::warn!(
                    "meeting {}: turn of '{}' interrupted by cancellation",
                    self.id,
                    agent_id
                );
                TurnOutcome::default()
            }
            _ = deadline => {
                log::warn!(
                    "meeting {}: turn of '{}' cut off at max_duration",
                    self.id,
                    agent_id
                );
                TurnOutcome {
                    error: Some(TurnError::Generation(CapabilityUnavailableError::new(
                        "generation",
                        "interrupted at meeting deadline",
                    ))),
                    ..TurnOutcome::default()
                }
            }
        };
        self.agents.insert(agent_id.to_string(), agent);
        outcome
    }

    async fn publish_outcome(&mut self, agent_id: &str, outcome: TurnOutcome) {
        let turn = self.turn + 1;
        let agent_name = self
            .agents
            .get(agent_id)
            .map(|a| a.name.clone())
            .unwrap_or_else(|| agent_id.to_string());

        for draft in outcome.transcript {
            if let Err(e) = self.bus.post(draft) {
                self.record_incident(turn, agent_id, "routing", e.to_string())
                    .await;
            }
        }

        if let Some(draft) = outcome.message {
            match self.bus.post(draft) {
                Ok(message) => {
                    let data = serde_json::to_value(&message).unwrap_or_default();
                    self.emit(
                        LifecycleEvent::new(
                            agent_name.clone(),
                            LifecycleEventType::Message,
                            message.render(),
                        )
                        .with_data(data),
                    )
                    .await;
                }
                Err(e) => {
                    self.record_incident(turn, agent_id, "routing", e.to_string())
                        .await;
                }
            }
        }

        if let Some(error) = outcome.error {
            let kind = match &error {
                TurnError::Generation(_) => "generation",
                TurnError::Tool(_) => "tool",
                TurnError::ToolLoopExhausted { .. } => "tool_loop",
            };
            self.record_incident(turn, agent_id, kind, error.to_string())
                .await;
        }
    }

    async fn record_incident(&mut self, turn: usize, agent_id: &str, kind: &str, error: String) {
        log::warn!(
            "meeting {} turn {} agent '{}': {}",
            self.id,
            turn,
            agent_id,
            error
        );
        self.emit(
            LifecycleEvent::new(agent_id, LifecycleEventType::Error, error.clone())
                .with_data(serde_json::json!({ "turn": turn, "kind": kind })),
        )
        .await;
        self.incidents.push(Incident {
            turn,
            agent_id: agent_id.to_string(),
            kind: kind.to_string(),
            error,
        });
    }

    async fn synthesize(
        &mut self,
        cause: TerminationCause,
        elapsed: std::time::Duration,
    ) -> MeetingSummary {
        let history = self.bus.history();
        let leader = self.leader_id();

        let leader_message = latest_substantive(&history, &leader);
        let structured = leader_message.and_then(structured_arguments);
        let mut input = ExtractionInput::text(leader_message.map_or("", |m| m.content()));
        if let Some(arguments) = &structured {
            input = input.with_structured(arguments);
        }
        let final_decision = self.extractor.extract(&input);
        log::info!(
            "meeting {} decision: {} {}% x{} (confidence {}, {})",
            self.id,
            final_decision.direction,
            final_decision.magnitude,
            final_decision.leverage,
            final_decision.confidence,
            final_decision.provenance
        );

        let mut stance_tally = BTreeMap::new();
        for agent_id in self.agent_order.iter().filter(|id| **id != leader) {
            let stance = history
                .iter()
                .rev()
                .filter(|m| m.sender_id() == agent_id && !m.message_type().is_tool_traffic())
                .find_map(|m| {
                    let arguments = structured_arguments(m);
                    let mut input = ExtractionInput::text(m.content());
                    if let Some(arguments) = &arguments {
                        input = input.with_structured(arguments);
                    }
                    self.extractor.try_extract(&input, Provenance::Lexical)
                });
            if let Some(decision) = stance {
                stance_tally.insert(agent_id.clone(), decision.direction);
            }
        }

        let execution = match self.venue.clone() {
            Some(venue) => Some(self.execute(venue, &final_decision).await),
            None => None,
        };

        let mut message_type_stats = BTreeMap::new();
        for message in &history {
            *message_type_stats
                .entry(message.message_type().to_string())
                .or_insert(0) += 1;
        }

        let agent_stats = self
            .agent_order
            .iter()
            .filter_map(|id| self.agents.get(id).map(|a| (id.clone(), a.stats())))
            .collect();

        MeetingSummary {
            meeting_id: self.id.clone(),
            topic: self.topic.clone(),
            started_at: self.started_at.unwrap_or_else(Utc::now),
            total_turns: self.turn,
            total_messages: history.len(),
            total_duration_seconds: elapsed.as_secs_f64(),
            termination_cause: cause,
            agent_stats,
            message_type_stats,
            final_decision,
            stance_tally,
            incidents: self.incidents.clone(),
            execution,
            conversation_history: history,
        }
    }

    async fn execute(
        &mut self,
        venue: Arc<dyn ExecutionVenue>,
        decision: &Decision,
    ) -> ExecutionOutcome {
        if !decision.is_actionable(self.config.salvaged_magnitude_limit) {
            let reason = if decision.direction == Direction::Hold || decision.magnitude <= 0.0 {
                "decision is not a position".to_string()
            } else {
                format!(
                    "{} decision of {}% exceeds salvaged limit of {}%",
                    decision.provenance,
                    decision.magnitude,
                    self.config.salvaged_magnitude_limit
                )
            };
            log::info!("meeting {}: execution refused: {}", self.id, reason);
            return ExecutionOutcome::Refused { reason };
        }

        let limit = self.config.execution_timeout;
        let result: Result<ExecutionReport, CapabilityUnavailableError> =
            match tokio::time::timeout(limit, venue.execute(decision)).await {
                Ok(result) => result.map_err(|e| {
                    CapabilityUnavailableError::new("execution venue", e.to_string())
                }),
                Err(_) => Err(CapabilityUnavailableError::new(
                    "execution venue",
                    format!("timed out after {}ms", limit.as_millis()),
                )),
            };

        match result {
            Ok(report) => ExecutionOutcome::Executed {
                success: report.success,
                message: report.message,
            },
            Err(e) => {
                let turn = self.turn;
                self.record_incident(turn, MODERATOR_ID, "execution", e.to_string())
                    .await;
                ExecutionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl fmt::Debug for Meeting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meeting")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("agents", &self.agent_order)
            .field("phase", &self.phase)
            .field("turn", &self.turn)
            .finish()
    }
}

/// The sender's latest non-empty, non-tool message.
fn latest_substantive<'a>(history: &'a [Message], sender: &str) -> Option<&'a Message> {
    history.iter().rev().find(|m| {
        m.sender_id() == sender
            && !m.message_type().is_tool_traffic()
            && !m.content().trim().is_empty()
    })
}

fn structured_arguments(message: &Message) -> Option<serde_json::Value> {
    message
        .metadata
        .get(META_STRUCTURED_CALL)
        .and_then(|raw| serde_json::from_str::<StructuredCall>(raw).ok())
        .map(|call| call.arguments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agora::message::MessageType;

    fn message(seq: usize, sender: &str, content: &str, t: MessageType) -> Message {
        Message::from_draft(
            format!("x-{}", seq),
            MessageDraft::broadcast(sender, content).with_type(t),
        )
    }

    #[test]
    fn test_latest_substantive_skips_tool_traffic_and_blank() {
        let history = vec![
            message(1, "pm", "long 5%", MessageType::Broadcast),
            message(2, "pm", "price()", MessageType::ToolCall),
            message(3, "pm", "   ", MessageType::Broadcast),
            message(4, "risk", "short", MessageType::Broadcast),
        ];
        assert_eq!(latest_substantive(&history, "pm").unwrap().id(), "x-1");
        assert!(latest_substantive(&history, "nobody").is_none());
    }

    #[test]
    fn test_structured_arguments_from_metadata() {
        let mut m = message(1, "pm", "final", MessageType::Broadcast);
        m.metadata.insert(
            META_STRUCTURED_CALL.to_string(),
            r#"{"name":"submit_decision","arguments":{"direction":"short"}}"#.to_string(),
        );
        assert_eq!(
            structured_arguments(&m),
            Some(serde_json::json!({"direction": "short"}))
        );
    }

    #[test]
    fn test_add_agent_rejects_reserved_id() {
        struct Never;
        #[async_trait::async_trait]
        impl ClientWrapper for Never {
            async fn generate(
                &self,
                _request: crate::agora::client_wrapper::GenerationRequest,
            ) -> Result<crate::agora::client_wrapper::Generation, Box<dyn Error + Send + Sync>>
            {
                Err("unused".into())
            }
        }

        let mut meeting = Meeting::new("t", TerminationPolicy::new().with_max_turns(1));
        let result = meeting.add_agent(Agent::new(MODERATOR_ID, "Mod", Arc::new(Never)));
        assert!(matches!(result, Err(MeetingError::FatalConfiguration(_))));
    }
}
