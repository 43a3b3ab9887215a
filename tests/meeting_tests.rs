use agora::bus::BusObserver;
use agora::client_wrapper::{
    ClientWrapper, ExecutionReport, ExecutionVenue, Generation, GenerationRequest, StructuredCall,
};
use agora::config::{MeetingConfig, RoleDescriptor};
use agora::decision::{Decision, Direction, Provenance};
use agora::event::{ChannelEventHandler, LifecycleEventType};
use agora::meeting::{ExecutionOutcome, MeetingPhase, MODERATOR_ID};
use agora::message::{Message, MessageType};
use agora::termination::{CustomPredicate, TerminationCause, TerminationPolicy};
use agora::{Agent, Meeting, MeetingError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Plays back replies in order, then repeats the last one.
struct ScriptedClient {
    replies: Mutex<VecDeque<Generation>>,
    last: Mutex<Generation>,
}

impl ScriptedClient {
    fn text(reply: &str) -> Arc<Self> {
        Self::script(vec![Generation::Text(reply.to_string())])
    }

    fn script(replies: Vec<Generation>) -> Arc<Self> {
        let last = replies
            .last()
            .cloned()
            .unwrap_or_else(|| Generation::Text(String::new()));
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(last),
        })
    }
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<Generation, Box<dyn Error + Send + Sync>> {
        let next = self.replies.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.last.lock().unwrap().clone()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct FailingClient;

#[async_trait]
impl ClientWrapper for FailingClient {
    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<Generation, Box<dyn Error + Send + Sync>> {
        Err("service unavailable".into())
    }
}

/// Cancels the meeting from inside its first generation call.
struct CancellingClient {
    token: CancellationToken,
}

#[async_trait]
impl ClientWrapper for CancellingClient {
    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<Generation, Box<dyn Error + Send + Sync>> {
        self.token.cancel();
        Ok(Generation::Text("Go long now.".to_string()))
    }
}

struct SlowClient(Duration);

#[async_trait]
impl ClientWrapper for SlowClient {
    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<Generation, Box<dyn Error + Send + Sync>> {
        tokio::time::sleep(self.0).await;
        Ok(Generation::Text("too late".to_string()))
    }
}

/// Never answers.
struct StalledClient;

#[async_trait]
impl ClientWrapper for StalledClient {
    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<Generation, Box<dyn Error + Send + Sync>> {
        std::future::pending().await
    }
}

#[derive(Default)]
struct RecordingVenue {
    executed: Mutex<Vec<Decision>>,
    fail: bool,
}

#[async_trait]
impl ExecutionVenue for RecordingVenue {
    async fn execute(
        &self,
        decision: &Decision,
    ) -> Result<ExecutionReport, Box<dyn Error + Send + Sync>> {
        if self.fail {
            return Err("exchange offline".into());
        }
        self.executed.lock().unwrap().push(decision.clone());
        Ok(ExecutionReport {
            success: true,
            message: format!("filled {} {}%", decision.direction, decision.magnitude),
        })
    }
}

#[derive(Default)]
struct IdRecorder(Mutex<Vec<String>>);

impl BusObserver for IdRecorder {
    fn on_message(&self, message: &Message) {
        self.0.lock().unwrap().push(message.id().to_string());
    }
}

fn three_agent_meeting(max_turns: usize) -> Meeting {
    let mut meeting = Meeting::new(
        "Should we take the long case on BTC?",
        TerminationPolicy::new().with_max_turns(max_turns),
    )
    .with_leader("a");
    meeting
        .add_agent(Agent::new(
            "a",
            "Alpha",
            ScriptedClient::text("I agree with the long case, 5% at 2x."),
        ))
        .unwrap();
    meeting
        .add_agent(Agent::new(
            "b",
            "Beta",
            ScriptedClient::text("@a what stop would you use?"),
        ))
        .unwrap();
    meeting
        .add_agent(Agent::new(
            "c",
            "Gamma",
            ScriptedClient::text("@a Funding is hot, I'd sell the bounce."),
        ))
        .unwrap();
    meeting
}

#[tokio::test]
async fn test_three_agent_meeting_summary() {
    let mut meeting = three_agent_meeting(6);
    let summary = meeting.run().await.unwrap();

    assert_eq!(meeting.phase(), MeetingPhase::Completed);
    assert_eq!(summary.total_turns, 6);
    assert_eq!(meeting.turn(), 6);
    assert_eq!(summary.termination_cause, TerminationCause::MaxTurns);
    // topic + one message per turn
    assert_eq!(summary.total_messages, 7);
    assert_eq!(summary.conversation_history.len(), 7);

    assert_eq!(summary.message_type_stats["Broadcast"], 1);
    assert_eq!(summary.message_type_stats["Agreement"], 2);
    assert_eq!(summary.message_type_stats["Question"], 2);
    assert_eq!(summary.message_type_stats["Direct"], 2);

    assert_eq!(summary.agent_stats["a"].messages_sent, 2);
    assert_eq!(summary.agent_stats["b"].messages_sent, 2);

    let question = summary
        .conversation_history
        .iter()
        .find(|m| m.message_type() == MessageType::Question)
        .unwrap();
    assert_eq!(question.sender_id(), "b");
    assert_eq!(question.recipient().agent_id(), Some("a"));
    assert!(question.reply_to().is_some());

    assert_eq!(summary.final_decision.direction, Direction::Long);
    assert_eq!(summary.final_decision.magnitude, 5.0);
    assert_eq!(summary.final_decision.leverage, 2);
    assert_eq!(summary.final_decision.provenance, Provenance::Lexical);

    assert_eq!(summary.stance_tally.get("c"), Some(&Direction::Short));
    assert!(!summary.stance_tally.contains_key("a"));
    assert!(!summary.stance_tally.contains_key("b"));
    assert!(summary.incidents.is_empty());
    assert!(summary.execution.is_none());

    assert_eq!(meeting.summary(), Some(&summary));
}

#[tokio::test]
async fn test_summary_json_shape() {
    let mut meeting = three_agent_meeting(3);
    let summary = meeting.run().await.unwrap();
    let json = serde_json::to_value(&summary).unwrap();

    assert_eq!(json["total_turns"], 3);
    assert_eq!(json["termination_cause"], "max_turns");
    assert_eq!(json["final_decision"]["direction"], "long");
    assert_eq!(json["final_decision"]["provenance"], "lexical");
    assert_eq!(json["agent_stats"]["a"]["messages_sent"], 1);
    assert_eq!(json["conversation_history"][0]["sender_id"], MODERATOR_ID);
    assert!(json.get("execution").is_none());
}

#[tokio::test]
async fn test_meeting_runs_only_once() {
    let mut meeting = three_agent_meeting(3);
    meeting.run().await.unwrap();
    assert_eq!(
        meeting.run().await,
        Err(MeetingError::InvalidPhase(MeetingPhase::Completed))
    );
    assert!(matches!(
        meeting.add_agent(Agent::new("d", "Delta", ScriptedClient::text("hi"))),
        Err(MeetingError::InvalidPhase(MeetingPhase::Completed))
    ));
}

#[tokio::test]
async fn test_fatal_configuration() {
    let mut empty = Meeting::new("t", TerminationPolicy::new().with_max_turns(2));
    assert!(matches!(
        empty.run().await,
        Err(MeetingError::FatalConfiguration(_))
    ));
    assert_eq!(empty.phase(), MeetingPhase::Aborted);

    let mut unbounded = Meeting::new("t", TerminationPolicy::new());
    unbounded
        .add_agent(Agent::new("a", "A", ScriptedClient::text("hi")))
        .unwrap();
    assert!(matches!(
        unbounded.run().await,
        Err(MeetingError::FatalConfiguration(_))
    ));

    let mut no_leader =
        Meeting::new("t", TerminationPolicy::new().with_max_turns(2)).with_leader("ghost");
    no_leader
        .add_agent(Agent::new("a", "A", ScriptedClient::text("hi")))
        .unwrap();
    assert!(matches!(
        no_leader.run().await,
        Err(MeetingError::FatalConfiguration(_))
    ));
    assert!(no_leader.bus().history().is_empty());

    let mut duplicate = Meeting::new("t", TerminationPolicy::new().with_max_turns(2));
    duplicate
        .add_agent(Agent::new("a", "A", ScriptedClient::text("hi")))
        .unwrap();
    assert!(matches!(
        duplicate.add_agent(Agent::new("a", "Again", ScriptedClient::text("hi"))),
        Err(MeetingError::FatalConfiguration(_))
    ));
    assert_eq!(duplicate.agent_ids(), &["a".to_string()]);
}

#[tokio::test]
async fn test_cancellation_mid_meeting_freezes_turn() {
    let token = CancellationToken::new();
    let mut meeting = Meeting::new("t", TerminationPolicy::new().with_max_turns(10))
        .with_cancellation_token(token.clone());
    meeting
        .add_agent(Agent::new(
            "a",
            "A",
            Arc::new(CancellingClient {
                token: token.clone(),
            }),
        ))
        .unwrap();
    meeting
        .add_agent(Agent::new("b", "B", ScriptedClient::text("short it")))
        .unwrap();

    let recorder = Arc::new(IdRecorder::default());
    meeting.bus().subscribe(recorder.clone());

    let result = meeting.run().await;
    assert_eq!(
        result,
        Err(MeetingError::Aborted {
            reason: "cancelled".to_string(),
            turn: 0,
        })
    );
    assert_eq!(meeting.phase(), MeetingPhase::Aborted);
    assert_eq!(meeting.turn(), 0);
    assert!(meeting.summary().is_none());

    // Only the topic went out; the cancelled turn's utterance was discarded.
    let history = meeting.bus().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender_id(), MODERATOR_ID);
    assert_eq!(recorder.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancellation_before_run() {
    let mut meeting = three_agent_meeting(6);
    meeting.cancellation_token().cancel();
    assert!(matches!(
        meeting.run().await,
        Err(MeetingError::Aborted { turn: 0, .. })
    ));
}

#[tokio::test]
async fn test_generation_failures_are_incidents() {
    let mut meeting = Meeting::new("t", TerminationPolicy::new().with_max_turns(4));
    meeting
        .add_agent(Agent::new("a", "A", Arc::new(FailingClient)))
        .unwrap();
    meeting
        .add_agent(Agent::new("b", "B", ScriptedClient::text("Hold for now.")))
        .unwrap();

    let summary = meeting.run().await.unwrap();
    assert_eq!(summary.total_turns, 4);
    assert_eq!(summary.incidents.len(), 2);
    assert!(summary
        .incidents
        .iter()
        .all(|i| i.agent_id == "a" && i.kind == "generation"));
    assert_eq!(summary.incidents[0].turn, 1);
    assert_eq!(summary.incidents[1].turn, 3);

    // The leader defaults to the first agent, which never spoke.
    assert_eq!(summary.final_decision.provenance, Provenance::Default);
    assert_eq!(summary.final_decision.direction, Direction::Hold);
    assert_eq!(summary.stance_tally.get("b"), Some(&Direction::Hold));
}

#[tokio::test]
async fn test_generation_timeout_is_noop_turn() {
    let mut meeting = Meeting::new("t", TerminationPolicy::new().with_max_turns(1)).with_config(
        MeetingConfig {
            generation_timeout: Duration::from_millis(20),
            ..MeetingConfig::default()
        },
    );
    meeting
        .add_agent(Agent::new(
            "a",
            "A",
            Arc::new(SlowClient(Duration::from_secs(5))),
        ))
        .unwrap();

    let summary = meeting.run().await.unwrap();
    assert_eq!(summary.total_turns, 1);
    assert_eq!(summary.total_messages, 1);
    assert_eq!(summary.incidents[0].kind, "generation");
    assert!(summary.incidents[0].error.contains("timed out"));
}

#[tokio::test]
async fn test_stalled_client_is_cut_off_at_max_duration() {
    let mut meeting = Meeting::new(
        "t",
        TerminationPolicy::new().with_max_duration(Duration::from_millis(50)),
    )
    .with_config(MeetingConfig {
        generation_timeout: Duration::from_secs(3600),
        ..MeetingConfig::default()
    });
    meeting
        .add_agent(Agent::new("a", "A", Arc::new(StalledClient)))
        .unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(2), meeting.run())
        .await
        .expect("meeting outlived its max_duration")
        .unwrap();
    assert_eq!(summary.termination_cause, TerminationCause::MaxDuration);
    assert_eq!(summary.total_turns, 1);
    assert_eq!(summary.incidents.len(), 1);
    assert_eq!(summary.incidents[0].kind, "generation");
    assert!(meeting.agent("a").is_some());
}

#[tokio::test]
async fn test_cancellation_interrupts_stalled_turn() {
    let token = CancellationToken::new();
    let mut meeting = Meeting::new("t", TerminationPolicy::new().with_max_turns(5))
        .with_config(MeetingConfig {
            generation_timeout: Duration::from_secs(3600),
            ..MeetingConfig::default()
        })
        .with_cancellation_token(token.clone());
    meeting
        .add_agent(Agent::new("a", "A", Arc::new(StalledClient)))
        .unwrap();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(2), meeting.run())
        .await
        .expect("cancellation did not interrupt the turn");
    canceller.await.unwrap();

    assert!(matches!(
        result,
        Err(MeetingError::Aborted { ref reason, turn: 0 }) if reason == "cancelled"
    ));
    assert_eq!(meeting.phase(), MeetingPhase::Aborted);
    assert_eq!(meeting.bus().history_len(), 1);
}

#[tokio::test]
async fn test_zero_timeout_is_fatal_configuration() {
    let mut meeting = Meeting::new("t", TerminationPolicy::new().with_max_turns(1)).with_config(
        MeetingConfig {
            tool_timeout: Duration::ZERO,
            ..MeetingConfig::default()
        },
    );
    meeting
        .add_agent(Agent::new("a", "A", ScriptedClient::text("hi")))
        .unwrap();

    assert!(matches!(
        meeting.run().await,
        Err(MeetingError::FatalConfiguration(ref reason)) if reason.contains("tool_timeout")
    ));
}

#[tokio::test]
async fn test_require_stimulus_skips_and_goes_quiescent() {
    let mut meeting = Meeting::new("t", TerminationPolicy::new().with_max_turns(50)).with_config(
        MeetingConfig {
            require_stimulus: true,
            ..MeetingConfig::default()
        },
    );
    meeting
        .add_agent(Agent::new("a", "A", ScriptedClient::text("@b your view?")))
        .unwrap();
    meeting
        .add_agent(Agent::new("b", "B", ScriptedClient::text("")))
        .unwrap();
    meeting
        .add_agent(Agent::new("c", "C", ScriptedClient::text("")))
        .unwrap();

    let summary = meeting.run().await.unwrap();
    // Round one: everyone has the topic. Round two: nobody has anything.
    assert_eq!(summary.total_turns, 3);
    assert_eq!(summary.termination_cause, TerminationCause::Quiescent);
    assert_eq!(summary.agent_stats["a"].messages_sent, 1);
    assert_eq!(summary.agent_stats["b"].messages_sent, 0);
}

#[tokio::test]
async fn test_without_stimulus_requirement_every_agent_speaks() {
    let mut meeting = Meeting::new("t", TerminationPolicy::new().with_max_turns(6));
    meeting
        .add_agent(Agent::new("a", "A", ScriptedClient::text("@b your view?")))
        .unwrap();
    meeting
        .add_agent(Agent::new("b", "B", ScriptedClient::text("")))
        .unwrap();
    meeting
        .add_agent(Agent::new("c", "C", ScriptedClient::text("")))
        .unwrap();

    let summary = meeting.run().await.unwrap();
    assert_eq!(summary.total_turns, 6);
    assert_eq!(summary.termination_cause, TerminationCause::MaxTurns);
    assert_eq!(summary.agent_stats["a"].messages_sent, 2);
}

fn agreeing_meeting(policy: TerminationPolicy) -> Meeting {
    let mut meeting = Meeting::new("t", policy);
    meeting
        .add_agent(Agent::new("a", "A", ScriptedClient::text("I agree, long.")))
        .unwrap();
    meeting
        .add_agent(Agent::new("b", "B", ScriptedClient::text("Agreed, go long.")))
        .unwrap();
    meeting
}

#[tokio::test]
async fn test_custom_predicate_stops_meeting() {
    let mut meeting = agreeing_meeting(
        TerminationPolicy::new()
            .with_max_turns(10)
            .with_custom(CustomPredicate::agreement_consensus(2)),
    );
    let summary = meeting.run().await.unwrap();
    assert_eq!(summary.termination_cause, TerminationCause::CustomPredicate);
    assert_eq!(summary.total_turns, 2);
}

#[tokio::test]
async fn test_simultaneous_conditions_report_max_turns() {
    // Both hold after turn 2.
    let mut meeting = agreeing_meeting(
        TerminationPolicy::new()
            .with_max_turns(2)
            .with_custom(CustomPredicate::agreement_consensus(2)),
    );
    let summary = meeting.run().await.unwrap();
    assert_eq!(summary.total_turns, 2);
    assert_eq!(summary.termination_cause, TerminationCause::MaxTurns);
}

#[tokio::test]
async fn test_max_duration() {
    let mut meeting = Meeting::new(
        "t",
        TerminationPolicy::new().with_max_duration(Duration::from_millis(30)),
    );
    meeting
        .add_agent(Agent::new(
            "a",
            "A",
            Arc::new(SlowClient(Duration::from_millis(20))),
        ))
        .unwrap();

    let summary = meeting.run().await.unwrap();
    assert_eq!(summary.termination_cause, TerminationCause::MaxDuration);
    assert!(summary.total_turns >= 1);
    assert!(summary.total_duration_seconds >= 0.03);
}

#[tokio::test]
async fn test_private_messages_feed_synthesis_not_transcript() {
    let mut meeting = Meeting::new("t", TerminationPolicy::new().with_max_turns(2))
        .with_leader("pm");
    meeting
        .add_agent(Agent::new(
            "pm",
            "PM",
            ScriptedClient::text("@risk privately, I want to go short 4% here."),
        ))
        .unwrap();
    meeting
        .add_agent(Agent::new("risk", "Risk", ScriptedClient::text("Noted.")))
        .unwrap();

    let summary = meeting.run().await.unwrap();
    assert_eq!(summary.message_type_stats["Private"], 1);
    assert_eq!(summary.final_decision.direction, Direction::Short);
    assert_eq!(summary.final_decision.magnitude, 4.0);

    let public = meeting.bus().public_transcript();
    assert!(public.iter().all(|m| m.sender_id() != "pm"));
}

#[tokio::test]
async fn test_structured_decision_is_executed() {
    let venue = Arc::new(RecordingVenue::default());
    let mut meeting = Meeting::new("t", TerminationPolicy::new().with_max_turns(2))
        .with_leader("pm")
        .with_venue(venue.clone());
    meeting
        .add_agent(Agent::new(
            "pm",
            "PM",
            ScriptedClient::script(vec![Generation::ToolCall(StructuredCall {
                name: "submit_decision".to_string(),
                arguments: serde_json::json!({
                    "direction": "long",
                    "magnitude": 40,
                    "leverage": 3,
                    "confidence": 0.7,
                    "reasoning": "Breakout confirmed"
                }),
            })]),
        ))
        .unwrap();
    meeting
        .add_agent(Agent::new("risk", "Risk", ScriptedClient::text("I agree.")))
        .unwrap();

    let summary = meeting.run().await.unwrap();
    let decision = &summary.final_decision;
    assert_eq!(decision.provenance, Provenance::Structured);
    assert_eq!(decision.magnitude, 40.0);
    assert_eq!(decision.leverage, 3);
    assert!((decision.confidence - 70.0).abs() < 1e-9);
    assert_eq!(decision.reasoning, "Breakout confirmed");

    assert!(matches!(
        summary.execution,
        Some(ExecutionOutcome::Executed { success: true, .. })
    ));
    assert_eq!(venue.executed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_risk_gate_refuses_salvaged_oversize_decision() {
    let venue = Arc::new(RecordingVenue::default());
    let mut meeting = Meeting::new("t", TerminationPolicy::new().with_max_turns(1))
        .with_venue(venue.clone());
    meeting
        .add_agent(Agent::new(
            "pm",
            "PM",
            ScriptedClient::text("Go long 40% at 5x, this is the trade of the year."),
        ))
        .unwrap();

    let summary = meeting.run().await.unwrap();
    assert_eq!(summary.final_decision.provenance, Provenance::Lexical);
    assert_eq!(summary.final_decision.magnitude, 40.0);
    assert!(matches!(
        summary.execution,
        Some(ExecutionOutcome::Refused { .. })
    ));
    assert!(venue.executed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_venue_failure_does_not_fail_meeting() {
    let venue = Arc::new(RecordingVenue {
        fail: true,
        ..RecordingVenue::default()
    });
    let mut meeting =
        Meeting::new("t", TerminationPolicy::new().with_max_turns(1)).with_venue(venue);
    meeting
        .add_agent(Agent::new("pm", "PM", ScriptedClient::text("Long 2% at 2x.")))
        .unwrap();

    let summary = meeting.run().await.unwrap();
    assert_eq!(meeting.phase(), MeetingPhase::Completed);
    assert!(matches!(
        summary.execution,
        Some(ExecutionOutcome::Failed { .. })
    ));
    assert_eq!(summary.incidents.last().unwrap().kind, "execution");
}

#[tokio::test]
async fn test_lifecycle_events() {
    let (handler, mut rx) = ChannelEventHandler::new();
    let mut meeting = three_agent_meeting(3).with_event_handler(Arc::new(handler));
    meeting.run().await.unwrap();
    drop(meeting);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(events.first().unwrap().event_type, LifecycleEventType::Started);
    assert_eq!(events.last().unwrap().event_type, LifecycleEventType::Completed);
    assert_eq!(events.last().unwrap().progress, Some(1.0));
    let thinking = events
        .iter()
        .filter(|e| e.event_type == LifecycleEventType::Thinking)
        .count();
    let messages: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == LifecycleEventType::Message)
        .collect();
    assert_eq!(thinking, 3);
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].agent_name, "Alpha");
    assert!(messages[0].data.as_ref().unwrap()["id"].is_string());
}

#[tokio::test]
async fn test_from_descriptors() {
    let roster: Vec<RoleDescriptor> = serde_json::from_str(
        r#"[
            {"id": "pm", "name": "Portfolio Manager", "persona": "You decide."},
            {"id": "quant", "persona": "You model.", "temperature": 0.1}
        ]"#,
    )
    .unwrap();

    let mut meeting = Meeting::from_descriptors(
        "t",
        TerminationPolicy::new().with_max_turns(2),
        &roster,
        |d| -> Arc<dyn ClientWrapper> { ScriptedClient::text(&format!("{} says hold", d.id)) },
    )
    .unwrap();

    assert_eq!(meeting.agent_ids(), &["pm".to_string(), "quant".to_string()]);
    assert_eq!(meeting.agent("pm").unwrap().name, "Portfolio Manager");
    assert_eq!(meeting.agent("quant").unwrap().role.temperature, Some(0.1));

    let summary = meeting.run().await.unwrap();
    assert_eq!(summary.total_turns, 2);
    assert_eq!(summary.stance_tally.get("quant"), Some(&Direction::Hold));
}

#[tokio::test]
async fn test_concurrent_meetings_are_isolated() {
    let first = tokio::spawn(async move {
        let mut meeting = three_agent_meeting(6);
        let id = meeting.id().to_string();
        (id, meeting.run().await)
    });
    let second = tokio::spawn(async move {
        let mut meeting = three_agent_meeting(3);
        let id = meeting.id().to_string();
        (id, meeting.run().await)
    });

    let (id1, s1) = first.await.unwrap();
    let (id2, s2) = second.await.unwrap();
    let (s1, s2) = (s1.unwrap(), s2.unwrap());

    assert_ne!(id1, id2);
    assert_eq!(s1.total_turns, 6);
    assert_eq!(s2.total_turns, 3);
    assert_eq!(s1.total_messages, 7);
    assert_eq!(s2.total_messages, 4);

    let prefix1 = &id1[..8];
    let prefix2 = &id2[..8];
    assert!(s1
        .conversation_history
        .iter()
        .all(|m| m.id().starts_with(prefix1)));
    assert!(s2
        .conversation_history
        .iter()
        .all(|m| m.id().starts_with(prefix2)));
}
