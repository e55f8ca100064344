//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use quizbout::bus::GameEventBus;
use quizbout::clock::ManualClock;
use quizbout::domain::{
    Difficulty, GameEvent, GameMode, LlmProfile, OpponentSpec, PlayerId, Question, SessionId,
    StandardScorePolicy, VerifierSpec,
};
use quizbout::llm::{LlmEventStream, LlmGateway, LlmStreamEvent, RoundContext, StreamingPolicy};
use quizbout::questions::InMemoryQuestionBank;
use quizbout::results::InMemoryResultsRepository;
use quizbout::session::ActorContext;
use quizbout::verify::StandardAnswerVerifier;

// ============================================================================
// Event Recording Bus
// ============================================================================

/// Records every published event for assertions.
#[derive(Default)]
pub struct RecordingBus {
    events: Mutex<Vec<GameEvent>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GameEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_matching(&self, predicate: impl Fn(&GameEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

#[async_trait]
impl GameEventBus for RecordingBus {
    async fn publish(&self, event: GameEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn authorize_player(&self, _session_id: SessionId, _player_id: PlayerId) {}

    fn subscribe(
        &self,
        _session_id: SessionId,
        _player_id: PlayerId,
    ) -> Option<broadcast::Receiver<GameEvent>> {
        None
    }

    fn revoke_session(&self, _session_id: SessionId) {}
}

/// Polls the bus until `predicate` matches the event list, panicking after
/// two seconds.
pub async fn wait_for_events(bus: &RecordingBus, predicate: impl Fn(&[GameEvent]) -> bool) {
    for _ in 0..200 {
        if predicate(&bus.events()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected events did not arrive; got {:#?}", bus.events());
}

// ============================================================================
// LLM Gateways
// ============================================================================

/// Replays a fixed event script for every round.
pub struct ScriptedLlmGateway {
    events: Vec<LlmStreamEvent>,
}

impl ScriptedLlmGateway {
    pub fn new(events: Vec<LlmStreamEvent>) -> Self {
        Self { events }
    }
}

impl LlmGateway for ScriptedLlmGateway {
    fn stream_answer(&self, _ctx: RoundContext) -> LlmEventStream {
        Box::pin(futures::stream::iter(self.events.clone()))
    }
}

/// Never produces anything; keeps rounds open for adversarial tests.
pub struct PendingLlmGateway;

impl LlmGateway for PendingLlmGateway {
    fn stream_answer(&self, _ctx: RoundContext) -> LlmEventStream {
        Box::pin(futures::stream::pending())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn mc_question(correct_index: u32) -> Question {
    Question {
        question_id: Uuid::new_v4(),
        prompt: "Which choice is right?".to_string(),
        choices: Some(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
        difficulty: Difficulty::Medium,
        verifier_spec: VerifierSpec::MultipleChoice { correct_index },
        metadata: None,
    }
}

pub fn opponent_spec(id: &str, mode: GameMode) -> OpponentSpec {
    OpponentSpec {
        id: id.to_string(),
        mode,
        display_name: "Test Bot".to_string(),
        llm_profile: LlmProfile::named("Test Bot"),
        streaming: StreamingPolicy::default(),
    }
}

pub struct TestHarness {
    pub bus: Arc<RecordingBus>,
    pub clock: ManualClock,
    pub results: Arc<InMemoryResultsRepository>,
    pub ctx: ActorContext,
}

/// Builds an `ActorContext` around a recording bus, a manual clock and a
/// five-question bank, with the supplied gateway.
pub fn harness(gateway: Arc<dyn LlmGateway>) -> TestHarness {
    let bus = Arc::new(RecordingBus::new());
    let clock = ManualClock::starting_at(Utc::now());
    let results = Arc::new(InMemoryResultsRepository::new());
    let questions = (0..5).map(|_| mc_question(0)).collect();
    let ctx = ActorContext {
        bus: bus.clone(),
        questions: Arc::new(InMemoryQuestionBank::new(questions)),
        verifier: Arc::new(StandardAnswerVerifier),
        score_policy: Arc::new(StandardScorePolicy),
        llm_gateway: gateway,
        results: results.clone(),
        clock: Arc::new(clock.clone()),
    };
    TestHarness {
        bus,
        clock,
        results,
        ctx,
    }
}
