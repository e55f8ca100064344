//! Adversarial and lifecycle tests for the session actor: nonce replay,
//! double submits, deadline enforcement and round/session resolution.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use common::{
    harness, wait_for_events, PendingLlmGateway, RecordingBus, ScriptedLlmGateway, TestHarness,
};
use quizbout::domain::{
    Answer, ErrorCode, GameEvent, GameMode, PlayerId, PlayerType, RoundId, RoundResolveReason,
    SessionId,
};
use quizbout::llm::{LlmAnswer, LlmStreamEvent};
use quizbout::session::{ActorConfig, JoinResponse, SessionActor, SessionCommand};

struct ActorUnderTest {
    tx: mpsc::Sender<SessionCommand>,
    session_id: SessionId,
    human_id: PlayerId,
    removals: mpsc::UnboundedReceiver<SessionId>,
}

fn spawn_actor(harness: &TestHarness) -> ActorUnderTest {
    let session_id = Uuid::new_v4();
    let (removal_tx, removals) = mpsc::unbounded_channel();
    let (tx, _task) = SessionActor::spawn(
        ActorConfig {
            session_id,
            opponent_spec: common::opponent_spec("spec-1", GameMode::Lightweight),
            mailbox_capacity: 100,
            round_duration: Duration::from_secs(60),
            cleanup_grace: Duration::from_secs(60),
        },
        harness.ctx.clone(),
        removal_tx,
    );
    ActorUnderTest {
        tx,
        session_id,
        human_id: Uuid::new_v4(),
        removals,
    }
}

async fn join(actor: &ActorUnderTest, player_id: PlayerId) -> JoinResponse {
    let (reply_tx, reply_rx) = oneshot::channel();
    actor
        .tx
        .send(SessionCommand::JoinSession {
            player_id,
            nickname: "Tester".to_string(),
            reply: reply_tx,
        })
        .await
        .expect("actor alive");
    reply_rx.await.expect("join reply")
}

/// Rejoining is processed after everything already in the mailbox, so a
/// join round-trip doubles as a deterministic flush barrier.
async fn flush(actor: &ActorUnderTest) {
    let response = join(actor, actor.human_id).await;
    assert!(matches!(response, JoinResponse::Accepted { .. }));
}

async fn start_round(actor: &ActorUnderTest, bus: &RecordingBus) -> (RoundId, String) {
    actor
        .tx
        .send(SessionCommand::StartNextRound {
            player_id: actor.human_id,
        })
        .await
        .expect("actor alive");
    flush(actor).await;

    let events = bus.events();
    let started = events
        .iter()
        .rev()
        .find_map(|event| match event {
            GameEvent::RoundStarted {
                round_id,
                nonce_token,
                ..
            } => Some((*round_id, nonce_token.clone())),
            _ => None,
        })
        .expect("RoundStarted event");
    started
}

fn submit(
    actor: &ActorUnderTest,
    round_id: RoundId,
    nonce_token: &str,
    answer: Answer,
) -> SessionCommand {
    SessionCommand::SubmitAnswer {
        player_id: actor.human_id,
        round_id,
        nonce_token: nonce_token.to_string(),
        answer,
        client_sent_at: None,
    }
}

fn error_codes(bus: &RecordingBus) -> Vec<ErrorCode> {
    bus.events()
        .iter()
        .filter_map(|event| match event {
            GameEvent::SessionError { error_code, .. } => Some(*error_code),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn human_cannot_submit_twice() {
    let h = harness(Arc::new(PendingLlmGateway));
    let actor = spawn_actor(&h);

    join(&actor, actor.human_id).await;
    let (round_id, nonce) = start_round(&actor, &h.bus).await;

    actor
        .tx
        .send(submit(&actor, round_id, &nonce, Answer::multiple_choice(0)))
        .await
        .unwrap();
    actor
        .tx
        .send(submit(&actor, round_id, &nonce, Answer::multiple_choice(1)))
        .await
        .unwrap();
    flush(&actor).await;

    let human_submissions = h.bus.count_matching(|event| {
        matches!(
            event,
            GameEvent::SubmissionReceived {
                player_type: PlayerType::Human,
                ..
            }
        )
    });
    assert_eq!(human_submissions, 1, "exactly one submission is recorded");
    assert!(error_codes(&h.bus).contains(&ErrorCode::AlreadySubmitted));
}

#[tokio::test]
async fn invalid_nonce_is_rejected_without_recording() {
    let h = harness(Arc::new(PendingLlmGateway));
    let actor = spawn_actor(&h);

    join(&actor, actor.human_id).await;
    let (round_id, _nonce) = start_round(&actor, &h.bus).await;

    actor
        .tx
        .send(submit(
            &actor,
            round_id,
            "wrong-nonce-value",
            Answer::multiple_choice(0),
        ))
        .await
        .unwrap();
    flush(&actor).await;

    assert!(error_codes(&h.bus).contains(&ErrorCode::InvalidNonce));
    assert_eq!(
        h.bus
            .count_matching(|e| matches!(e, GameEvent::SubmissionReceived { .. })),
        0,
        "a rejected nonce must not create a submission"
    );
}

#[tokio::test]
async fn submission_after_deadline_is_rejected() {
    let h = harness(Arc::new(PendingLlmGateway));
    let actor = spawn_actor(&h);

    join(&actor, actor.human_id).await;
    let (round_id, nonce) = start_round(&actor, &h.bus).await;

    // Move the injected clock far past the deadline; runtime timers are
    // untouched.
    h.clock.advance(Duration::from_secs(7_200));

    actor
        .tx
        .send(submit(&actor, round_id, &nonce, Answer::multiple_choice(0)))
        .await
        .unwrap();
    flush(&actor).await;

    assert!(error_codes(&h.bus).contains(&ErrorCode::DeadlinePassed));
    assert_eq!(
        h.bus
            .count_matching(|e| matches!(e, GameEvent::SubmissionReceived { .. })),
        0
    );
}

#[tokio::test]
async fn second_round_start_fails_while_round_open() {
    let h = harness(Arc::new(PendingLlmGateway));
    let actor = spawn_actor(&h);

    join(&actor, actor.human_id).await;
    let _ = start_round(&actor, &h.bus).await;

    actor
        .tx
        .send(SessionCommand::StartNextRound {
            player_id: actor.human_id,
        })
        .await
        .unwrap();
    flush(&actor).await;

    assert!(error_codes(&h.bus).contains(&ErrorCode::RoundInProgress));
    assert_eq!(
        h.bus
            .count_matching(|e| matches!(e, GameEvent::RoundStarted { .. })),
        1,
        "no second round may be appended"
    );
}

#[tokio::test]
async fn non_owner_cannot_start_round() {
    let h = harness(Arc::new(PendingLlmGateway));
    let actor = spawn_actor(&h);

    join(&actor, actor.human_id).await;
    actor
        .tx
        .send(SessionCommand::StartNextRound {
            player_id: Uuid::new_v4(),
        })
        .await
        .unwrap();
    flush(&actor).await;

    assert!(error_codes(&h.bus).contains(&ErrorCode::Forbidden));
    assert_eq!(
        h.bus
            .count_matching(|e| matches!(e, GameEvent::RoundStarted { .. })),
        0
    );
}

#[tokio::test]
async fn rejoin_replays_round_snapshot() {
    let h = harness(Arc::new(PendingLlmGateway));
    let actor = spawn_actor(&h);

    join(&actor, actor.human_id).await;
    let (round_id, nonce) = start_round(&actor, &h.bus).await;

    let rejoin = join(&actor, actor.human_id).await;
    match rejoin {
        JoinResponse::Accepted {
            round_snapshot: Some(GameEvent::RoundStarted {
                round_id: snapshot_round,
                nonce_token,
                ..
            }),
        } => {
            assert_eq!(snapshot_round, round_id);
            assert_eq!(nonce_token, nonce);
        }
        other => panic!("expected round snapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn different_player_join_is_rejected() {
    let h = harness(Arc::new(PendingLlmGateway));
    let actor = spawn_actor(&h);

    join(&actor, actor.human_id).await;
    let response = join(&actor, Uuid::new_v4()).await;
    match response {
        JoinResponse::Rejected { code, .. } => assert_eq!(code, ErrorCode::SessionTaken),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(
        h.bus
            .count_matching(|e| matches!(e, GameEvent::SessionCreated { .. })),
        1
    );
}

#[tokio::test]
async fn llm_answer_locks_in_then_reveals_after_human_submits() {
    let gateway = ScriptedLlmGateway::new(vec![
        LlmStreamEvent::ReasoningDelta {
            delta_text: "thinking about it".to_string(),
            emitted_token_count: 4,
            total_token_count: 4,
        },
        LlmStreamEvent::FinalAnswer {
            answer: LlmAnswer::of(Answer::multiple_choice(0)),
        },
    ]);
    let h = harness(Arc::new(gateway));
    let actor = spawn_actor(&h);

    join(&actor, actor.human_id).await;
    let (round_id, nonce) = start_round(&actor, &h.bus).await;

    // Drive the LLM directly instead of waiting out the handicap timer.
    actor
        .tx
        .send(SessionCommand::StartLlmForRound { round_id })
        .await
        .unwrap();

    wait_for_events(&h.bus, |events| {
        events
            .iter()
            .any(|e| matches!(e, GameEvent::LlmAnswerLockIn { .. }))
    })
    .await;

    // The final answer is withheld while the human is still thinking.
    assert_eq!(
        h.bus
            .count_matching(|e| matches!(e, GameEvent::LlmFinalAnswer { .. })),
        0,
        "final answer must not leak before the human submits"
    );

    actor
        .tx
        .send(submit(&actor, round_id, &nonce, Answer::multiple_choice(0)))
        .await
        .unwrap();

    wait_for_events(&h.bus, |events| {
        events
            .iter()
            .any(|e| matches!(e, GameEvent::RoundResolved { .. }))
    })
    .await;

    let events = h.bus.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, GameEvent::LlmFinalAnswer { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, GameEvent::LlmReasoningReveal { .. })));
    let resolved = events
        .iter()
        .find_map(|e| match e {
            GameEvent::RoundResolved {
                human_correct,
                llm_correct,
                reason,
                ..
            } => Some((*human_correct, *llm_correct, *reason)),
            _ => None,
        })
        .expect("round resolved");
    assert_eq!(resolved, (true, true, RoundResolveReason::Normal));
}

#[tokio::test]
async fn idempotent_llm_start_spawns_one_stream() {
    let gateway = ScriptedLlmGateway::new(vec![LlmStreamEvent::FinalAnswer {
        answer: LlmAnswer::of(Answer::multiple_choice(0)),
    }]);
    let h = harness(Arc::new(gateway));
    let actor = spawn_actor(&h);

    join(&actor, actor.human_id).await;
    let (round_id, _) = start_round(&actor, &h.bus).await;

    for _ in 0..3 {
        actor
            .tx
            .send(SessionCommand::StartLlmForRound { round_id })
            .await
            .unwrap();
    }
    wait_for_events(&h.bus, |events| {
        events
            .iter()
            .any(|e| matches!(e, GameEvent::LlmAnswerLockIn { .. }))
    })
    .await;
    flush(&actor).await;

    assert_eq!(
        h.bus
            .count_matching(|e| matches!(e, GameEvent::LlmThinking { .. })),
        1,
        "repeated start commands must not relaunch the stream"
    );
    assert_eq!(
        h.bus.count_matching(|e| matches!(
            e,
            GameEvent::SubmissionReceived {
                player_type: PlayerType::Llm,
                ..
            }
        )),
        1
    );
}

#[tokio::test]
async fn deadline_force_resolves_with_timeover_reason() {
    let h = harness(Arc::new(PendingLlmGateway));
    let actor = spawn_actor(&h);

    join(&actor, actor.human_id).await;
    let (round_id, _) = start_round(&actor, &h.bus).await;

    h.clock.advance(Duration::from_secs(7_200));
    actor
        .tx
        .send(SessionCommand::RoundDeadlineReached { round_id })
        .await
        .unwrap();
    flush(&actor).await;

    let resolved = h
        .bus
        .events()
        .iter()
        .find_map(|e| match e {
            GameEvent::RoundResolved {
                reason,
                human_score,
                llm_score,
                ..
            } => Some((*reason, *human_score, *llm_score)),
            _ => None,
        })
        .expect("forced resolution");
    assert_eq!(resolved.0, RoundResolveReason::TimeoverBoth);
    assert_eq!(resolved.1, 0.0);
    assert_eq!(resolved.2, 0.0);
}

#[tokio::test]
async fn completing_all_rounds_resolves_session_and_saves_result() {
    let gateway = ScriptedLlmGateway::new(vec![LlmStreamEvent::FinalAnswer {
        answer: LlmAnswer::of(Answer::multiple_choice(1)),
    }]);
    let h = harness(Arc::new(gateway));
    let actor = spawn_actor(&h);

    join(&actor, actor.human_id).await;
    for _ in 0..3 {
        let (round_id, nonce) = start_round(&actor, &h.bus).await;
        actor
            .tx
            .send(SessionCommand::StartLlmForRound { round_id })
            .await
            .unwrap();
        wait_for_events(&h.bus, |events| {
            events.iter().any(|e| {
                matches!(e, GameEvent::LlmAnswerLockIn { round_id: r, .. } if *r == round_id)
            })
        })
        .await;
        actor
            .tx
            .send(submit(&actor, round_id, &nonce, Answer::multiple_choice(0)))
            .await
            .unwrap();
        wait_for_events(&h.bus, |events| {
            events.iter().any(|e| {
                matches!(e, GameEvent::RoundResolved { round_id: r, .. } if *r == round_id)
            })
        })
        .await;
    }

    wait_for_events(&h.bus, |events| {
        events
            .iter()
            .any(|e| matches!(e, GameEvent::SessionCompleted { .. }))
    })
    .await;

    let events = h.bus.events();
    // Human answered correctly (index 0) every round, the LLM never did.
    let completed = events
        .iter()
        .find_map(|e| match e {
            GameEvent::SessionCompleted {
                human_total_score,
                llm_total_score,
                human_won,
                ..
            } => Some((*human_total_score, *llm_total_score, *human_won)),
            _ => None,
        })
        .expect("session completed");
    assert!(completed.0 > completed.1);
    assert!(completed.2);

    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, GameEvent::SessionResolved { .. }))
            .count(),
        1,
        "the terminal summary is emitted exactly once"
    );

    let saved = h.results.all();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].human_won);

    // A fourth round can no longer start.
    actor
        .tx
        .send(SessionCommand::StartNextRound {
            player_id: actor.human_id,
        })
        .await
        .unwrap();
    flush(&actor).await;
    let codes = error_codes(&h.bus);
    assert!(codes.contains(&ErrorCode::SessionInactive) || codes.contains(&ErrorCode::NoMoreRounds));
}

#[tokio::test]
async fn timeout_cancels_session_and_notifies_manager() {
    let h = harness(Arc::new(PendingLlmGateway));
    let mut actor = spawn_actor(&h);

    join(&actor, actor.human_id).await;
    actor
        .tx
        .send(SessionCommand::Timeout {
            reason: "timeout".to_string(),
        })
        .await
        .unwrap();

    wait_for_events(&h.bus, |events| {
        events
            .iter()
            .any(|e| matches!(e, GameEvent::SessionTerminated { .. }))
    })
    .await;

    let events = h.bus.events();
    assert!(events.iter().any(|e| matches!(
        e,
        GameEvent::SessionResolved { reason, .. } if reason == "timeout"
    )));

    let removed = actor.removals.recv().await;
    assert_eq!(removed, Some(actor.session_id));
}
