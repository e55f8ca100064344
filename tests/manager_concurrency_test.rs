//! Concurrency and security tests for the session manager: creation
//! floods, same-id races, hijack attempts and capacity recycling.

mod common;

use std::sync::Arc;

use futures::future;
use uuid::Uuid;

use common::{harness, PendingLlmGateway};
use quizbout::admission::ClientIdentity;
use quizbout::config::{ModeLimitConfig, SessionLimitConfig};
use quizbout::domain::{ErrorCode, GameMode, InMemoryOpponentSpecs};
use quizbout::session::{CommandResult, JoinResult, SessionManager};

fn limits(lightweight: ModeLimitConfig) -> SessionLimitConfig {
    SessionLimitConfig {
        lightweight,
        ..SessionLimitConfig::default()
    }
}

fn open_mode_limits(max_active: i64) -> ModeLimitConfig {
    ModeLimitConfig {
        max_active_sessions: max_active,
        per_person_daily_limit: 0,
        per_person_window_limit: 0,
        per_person_window_ms: 0,
        global_window_limit: 0,
        global_window_ms: 0,
        global_daily_limit: 0,
    }
}

fn manager_with(config: SessionLimitConfig) -> SessionManager {
    let h = harness(Arc::new(PendingLlmGateway));
    let specs = Arc::new(InMemoryOpponentSpecs::new(vec![common::opponent_spec(
        "spec-1",
        GameMode::Lightweight,
    )]));
    SessionManager::new(config, specs, h.ctx)
}

fn identity(ip: &str) -> ClientIdentity {
    ClientIdentity {
        player_id: Uuid::new_v4(),
        ip_address: ip.to_string(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn creation_flood_caps_active_sessions() {
    const ACTIVE_LIMIT: i64 = 5;
    let manager = manager_with(limits(ModeLimitConfig {
        per_person_window_limit: 100,
        per_person_window_ms: 60_000,
        ..open_mode_limits(ACTIVE_LIMIT)
    }));

    let attacker_ip = "192.168.1.66";
    let attempts = (0..20).map(|_| {
        let manager = manager.clone();
        let identity = identity(attacker_ip);
        tokio::spawn(async move {
            manager
                .join_session(Some(Uuid::new_v4()), &identity, "Attacker", "spec-1")
                .await
        })
    });
    let results: Vec<JoinResult> = future::join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(successes, ACTIVE_LIMIT as usize, "capacity caps creations");

    let failures: Vec<_> = results
        .iter()
        .filter_map(|r| match r {
            JoinResult::Failure { code, .. } => Some(*code),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 15);
    assert!(failures
        .iter()
        .all(|code| *code == ErrorCode::SessionLimitExceeded));

    manager.shutdown_all();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_session_id_race_has_single_winner() {
    let manager = manager_with(limits(open_mode_limits(0)));
    let target = Uuid::new_v4();

    let a = {
        let manager = manager.clone();
        let identity = identity("1.1.1.1");
        tokio::spawn(
            async move { manager.join_session(Some(target), &identity, "P1", "spec-1").await },
        )
    };
    let b = {
        let manager = manager.clone();
        let identity = identity("2.2.2.2");
        tokio::spawn(
            async move { manager.join_session(Some(target), &identity, "P2", "spec-1").await },
        )
    };

    let results = vec![a.await.unwrap(), b.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(successes, 1, "exactly one player owns the session");

    let failure_code = results
        .iter()
        .find_map(|r| match r {
            JoinResult::Failure { code, .. } => Some(*code),
            _ => None,
        })
        .expect("one failure");
    assert!(
        matches!(
            failure_code,
            ErrorCode::SessionTaken | ErrorCode::SessionCreating | ErrorCode::SessionNotOwned
        ),
        "unexpected code {failure_code:?}"
    );

    manager.shutdown_all();
}

#[tokio::test]
async fn hijack_and_terminate_by_non_owner_is_prevented() {
    let manager = manager_with(limits(open_mode_limits(0)));
    let player_a = identity("1.1.1.1");
    let player_b = identity("2.2.2.2");

    let created = manager
        .join_session(None, &player_a, "PlayerA", "spec-1")
        .await;
    let JoinResult::Success { session_id, .. } = created else {
        panic!("player A should create a session");
    };

    // Player B tries to claim A's session id.
    let hijack = manager
        .join_session(Some(session_id), &player_b, "PlayerB", "spec-1")
        .await;
    match hijack {
        JoinResult::Failure { code, .. } => assert_eq!(code, ErrorCode::SessionNotOwned),
        other => panic!("hijack must fail, got {other:?}"),
    }

    // B's termination attempt must not touch A's session.
    let terminated = manager.terminate_active_session_by_owner(player_b.player_id);
    assert!(terminated.is_none() || terminated != Some(session_id));

    let active = manager.get_active_session(player_a.player_id, Some(session_id));
    assert!(active.is_some(), "player A's session must survive");

    manager.shutdown_all();
}

#[tokio::test]
async fn owner_termination_releases_capacity() {
    let manager = manager_with(limits(open_mode_limits(1)));
    let player_a = identity("1.1.1.1");
    let player_b = identity("2.2.2.2");

    let created = manager
        .join_session(None, &player_a, "PlayerA", "spec-1")
        .await;
    assert!(created.is_success());

    // The mode is at capacity.
    let denied = manager
        .join_session(None, &player_b, "PlayerB", "spec-1")
        .await;
    match denied {
        JoinResult::Failure { code, .. } => assert_eq!(code, ErrorCode::SessionLimitExceeded),
        other => panic!("expected capacity denial, got {other:?}"),
    }

    // Owner termination closes the permit, freeing the slot.
    let terminated = manager.terminate_active_session_by_owner(player_a.player_id);
    assert!(terminated.is_some());

    let retried = manager
        .join_session(None, &player_b, "PlayerB", "spec-1")
        .await;
    assert!(retried.is_success(), "released capacity must be reusable");

    manager.shutdown_all();
}

#[tokio::test]
async fn short_window_rate_limit_denies_with_rate_limited() {
    let manager = manager_with(limits(ModeLimitConfig {
        per_person_window_limit: 1,
        per_person_window_ms: 60_000,
        ..open_mode_limits(0)
    }));

    let shared_ip = "6.6.6.6";
    let first = manager
        .join_session(None, &identity(shared_ip), "P1", "spec-1")
        .await;
    assert!(first.is_success());

    // Different player, same IP, inside the window.
    let second = manager
        .join_session(None, &identity(shared_ip), "P2", "spec-1")
        .await;
    match second {
        JoinResult::Failure { code, .. } => assert_eq!(code, ErrorCode::RateLimited),
        other => panic!("expected rate limit, got {other:?}"),
    }

    manager.shutdown_all();
}

#[tokio::test]
async fn player_with_active_session_resumes_it() {
    let manager = manager_with(limits(open_mode_limits(0)));
    let player = identity("1.1.1.1");

    let created = manager.join_session(None, &player, "P", "spec-1").await;
    let JoinResult::Success { session_id, .. } = created else {
        panic!("creation failed");
    };

    // Joining again without an id resumes the same session.
    let resumed = manager.join_session(None, &player, "P", "spec-1").await;
    match resumed {
        JoinResult::Success {
            session_id: resumed_id,
            ..
        } => assert_eq!(resumed_id, session_id),
        other => panic!("expected resume, got {other:?}"),
    }
    assert_eq!(manager.active_session_count(), 1);

    // A different explicit id is refused while the session lives.
    let conflicting = manager
        .join_session(Some(Uuid::new_v4()), &player, "P", "spec-1")
        .await;
    match conflicting {
        JoinResult::Failure { code, .. } => assert_eq!(code, ErrorCode::ActiveSessionExists),
        other => panic!("expected conflict, got {other:?}"),
    }

    manager.shutdown_all();
}

#[tokio::test]
async fn unknown_spec_and_unknown_session_are_rejected() {
    let manager = manager_with(limits(open_mode_limits(0)));
    let player = identity("1.1.1.1");

    let result = manager
        .join_session(None, &player, "P", "missing-spec")
        .await;
    match result {
        JoinResult::Failure { code, .. } => assert_eq!(code, ErrorCode::OpponentSpecNotFound),
        other => panic!("expected spec failure, got {other:?}"),
    }

    let forwarded = manager.start_next_round(Uuid::new_v4(), player.player_id);
    assert!(matches!(
        forwarded,
        CommandResult::Rejected {
            code: ErrorCode::SessionNotFound,
            ..
        }
    ));

    manager.shutdown_all();
}

#[tokio::test]
async fn get_active_session_clears_stale_bindings() {
    let manager = manager_with(limits(open_mode_limits(0)));
    let player = identity("1.1.1.1");

    let created = manager.join_session(None, &player, "P", "spec-1").await;
    let JoinResult::Success { session_id, .. } = created else {
        panic!("creation failed");
    };

    let snapshot = manager.get_active_session(player.player_id, None);
    assert_eq!(snapshot.map(|s| s.session_id), Some(session_id));

    manager.remove_session(session_id);
    assert!(manager.get_active_session(player.player_id, None).is_none());

    // The player can start fresh afterwards.
    let again = manager.join_session(None, &player, "P", "spec-1").await;
    assert!(again.is_success());

    manager.shutdown_all();
}
