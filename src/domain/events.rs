//! Domain events published to the per-session event bus.
//!
//! Delivery is fire-and-forget and at-most-once; slow subscribers may miss
//! events but never stall the actor.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::answer::{Answer, ExpectedAnswerKind};
use super::error::ErrorCode;
use super::player::PlayerType;
use super::score::{RoundResolveReason, Winner};
use super::session::SessionState;
use super::{PlayerId, QuestionId, RoundId, SessionId};
use crate::llm::LlmAnswer;

/// Everything a session broadcasts over its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    SessionCreated {
        session_id: SessionId,
        join_code: String,
    },
    PlayerJoined {
        session_id: SessionId,
        player_id: PlayerId,
        nickname: String,
    },
    RoundStarted {
        session_id: SessionId,
        round_id: RoundId,
        round_number: usize,
        question_id: QuestionId,
        question_prompt: String,
        choices: Option<Vec<String>>,
        expected_answer_kind: ExpectedAnswerKind,
        released_at: DateTime<Utc>,
        handicap_ms: u64,
        deadline_at: DateTime<Utc>,
        nonce_token: String,
    },
    SubmissionReceived {
        session_id: SessionId,
        round_id: RoundId,
        player_type: PlayerType,
    },
    /// The LLM's handicap elapsed and its stream is starting.
    LlmThinking {
        session_id: SessionId,
        round_id: RoundId,
    },
    LlmReasoningDelta {
        session_id: SessionId,
        round_id: RoundId,
        delta_text: String,
        seq: u64,
    },
    LlmReasoningTruncated {
        session_id: SessionId,
        round_id: RoundId,
        dropped_chars: usize,
    },
    /// Transition from reasoning to answer content.
    LlmReasoningEnded {
        session_id: SessionId,
        round_id: RoundId,
    },
    /// The LLM has locked in its answer while the human is still thinking.
    /// Emitted at most once per round.
    LlmAnswerLockIn {
        session_id: SessionId,
        round_id: RoundId,
    },
    LlmFinalAnswer {
        session_id: SessionId,
        round_id: RoundId,
        answer: LlmAnswer,
    },
    LlmStreamError {
        session_id: SessionId,
        round_id: RoundId,
        message: String,
    },
    /// Full reasoning transcript, replayed at round end so clients can
    /// replace any partial reveal.
    LlmReasoningReveal {
        session_id: SessionId,
        round_id: RoundId,
        full_reasoning: String,
    },
    RoundResolved {
        session_id: SessionId,
        round_id: RoundId,
        correct_answer: Answer,
        human_correct: bool,
        llm_correct: bool,
        human_score: f64,
        llm_score: f64,
        winner: Winner,
        reason: RoundResolveReason,
    },
    SessionCompleted {
        session_id: SessionId,
        human_total_score: f64,
        llm_total_score: f64,
        human_won: bool,
    },
    /// Authoritative terminal summary, emitted exactly once per session.
    SessionResolved {
        session_id: SessionId,
        state: SessionState,
        reason: String,
        human_total_score: f64,
        llm_total_score: f64,
        winner: MatchWinner,
        rounds_played: usize,
        total_rounds: usize,
        resolved_at: DateTime<Utc>,
        duration_ms: u64,
    },
    SessionTerminated {
        session_id: SessionId,
        reason: String,
    },
    SessionError {
        session_id: SessionId,
        error_code: ErrorCode,
        message: String,
    },
}

/// Overall match winner for the terminal summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchWinner {
    Human,
    Llm,
    Tie,
    /// Cancelled before any round resolved.
    None,
}

impl GameEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            GameEvent::SessionCreated { session_id, .. }
            | GameEvent::PlayerJoined { session_id, .. }
            | GameEvent::RoundStarted { session_id, .. }
            | GameEvent::SubmissionReceived { session_id, .. }
            | GameEvent::LlmThinking { session_id, .. }
            | GameEvent::LlmReasoningDelta { session_id, .. }
            | GameEvent::LlmReasoningTruncated { session_id, .. }
            | GameEvent::LlmReasoningEnded { session_id, .. }
            | GameEvent::LlmAnswerLockIn { session_id, .. }
            | GameEvent::LlmFinalAnswer { session_id, .. }
            | GameEvent::LlmStreamError { session_id, .. }
            | GameEvent::LlmReasoningReveal { session_id, .. }
            | GameEvent::RoundResolved { session_id, .. }
            | GameEvent::SessionCompleted { session_id, .. }
            | GameEvent::SessionResolved { session_id, .. }
            | GameEvent::SessionTerminated { session_id, .. }
            | GameEvent::SessionError { session_id, .. } => *session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn events_serialize_tagged() {
        let event = GameEvent::SessionError {
            session_id: Uuid::new_v4(),
            error_code: ErrorCode::InvalidNonce,
            message: "nonce token mismatch".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"session_error\""));
        assert!(json.contains("\"error_code\":\"invalid_nonce\""));
    }

    #[test]
    fn session_id_accessor_covers_variants() {
        let id = Uuid::new_v4();
        let event = GameEvent::LlmAnswerLockIn {
            session_id: id,
            round_id: Uuid::new_v4(),
        };
        assert_eq!(event.session_id(), id);
    }
}
