//! Commands processed by a session actor's mailbox.
//!
//! External callers reach the actor only through these messages; scheduled
//! and LLM-stream continuations re-enter through the same mailbox so every
//! state mutation is serialized.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::domain::{Answer, ErrorCode, GameEvent, PlayerId, RoundId};
use crate::llm::LlmAnswer;

pub enum SessionCommand {
    /// First join creates the session; the same player may rejoin to
    /// recover state.
    JoinSession {
        player_id: PlayerId,
        nickname: String,
        reply: oneshot::Sender<JoinResponse>,
    },
    StartNextRound {
        player_id: PlayerId,
    },
    SubmitAnswer {
        player_id: PlayerId,
        round_id: RoundId,
        nonce_token: String,
        answer: Answer,
        client_sent_at: Option<DateTime<Utc>>,
    },

    // Internal continuations (scheduled tasks and the LLM stream task).
    StartLlmForRound {
        round_id: RoundId,
    },
    LlmReasoningDelta {
        round_id: RoundId,
        delta_text: String,
    },
    LlmReasoningTruncated {
        round_id: RoundId,
        dropped_chars: usize,
    },
    LlmReasoningEnded {
        round_id: RoundId,
    },
    LlmFinalAnswerReceived {
        round_id: RoundId,
        answer: LlmAnswer,
    },
    LlmStreamErrored {
        round_id: RoundId,
        message: String,
    },
    RoundDeadlineReached {
        round_id: RoundId,
    },

    /// Terminate a live session (idle timeout, max lifespan, owner action).
    Timeout {
        reason: String,
    },
    /// Tear down after the post-completion grace period.
    Shutdown {
        reason: String,
    },
}

/// Direct reply to a `JoinSession` command.
#[derive(Debug)]
pub enum JoinResponse {
    Accepted {
        /// `RoundStarted` replay for a rejoin while a round is open.
        round_snapshot: Option<GameEvent>,
    },
    Rejected {
        code: ErrorCode,
        message: String,
    },
}
