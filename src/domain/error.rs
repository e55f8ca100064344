//! Stable error codes for command rejections and admission denials.
//!
//! Every rejected action surfaces to clients as one of these codes plus a
//! human-readable message. Codes are part of the wire contract and must
//! not change spelling once shipped.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of error codes emitted by the match engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Session actor command rejections
    SessionNotReady,
    SessionInactive,
    RoundInProgress,
    NoMoreRounds,
    NoQuestion,
    Forbidden,
    PlayerNotFound,
    RoundNotFound,
    RoundClosed,
    InvalidNonce,
    DeadlinePassed,
    AlreadySubmitted,
    SessionTaken,

    // Manager / creation rejections
    SessionNotFound,
    SessionNotOwned,
    SessionCreating,
    SessionCreationCancelled,
    ActiveSessionExists,
    OpponentSpecNotFound,
    OpponentMismatch,
    SessionBusy,
    JoinTimeout,

    // Admission denials
    SessionLimitExceeded,
    RateLimited,
}

impl ErrorCode {
    /// Wire spelling of the code (snake_case, matches the serde rename).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SessionNotReady => "session_not_ready",
            ErrorCode::SessionInactive => "session_inactive",
            ErrorCode::RoundInProgress => "round_in_progress",
            ErrorCode::NoMoreRounds => "no_more_rounds",
            ErrorCode::NoQuestion => "no_question",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::PlayerNotFound => "player_not_found",
            ErrorCode::RoundNotFound => "round_not_found",
            ErrorCode::RoundClosed => "round_closed",
            ErrorCode::InvalidNonce => "invalid_nonce",
            ErrorCode::DeadlinePassed => "deadline_passed",
            ErrorCode::AlreadySubmitted => "already_submitted",
            ErrorCode::SessionTaken => "session_taken",
            ErrorCode::SessionNotFound => "session_not_found",
            ErrorCode::SessionNotOwned => "session_not_owned",
            ErrorCode::SessionCreating => "session_creating",
            ErrorCode::SessionCreationCancelled => "session_creation_cancelled",
            ErrorCode::ActiveSessionExists => "active_session_exists",
            ErrorCode::OpponentSpecNotFound => "opponent_spec_not_found",
            ErrorCode::OpponentMismatch => "opponent_mismatch",
            ErrorCode::SessionBusy => "session_busy",
            ErrorCode::JoinTimeout => "join_timeout",
            ErrorCode::SessionLimitExceeded => "session_limit_exceeded",
            ErrorCode::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected command: stable code plus a client-displayable message.
///
/// Rejections are values, never panics, and never mutate session state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CommandRejection {
    pub code: ErrorCode,
    pub message: String,
}

impl CommandRejection {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
