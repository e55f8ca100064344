//! Results of manager-level session operations.

use chrono::{DateTime, Utc};

use crate::domain::{ErrorCode, GameEvent, PlayerId, SessionId};

/// Result of attempting to join (or create) a game session.
#[derive(Debug)]
pub enum JoinResult {
    Success {
        session_id: SessionId,
        player_id: PlayerId,
        opponent_spec_id: String,
        nickname: String,
        /// `RoundStarted` replay when rejoining mid-round.
        round_snapshot: Option<GameEvent>,
    },
    Failure {
        session_id: Option<SessionId>,
        code: ErrorCode,
        message: String,
    },
}

impl JoinResult {
    pub(crate) fn failure(
        session_id: Option<SessionId>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        JoinResult::Failure {
            session_id,
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JoinResult::Success { .. })
    }
}

/// Result of forwarding a command (start round, submit answer).
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    Accepted {
        session_id: SessionId,
    },
    Rejected {
        session_id: SessionId,
        code: ErrorCode,
        message: String,
    },
}

/// Result of refreshing a session's idle timeout.
#[derive(Debug, PartialEq, Eq)]
pub enum TouchResult {
    Success,
    SessionNotFound,
}

/// Snapshot of a player's active session for external queries.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSessionSnapshot {
    pub session_id: SessionId,
    pub opponent_spec_id: String,
    pub created_at: DateTime<Utc>,
}
