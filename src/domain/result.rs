//! The persisted summary of a completed match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::question::Difficulty;
use super::session::GameMode;
use super::{PlayerId, SessionId};

/// Best-effort record saved through the results repository when a session
/// completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: SessionId,
    pub game_mode: GameMode,
    pub difficulty: Difficulty,
    pub llm_profile_name: String,
    pub human_nickname: String,
    pub human_user_id: PlayerId,
    pub human_score: f64,
    pub llm_score: f64,
    pub human_won: bool,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}
