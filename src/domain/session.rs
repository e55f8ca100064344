//! The `GameSession` aggregate: one match between a human and an LLM.
//!
//! A session is owned exclusively by its session actor; all methods here
//! assume single-threaded access from that actor. Command validation lives
//! on the aggregate so rejections can be unit-tested without a runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::answer::Answer;
use super::error::{CommandRejection, ErrorCode};
use super::player::{PlayerSet, PlayerType};
use super::round::{Round, Submission};
use super::score::RoundResult;
use super::opponent::LlmProfile;
use super::{PlayerId, QuestionId, RoundId, SessionId};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, no round started yet.
    Waiting,
    /// At least one round started.
    InProgress,
    /// All rounds resolved.
    Completed,
    /// Terminated before completion (explicit or timeout).
    Cancelled,
}

/// Game mode, which selects capacity and rate-limit budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Precomputed LLM outputs, cheap to run.
    Lightweight,
    /// Live LLM provider calls.
    Premium,
}

impl GameMode {
    pub fn label(&self) -> &'static str {
        match self {
            GameMode::Lightweight => "lightweight",
            GameMode::Premium => "premium",
        }
    }
}

/// One match between a human player and an LLM opponent.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub session_id: SessionId,
    pub join_code: String,
    pub mode: GameMode,
    pub llm_profile: LlmProfile,
    pub players: PlayerSet,
    pub rounds: Vec<Round>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl GameSession {
    pub const TOTAL_ROUNDS: usize = 3;

    /// The currently open round, if any. At most one round is ever open.
    pub fn current_round(&self) -> Option<&Round> {
        self.rounds.iter().rev().find(|r| r.is_in_progress())
    }

    pub fn round(&self, round_id: RoundId) -> Option<&Round> {
        self.rounds.iter().find(|r| r.round_id == round_id)
    }

    fn round_mut(&mut self, round_id: RoundId) -> Option<&mut Round> {
        self.rounds.iter_mut().find(|r| r.round_id == round_id)
    }

    pub fn is_completed(&self) -> bool {
        self.rounds.len() == Self::TOTAL_ROUNDS && self.rounds.iter().all(|r| !r.is_in_progress())
    }

    pub fn rounds_played(&self) -> usize {
        self.rounds.iter().filter(|r| r.result.is_some()).count()
    }

    pub fn used_question_ids(&self) -> Vec<QuestionId> {
        self.rounds.iter().map(|r| r.question.question_id).collect()
    }

    /// Sum of per-round points for (human, llm).
    pub fn total_scores(&self) -> (f64, f64) {
        self.rounds
            .iter()
            .filter_map(|r| r.result.as_ref())
            .fold((0.0, 0.0), |(h, l), result| {
                (
                    h + result.human_outcome.score.points,
                    l + result.llm_outcome.score.points,
                )
            })
    }

    /// Validates that a new round may be started by `player_id`.
    pub fn ensure_can_start_round(&self, player_id: PlayerId) -> Result<(), CommandRejection> {
        if self.players.human.player_id != player_id {
            return Err(CommandRejection::new(
                ErrorCode::Forbidden,
                "player cannot start round",
            ));
        }
        if matches!(self.state, SessionState::Completed | SessionState::Cancelled) {
            return Err(CommandRejection::new(
                ErrorCode::SessionInactive,
                "session is not active",
            ));
        }
        if self.current_round().is_some() {
            return Err(CommandRejection::new(
                ErrorCode::RoundInProgress,
                "round is already in progress",
            ));
        }
        if self.rounds.len() >= Self::TOTAL_ROUNDS {
            return Err(CommandRejection::new(
                ErrorCode::NoMoreRounds,
                "no more rounds available",
            ));
        }
        Ok(())
    }

    /// Appends a freshly started round. Caller must have passed
    /// [`ensure_can_start_round`](Self::ensure_can_start_round).
    pub fn begin_round(&mut self, round: Round) {
        self.rounds.push(round);
        self.state = SessionState::InProgress;
    }

    /// Records one player's answer for a round.
    ///
    /// Rejections leave the session untouched. The human deadline is checked
    /// against the injected `now`, never wall time.
    pub fn submit_answer(
        &mut self,
        player_id: PlayerId,
        round_id: RoundId,
        nonce_token: &str,
        answer: Answer,
        client_sent_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<PlayerType, CommandRejection> {
        let player_type = self
            .players
            .find_by_id(player_id)
            .map(|p| p.player_type)
            .ok_or_else(|| CommandRejection::new(ErrorCode::PlayerNotFound, "player not found"))?;

        let round = self
            .rounds
            .iter()
            .find(|r| r.round_id == round_id)
            .ok_or_else(|| CommandRejection::new(ErrorCode::RoundNotFound, "round not found"))?;

        if !round.is_in_progress() {
            return Err(CommandRejection::new(
                ErrorCode::RoundClosed,
                "round is not in progress",
            ));
        }
        if round.nonce_token != nonce_token {
            return Err(CommandRejection::new(
                ErrorCode::InvalidNonce,
                "nonce token mismatch",
            ));
        }
        if player_type == PlayerType::Human && now > round.deadline {
            return Err(CommandRejection::new(
                ErrorCode::DeadlinePassed,
                "round deadline has passed",
            ));
        }
        let already = match player_type {
            PlayerType::Human => round.human_submission.is_some(),
            PlayerType::Llm => round.llm_submission.is_some(),
        };
        if already {
            return Err(CommandRejection::new(
                ErrorCode::AlreadySubmitted,
                "submission already received",
            ));
        }

        let submission = Submission {
            submission_id: Uuid::new_v4(),
            player_id,
            answer,
            server_received_at: now,
            client_sent_at,
        };
        // Re-borrow mutably; existence was checked above.
        if let Some(round) = self.round_mut(round_id) {
            match player_type {
                PlayerType::Human => round.human_submission = Some(submission),
                PlayerType::Llm => round.llm_submission = Some(submission),
            }
        }
        Ok(player_type)
    }

    /// Seals a round with its result and updates the session state.
    ///
    /// A no-op if the round is unknown or already resolved (resolving twice
    /// is an invariant violation that must not corrupt state).
    pub fn seal_round(&mut self, round_id: RoundId, result: RoundResult) {
        match self.round_mut(round_id) {
            Some(round) if round.result.is_none() => round.result = Some(result),
            _ => return,
        }
        if self.is_completed() {
            self.state = SessionState::Completed;
        }
    }

    /// Replaces a round wholesale (deadline force-resolution fills missing
    /// submissions). Same defensive semantics as [`seal_round`](Self::seal_round).
    pub fn replace_round(&mut self, round: Round) {
        let round_id = round.round_id;
        match self.round_mut(round_id) {
            Some(existing) if existing.result.is_none() => *existing = round,
            _ => return,
        }
        if self.is_completed() {
            self.state = SessionState::Completed;
        }
    }
}
