//! Rounds and player submissions.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::answer::Answer;
use super::question::Question;
use super::score::RoundResult;
use super::{PlayerId, RoundId, SubmissionId};

/// One submitted answer. Write-once per (round, player).
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub submission_id: SubmissionId,
    pub player_id: PlayerId,
    pub answer: Answer,
    pub server_received_at: DateTime<Utc>,
    pub client_sent_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// Time from round release to the server receiving this submission.
    pub fn response_time_from(&self, round_released_at: DateTime<Utc>) -> Duration {
        (self.server_received_at - round_released_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// One round of the match.
///
/// Created by the session actor on round start and mutated only by it.
/// Immutable once `result` is set.
#[derive(Debug, Clone)]
pub struct Round {
    pub round_id: RoundId,
    pub question: Question,
    pub released_at: DateTime<Utc>,
    /// Head start granted to the human before the LLM may begin answering.
    pub handicap: Duration,
    pub deadline: DateTime<Utc>,
    /// Single-use token a submission must echo back.
    pub nonce_token: String,
    pub human_submission: Option<Submission>,
    pub llm_submission: Option<Submission>,
    pub result: Option<RoundResult>,
}

impl Round {
    pub fn is_in_progress(&self) -> bool {
        self.result.is_none()
    }

    pub fn has_all_submissions(&self) -> bool {
        self.human_submission.is_some() && self.llm_submission.is_some()
    }
}
