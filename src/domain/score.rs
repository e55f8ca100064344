//! Round scoring: outcome types, the pluggable score policy, and the
//! handicap policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::answer::Answer;
use super::question::{Difficulty, Question};
use super::round::Round;
use super::session::GameMode;

/// Why a round was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundResolveReason {
    /// Both players submitted before the deadline.
    Normal,
    /// Neither player submitted before the deadline.
    TimeoverBoth,
    /// Only the LLM failed to submit before the deadline.
    TimeoverLlm,
    /// Only the human failed to submit before the deadline.
    TimeoverHuman,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub correctness_points: f64,
    pub speed_bonus: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.correctness_points + self.speed_bonus
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub points: f64,
    pub breakdown: ScoreBreakdown,
}

impl Score {
    pub fn zero() -> Self {
        Self {
            points: 0.0,
            breakdown: ScoreBreakdown {
                correctness_points: 0.0,
                speed_bonus: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerOutcome {
    pub correct: bool,
    pub response_time_ms: u64,
    pub score: Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Human,
    Llm,
    Tie,
    None,
}

/// The settled outcome of a round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundResult {
    pub correct_answer: Answer,
    pub human_outcome: PlayerOutcome,
    pub llm_outcome: PlayerOutcome,
    pub winner: Winner,
    pub reason: RoundResolveReason,
}

// ============================================================================
// Score Policy
// ============================================================================

/// Pluggable scoring: turns verified correctness and timing into a
/// [`RoundResult`]. The engine depends only on this trait, not on the
/// arithmetic of any particular implementation.
pub trait ScorePolicy: Send + Sync {
    fn compute(
        &self,
        round: &Round,
        correct_answer: Answer,
        human_correct: bool,
        llm_correct: bool,
        reason: RoundResolveReason,
    ) -> RoundResult;
}

/// Default policy: flat points for correctness plus a linear speed bonus,
/// winner decided by correctness first, then speed.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardScorePolicy;

impl StandardScorePolicy {
    const CORRECT_ANSWER_POINTS: f64 = 100.0;
    const MAX_SPEED_BONUS: f64 = 50.0;
    /// Floor for the speed-bonus reference window, so very short handicaps
    /// do not make the bonus vanish for normal response times.
    const MIN_BONUS_WINDOW: Duration = Duration::from_secs(30);

    fn score_for(&self, correct: bool, response_time: Duration, handicap: Duration) -> Score {
        let correctness_points = if correct {
            Self::CORRECT_ANSWER_POINTS
        } else {
            0.0
        };

        // Speed bonus only for correct answers.
        let speed_bonus = if correct {
            let window = handicap.max(Self::MIN_BONUS_WINDOW);
            let fraction =
                1.0 - (response_time.as_millis() as f64 / window.as_millis() as f64).clamp(0.0, 1.0);
            Self::MAX_SPEED_BONUS * fraction
        } else {
            0.0
        };

        let breakdown = ScoreBreakdown {
            correctness_points,
            speed_bonus,
        };
        Score {
            points: breakdown.total(),
            breakdown,
        }
    }

    fn winner_for(
        human_correct: bool,
        llm_correct: bool,
        human_time: Duration,
        llm_time: Duration,
    ) -> Winner {
        match (human_correct, llm_correct) {
            (true, false) => Winner::Human,
            (false, true) => Winner::Llm,
            (true, true) => {
                if human_time < llm_time {
                    Winner::Human
                } else if llm_time < human_time {
                    Winner::Llm
                } else {
                    Winner::Tie
                }
            }
            (false, false) => Winner::None,
        }
    }
}

impl ScorePolicy for StandardScorePolicy {
    fn compute(
        &self,
        round: &Round,
        correct_answer: Answer,
        human_correct: bool,
        llm_correct: bool,
        reason: RoundResolveReason,
    ) -> RoundResult {
        let human_time = round
            .human_submission
            .as_ref()
            .map(|s| s.response_time_from(round.released_at))
            .unwrap_or(Duration::ZERO);
        let llm_time = round
            .llm_submission
            .as_ref()
            .map(|s| s.response_time_from(round.released_at))
            .unwrap_or(Duration::ZERO);

        let human_score = self.score_for(human_correct, human_time, round.handicap);
        let llm_score = self.score_for(llm_correct, llm_time, round.handicap);

        RoundResult {
            correct_answer,
            human_outcome: PlayerOutcome {
                correct: human_correct,
                response_time_ms: human_time.as_millis() as u64,
                score: human_score,
            },
            llm_outcome: PlayerOutcome {
                correct: llm_correct,
                response_time_ms: llm_time.as_millis() as u64,
                score: llm_score,
            },
            winner: Self::winner_for(human_correct, llm_correct, human_time, llm_time),
            reason,
        }
    }
}

// ============================================================================
// Handicap Policy
// ============================================================================

/// Computes the head start granted to the human before the LLM may start
/// answering, scaled by question difficulty.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandicapPolicy;

impl HandicapPolicy {
    const BASE_HANDICAP: Duration = Duration::from_secs(1);

    fn difficulty_multiplier(difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Easy => 17.5,
            Difficulty::Medium => 25.0,
            Difficulty::Hard => 37.0,
        }
    }

    pub fn compute_handicap(question: &Question, mode: GameMode) -> Duration {
        // Same base for both modes today; kept per-mode so premium opponents
        // can be tuned independently.
        let base = match mode {
            GameMode::Lightweight | GameMode::Premium => Self::BASE_HANDICAP,
        };
        base.mul_f64(Self::difficulty_multiplier(question.difficulty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::answer::VerifierSpec;
    use chrono::Utc;
    use uuid::Uuid;

    fn round_with(
        released_ago: Duration,
        human_at: Option<Duration>,
        llm_at: Option<Duration>,
    ) -> Round {
        let released_at = Utc::now() - chrono::Duration::from_std(released_ago).unwrap();
        let submission = |offset: Duration| super::super::round::Submission {
            submission_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            answer: Answer::multiple_choice(0),
            server_received_at: released_at + chrono::Duration::from_std(offset).unwrap(),
            client_sent_at: None,
        };
        Round {
            round_id: Uuid::new_v4(),
            question: Question {
                question_id: Uuid::new_v4(),
                prompt: "q".into(),
                choices: None,
                difficulty: Difficulty::Medium,
                verifier_spec: VerifierSpec::MultipleChoice { correct_index: 0 },
                metadata: None,
            },
            released_at,
            handicap: Duration::from_secs(25),
            deadline: released_at + chrono::Duration::seconds(85),
            nonce_token: Uuid::new_v4().to_string(),
            human_submission: human_at.map(submission),
            llm_submission: llm_at.map(submission),
            result: None,
        }
    }

    #[test]
    fn correct_beats_incorrect() {
        let round = round_with(
            Duration::from_secs(60),
            Some(Duration::from_secs(10)),
            Some(Duration::from_secs(5)),
        );
        let result = StandardScorePolicy.compute(
            &round,
            Answer::multiple_choice(0),
            true,
            false,
            RoundResolveReason::Normal,
        );
        assert_eq!(result.winner, Winner::Human);
        assert!(result.human_outcome.score.points > result.llm_outcome.score.points);
        assert_eq!(result.llm_outcome.score.points, 0.0);
    }

    #[test]
    fn both_correct_faster_wins() {
        let round = round_with(
            Duration::from_secs(60),
            Some(Duration::from_secs(20)),
            Some(Duration::from_secs(5)),
        );
        let result = StandardScorePolicy.compute(
            &round,
            Answer::multiple_choice(0),
            true,
            true,
            RoundResolveReason::Normal,
        );
        assert_eq!(result.winner, Winner::Llm);
        assert!(result.llm_outcome.score.points > result.human_outcome.score.points);
    }

    #[test]
    fn both_wrong_no_winner() {
        let round = round_with(
            Duration::from_secs(60),
            Some(Duration::from_secs(1)),
            Some(Duration::from_secs(1)),
        );
        let result = StandardScorePolicy.compute(
            &round,
            Answer::multiple_choice(0),
            false,
            false,
            RoundResolveReason::Normal,
        );
        assert_eq!(result.winner, Winner::None);
        assert_eq!(result.human_outcome.score.points, 0.0);
    }

    #[test]
    fn handicap_scales_with_difficulty() {
        let mut question = round_with(Duration::ZERO, None, None).question;
        question.difficulty = Difficulty::Easy;
        let easy = HandicapPolicy::compute_handicap(&question, GameMode::Lightweight);
        question.difficulty = Difficulty::Hard;
        let hard = HandicapPolicy::compute_handicap(&question, GameMode::Lightweight);
        assert!(hard > easy);
        assert_eq!(easy, Duration::from_millis(17_500));
        assert_eq!(hard, Duration::from_secs(37));
    }
}
