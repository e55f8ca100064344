//! Domain model of a quiz match: sessions, rounds, answers, scoring and
//! the events they emit.

mod answer;
mod error;
mod events;
mod opponent;
mod player;
mod question;
mod result;
mod round;
mod score;
mod session;

pub use answer::{Answer, ExpectedAnswerKind, VerifierSpec};
pub use error::{CommandRejection, ErrorCode};
pub use events::{GameEvent, MatchWinner};
pub use opponent::{InMemoryOpponentSpecs, LlmProfile, OpponentSpec, OpponentSpecRepository};
pub use player::{Player, PlayerSet, PlayerType};
pub use question::{Difficulty, Question, QuestionConstraints, QuestionMetadata};
pub use result::SessionResult;
pub use round::{Round, Submission};
pub use score::{
    HandicapPolicy, PlayerOutcome, RoundResolveReason, RoundResult, Score, ScoreBreakdown,
    ScorePolicy, StandardScorePolicy, Winner,
};
pub use session::{GameMode, GameSession, SessionState};

/// Identifier aliases. All ids are random v4 UUIDs.
pub type SessionId = uuid::Uuid;
pub type PlayerId = uuid::Uuid;
pub type RoundId = uuid::Uuid;
pub type QuestionId = uuid::Uuid;
pub type SubmissionId = uuid::Uuid;
