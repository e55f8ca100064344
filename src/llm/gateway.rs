//! The port through which the engine obtains an LLM opponent's answer
//! stream. Concrete providers (live APIs, precomputed datasets) live
//! outside the match engine.

use crate::domain::{ExpectedAnswerKind, OpponentSpec, QuestionId};

use super::events::LlmEventStream;

/// Everything a provider needs to answer one round.
#[derive(Debug, Clone)]
pub struct RoundContext {
    pub question_id: QuestionId,
    pub question_prompt: String,
    pub choices: Option<Vec<String>>,
    pub expected_answer_kind: ExpectedAnswerKind,
    pub opponent_spec: OpponentSpec,
}

/// Streams the LLM's answer for a round.
pub trait LlmGateway: Send + Sync {
    fn stream_answer(&self, ctx: RoundContext) -> LlmEventStream;
}
