//! Raw stream events produced by an LLM gateway for one round.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::domain::Answer;

/// The LLM's settled answer for a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmAnswer {
    pub final_answer: Answer,
    #[serde(default)]
    pub reasoning_summary: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

impl LlmAnswer {
    pub fn of(final_answer: Answer) -> Self {
        Self {
            final_answer,
            reasoning_summary: None,
            confidence_score: None,
        }
    }
}

/// One event on an LLM answer stream.
///
/// A well-formed stream carries any number of `ReasoningDelta`s, at most
/// one `ReasoningEnded`, and exactly one terminal (`FinalAnswer` or
/// `Error`). Anything after the terminal is discarded by consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmStreamEvent {
    ReasoningDelta {
        delta_text: String,
        /// Tokens represented by this chunk; drives pacing.
        emitted_token_count: u32,
        total_token_count: u32,
    },
    ReasoningTruncated {
        dropped_chars: usize,
        /// Set when the source itself truncated, absent for local eviction.
        reason: Option<String>,
    },
    ReasoningEnded,
    FinalAnswer {
        answer: LlmAnswer,
    },
    Error {
        message: String,
        cause: Option<String>,
    },
}

impl LlmStreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LlmStreamEvent::FinalAnswer { .. } | LlmStreamEvent::Error { .. }
        )
    }
}

/// A boxed stream of LLM events, as returned by gateways and the pacer.
pub type LlmEventStream = Pin<Box<dyn Stream<Item = LlmStreamEvent> + Send>>;
