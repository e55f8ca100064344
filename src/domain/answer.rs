//! Answer values and the per-question verification specs they are checked
//! against.

use serde::{Deserialize, Serialize};

/// An answer value submitted by either player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    MultipleChoice { choice_index: u32 },
    Integer { value: i64 },
    FreeText { text: String },
}

impl Answer {
    pub fn multiple_choice(choice_index: u32) -> Self {
        Answer::MultipleChoice { choice_index }
    }

    pub fn integer(value: i64) -> Self {
        Answer::Integer { value }
    }

    pub fn free_text(text: impl Into<String>) -> Self {
        Answer::FreeText { text: text.into() }
    }
}

/// How a question's correct answer is specified and checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerifierSpec {
    MultipleChoice {
        correct_index: u32,
    },
    IntegerRange {
        correct_value: i64,
        #[serde(default = "i64_min")]
        min_value: i64,
        #[serde(default = "i64_max")]
        max_value: i64,
    },
    FreeResponse {
        #[serde(default)]
        rubric: Option<String>,
        #[serde(default)]
        expected_keywords: Vec<String>,
    },
}

fn i64_min() -> i64 {
    i64::MIN
}

fn i64_max() -> i64 {
    i64::MAX
}

impl VerifierSpec {
    /// The answer shape this spec expects from players.
    pub fn expected_answer_kind(&self) -> ExpectedAnswerKind {
        match self {
            VerifierSpec::MultipleChoice { .. } => ExpectedAnswerKind::MultipleChoice,
            VerifierSpec::IntegerRange { .. } => ExpectedAnswerKind::Integer,
            VerifierSpec::FreeResponse { .. } => ExpectedAnswerKind::FreeText,
        }
    }

    /// The reference answer revealed to clients at round end.
    ///
    /// For free response there is no single canonical answer; the expected
    /// keywords joined together stand in for it.
    pub fn correct_answer(&self) -> Answer {
        match self {
            VerifierSpec::MultipleChoice { correct_index } => Answer::MultipleChoice {
                choice_index: *correct_index,
            },
            VerifierSpec::IntegerRange { correct_value, .. } => Answer::Integer {
                value: *correct_value,
            },
            VerifierSpec::FreeResponse {
                expected_keywords, ..
            } => Answer::FreeText {
                text: expected_keywords.join(" "),
            },
        }
    }
}

/// The kind of answer a question expects, as advertised to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedAnswerKind {
    MultipleChoice,
    Integer,
    FreeText,
}
