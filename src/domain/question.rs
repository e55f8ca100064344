//! Quiz questions and selection constraints.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::answer::{ExpectedAnswerKind, VerifierSpec};
use super::QuestionId;

/// Question difficulty, used by the handicap policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// A single quiz question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: QuestionId,
    pub prompt: String,
    #[serde(default)]
    pub choices: Option<Vec<String>>,
    #[serde(default = "default_difficulty")]
    pub difficulty: Difficulty,
    pub verifier_spec: VerifierSpec,
    #[serde(default)]
    pub metadata: Option<QuestionMetadata>,
}

fn default_difficulty() -> Difficulty {
    Difficulty::Medium
}

impl Question {
    pub fn expected_answer_kind(&self) -> ExpectedAnswerKind {
        self.verifier_spec.expected_answer_kind()
    }
}

/// Optional provenance metadata attached to a question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionMetadata {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Constraints applied when selecting questions for a round.
#[derive(Debug, Clone, Default)]
pub struct QuestionConstraints {
    pub difficulty: Option<Difficulty>,
    pub exclude_question_ids: HashSet<QuestionId>,
}

impl QuestionConstraints {
    pub fn excluding(ids: impl IntoIterator<Item = QuestionId>) -> Self {
        Self {
            difficulty: None,
            exclude_question_ids: ids.into_iter().collect(),
        }
    }

    pub fn allows(&self, question: &Question) -> bool {
        if self.exclude_question_ids.contains(&question.question_id) {
            return false;
        }
        match self.difficulty {
            Some(d) => question.difficulty == d,
            None => true,
        }
    }
}
