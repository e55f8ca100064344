//! Answer verification against a question's verifier spec.

use crate::domain::{Answer, Question, Submission, VerifierSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub correct: bool,
}

pub trait AnswerVerifier: Send + Sync {
    fn verify(&self, question: &Question, submission: &Submission) -> VerificationOutcome;
}

/// Deterministic verifier for the built-in spec kinds. An answer of the
/// wrong shape is simply incorrect, never an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardAnswerVerifier;

impl AnswerVerifier for StandardAnswerVerifier {
    fn verify(&self, question: &Question, submission: &Submission) -> VerificationOutcome {
        let correct = match (&question.verifier_spec, &submission.answer) {
            (
                VerifierSpec::MultipleChoice { correct_index },
                Answer::MultipleChoice { choice_index },
            ) => choice_index == correct_index,
            (
                VerifierSpec::IntegerRange {
                    correct_value,
                    min_value,
                    max_value,
                },
                Answer::Integer { value },
            ) => value == correct_value && (*min_value..=*max_value).contains(value),
            (
                VerifierSpec::FreeResponse {
                    expected_keywords, ..
                },
                Answer::FreeText { text },
            ) => {
                let haystack = text.to_lowercase();
                !expected_keywords.is_empty()
                    && expected_keywords
                        .iter()
                        .all(|keyword| haystack.contains(&keyword.to_lowercase()))
            }
            _ => false,
        };
        VerificationOutcome { correct }
    }
}
