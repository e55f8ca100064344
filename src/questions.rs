//! Question selection port.
//!
//! Question banks live outside the engine (files, databases); the engine
//! only asks for "n questions not seen in this session".

use async_trait::async_trait;

use crate::domain::{Question, QuestionConstraints};

#[async_trait]
pub trait QuestionSelector: Send + Sync {
    /// Picks up to `count` questions satisfying `constraints`. May return
    /// fewer (or none) when the bank is exhausted.
    async fn pick_questions(&self, count: usize, constraints: &QuestionConstraints)
        -> Vec<Question>;
}

/// Fixed in-memory bank; selection order is the bank order.
#[derive(Debug, Default)]
pub struct InMemoryQuestionBank {
    questions: Vec<Question>,
}

impl InMemoryQuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }
}

#[async_trait]
impl QuestionSelector for InMemoryQuestionBank {
    async fn pick_questions(
        &self,
        count: usize,
        constraints: &QuestionConstraints,
    ) -> Vec<Question> {
        self.questions
            .iter()
            .filter(|q| constraints.allows(q))
            .take(count)
            .cloned()
            .collect()
    }
}
