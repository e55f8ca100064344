//! Persistence port for completed-match summaries. Saving is best effort;
//! a failing repository must never fail the session.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::SessionResult;

#[async_trait]
pub trait ResultsRepository: Send + Sync {
    async fn save_result(&self, result: SessionResult);
}

/// Keeps results in memory; the backing store for tests and single-process
/// deployments without a leaderboard.
#[derive(Debug, Default)]
pub struct InMemoryResultsRepository {
    results: Mutex<Vec<SessionResult>>,
}

impl InMemoryResultsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<SessionResult> {
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ResultsRepository for InMemoryResultsRepository {
    async fn save_result(&self, result: SessionResult) {
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(result);
    }
}
