//! Opponent specifications: who the LLM player is and how its stream is
//! revealed.

use serde::{Deserialize, Serialize};

use super::session::GameMode;
use crate::llm::StreamingPolicy;

/// Display/provider profile of an LLM opponent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmProfile {
    pub display_name: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl LlmProfile {
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            model: None,
        }
    }
}

/// A selectable opponent: mode, identity and stream-reveal tuning.
///
/// Loading specs from disk is transport-side concern; the engine only sees
/// resolved specs through [`OpponentSpecRepository`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentSpec {
    pub id: String,
    pub mode: GameMode,
    pub display_name: String,
    pub llm_profile: LlmProfile,
    #[serde(default)]
    pub streaming: StreamingPolicy,
}

/// Lookup of opponent specs by id.
pub trait OpponentSpecRepository: Send + Sync {
    fn find_by_id(&self, id: &str) -> Option<OpponentSpec>;
}

/// Fixed set of specs, used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryOpponentSpecs {
    specs: Vec<OpponentSpec>,
}

impl InMemoryOpponentSpecs {
    pub fn new(specs: Vec<OpponentSpec>) -> Self {
        Self { specs }
    }
}

impl OpponentSpecRepository for InMemoryOpponentSpecs {
    fn find_by_id(&self, id: &str) -> Option<OpponentSpec> {
        self.specs.iter().find(|s| s.id == id).cloned()
    }
}
