//! Players of a match: exactly one human and one LLM opponent.

use serde::{Deserialize, Serialize};

use super::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerType {
    Human,
    Llm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: PlayerId,
    pub player_type: PlayerType,
    pub nickname: String,
}

/// The fixed pair of players in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSet {
    pub human: Player,
    pub llm: Player,
}

impl PlayerSet {
    pub fn find_by_id(&self, player_id: PlayerId) -> Option<&Player> {
        if self.human.player_id == player_id {
            Some(&self.human)
        } else if self.llm.player_id == player_id {
            Some(&self.llm)
        } else {
            None
        }
    }
}
