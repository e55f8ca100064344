//! The player → active-session index.
//!
//! Creation races are resolved here: `get_or_reserve` is a compare-and-swap
//! with at most one winner per player, and `clear` only removes a binding
//! that still points at the expected session.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::{PlayerId, SessionId};

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub session_id: SessionId,
    pub opponent_spec_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PlayerSessionIndex {
    bindings: DashMap<PlayerId, Binding>,
}

impl PlayerSessionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, player_id: PlayerId) -> Option<Binding> {
        self.bindings.get(&player_id).map(|b| b.clone())
    }

    /// Returns the existing binding, or installs `new_binding` if the
    /// player has none. Exactly one concurrent caller installs.
    pub fn get_or_reserve(&self, player_id: PlayerId, new_binding: Binding) -> Binding {
        self.bindings
            .entry(player_id)
            .or_insert(new_binding)
            .clone()
    }

    /// Removes the binding only if it still points at `session_id`.
    pub fn clear(&self, player_id: PlayerId, session_id: SessionId) {
        self.bindings
            .remove_if(&player_id, |_, binding| binding.session_id == session_id);
    }

    /// Atomically takes the player's binding, whatever it points at.
    pub fn take_by_owner(&self, player_id: PlayerId) -> Option<Binding> {
        self.bindings.remove(&player_id).map(|(_, binding)| binding)
    }
}
