//! The per-session event bus.
//!
//! Delivery is fire-and-forget and at-most-once: subscribers that lag far
//! enough behind lose events rather than stalling the publishing actor.
//! Subscription is gated on per-player authorization granted at join time.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::{GameEvent, PlayerId, SessionId};

/// Buffered events per session channel before lagging receivers drop.
const SESSION_CHANNEL_CAPACITY: usize = 256;

#[async_trait]
pub trait GameEventBus: Send + Sync {
    /// Publishes an event to the session's subscribers, if any.
    async fn publish(&self, event: GameEvent);

    /// Grants `player_id` the right to subscribe to `session_id`.
    fn authorize_player(&self, session_id: SessionId, player_id: PlayerId);

    /// Subscribes an authorized player. Returns `None` for unauthorized
    /// attempts; dropping the receiver unsubscribes.
    fn subscribe(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
    ) -> Option<broadcast::Receiver<GameEvent>>;

    /// Drops authorization and all subscribers of a terminated session.
    fn revoke_session(&self, session_id: SessionId);
}

struct SessionChannel {
    authorized_player: PlayerId,
    sender: broadcast::Sender<GameEvent>,
}

/// In-process bus on per-session broadcast channels.
#[derive(Default)]
pub struct InMemoryGameEventBus {
    channels: DashMap<SessionId, SessionChannel>,
}

impl InMemoryGameEventBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GameEventBus for InMemoryGameEventBus {
    async fn publish(&self, event: GameEvent) {
        let session_id = event.session_id();
        if let Some(channel) = self.channels.get(&session_id) {
            // A send error only means nobody is subscribed right now.
            let _ = channel.sender.send(event);
        }
    }

    fn authorize_player(&self, session_id: SessionId, player_id: PlayerId) {
        self.channels.entry(session_id).or_insert_with(|| {
            let (sender, _) = broadcast::channel(SESSION_CHANNEL_CAPACITY);
            SessionChannel {
                authorized_player: player_id,
                sender,
            }
        });
    }

    fn subscribe(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
    ) -> Option<broadcast::Receiver<GameEvent>> {
        match self.channels.get(&session_id) {
            Some(channel) if channel.authorized_player == player_id => {
                Some(channel.sender.subscribe())
            }
            _ => {
                warn!(
                    session_id = %session_id,
                    player_id = %player_id,
                    "unauthorized subscription attempt"
                );
                None
            }
        }
    }

    fn revoke_session(&self, session_id: SessionId) {
        self.channels.remove(&session_id);
    }
}
