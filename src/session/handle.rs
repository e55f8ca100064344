//! Cheap-to-clone handle for talking to a session actor.

use tokio::sync::{mpsc, oneshot};

use crate::domain::{PlayerId, SessionId};

use super::command::{JoinResponse, SessionCommand};

#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    session_id: SessionId,
}

impl SessionHandle {
    pub(crate) fn new(tx: mpsc::Sender<SessionCommand>, session_id: SessionId) -> Self {
        Self { tx, session_id }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Non-blocking submit for external commands. `false` means the mailbox
    /// is full or the actor is gone; callers surface `session_busy`.
    pub fn try_submit(&self, command: SessionCommand) -> bool {
        self.tx.try_send(command).is_ok()
    }

    /// Sends a join and waits for the actor's direct reply. `None` means
    /// the actor shut down before answering.
    pub async fn join(&self, player_id: PlayerId, nickname: String) -> Option<JoinResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = SessionCommand::JoinSession {
            player_id,
            nickname,
            reply: reply_tx,
        };
        if self.tx.send(command).await.is_err() {
            return None;
        }
        reply_rx.await.ok()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .finish()
    }
}
