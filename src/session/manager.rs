//! Session registry/manager: resolves creation races, admits new sessions
//! through the admission gate, forwards commands to actors, and owns actor
//! shutdown and lifecycle timers.

use std::sync::{Arc, Mutex};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::admission::{AdmissionPermit, ClientIdentity, SessionAdmissionGate};
use crate::config::SessionLimitConfig;
use crate::domain::{Answer, ErrorCode, OpponentSpecRepository, PlayerId, RoundId, SessionId};

use super::actor::{ActorConfig, ActorContext, SessionActor};
use super::binding::{Binding, PlayerSessionIndex};
use super::command::{JoinResponse, SessionCommand};
use super::handle::SessionHandle;
use super::models::{ActiveSessionSnapshot, CommandResult, JoinResult, TouchResult};

// ============================================================================
// Session Entries
// ============================================================================

/// A live session owned by this manager.
struct ActiveSession {
    session_id: SessionId,
    handle: SessionHandle,
    task: JoinHandle<()>,
    permit: AdmissionPermit,
    owner_player_id: PlayerId,
    opponent_spec_id: String,
}

#[derive(Clone)]
enum CreationOutcome {
    Created(Arc<ActiveSession>),
    Failed { code: ErrorCode, message: String },
}

#[derive(Clone)]
enum SessionEntry {
    /// Creation in flight; concurrent joiners wait on the outcome.
    Creating {
        outcome: watch::Receiver<Option<CreationOutcome>>,
    },
    Active(Arc<ActiveSession>),
}

// ============================================================================
// Session Manager
// ============================================================================

/// Cheap to clone; all state lives behind `Arc`s.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: SessionLimitConfig,
    ctx: ActorContext,
    specs: Arc<dyn OpponentSpecRepository>,
    admission: SessionAdmissionGate,
    bindings: PlayerSessionIndex,
    actors: DashMap<SessionId, SessionEntry>,
    idle_timers: DashMap<SessionId, JoinHandle<()>>,
    lifespan_timers: DashMap<SessionId, JoinHandle<()>>,
    /// Actors report self-termination (post-grace shutdown) here.
    removal_tx: mpsc::UnboundedSender<SessionId>,
    removal_listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        config: SessionLimitConfig,
        specs: Arc<dyn OpponentSpecRepository>,
        ctx: ActorContext,
    ) -> Self {
        let (removal_tx, mut removal_rx) = mpsc::unbounded_channel();
        let admission = SessionAdmissionGate::new(config.clone(), Arc::clone(&ctx.clock));
        let manager = Self {
            inner: Arc::new(ManagerInner {
                config,
                ctx,
                specs,
                admission,
                bindings: PlayerSessionIndex::new(),
                actors: DashMap::new(),
                idle_timers: DashMap::new(),
                lifespan_timers: DashMap::new(),
                removal_tx,
                removal_listener: Mutex::new(None),
            }),
        };

        let listener = manager.clone();
        let task = tokio::spawn(async move {
            while let Some(session_id) = removal_rx.recv().await {
                debug!(session_id = %session_id, "actor self-terminated, removing");
                listener.remove_session(session_id);
            }
        });
        *manager
            .inner
            .removal_listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(task);

        manager
    }

    // ------------------------------------------------------------------------
    // Join / Create
    // ------------------------------------------------------------------------

    /// Joins an existing session or creates one, resolving every race to a
    /// single winner: binding CAS per player, entry CAS per session id.
    pub async fn join_session(
        &self,
        session_id: Option<SessionId>,
        identity: &ClientIdentity,
        nickname: &str,
        opponent_spec_id: &str,
    ) -> JoinResult {
        let player_id = identity.player_id;

        // An existing binding resumes that session; a conflicting explicit
        // id is rejected so one player cannot hold two matches.
        if let Some(binding) = self.inner.bindings.get(player_id) {
            if let Some(entry) = self.entry_for_binding(&binding, player_id) {
                if session_id.is_none() || session_id == Some(binding.session_id) {
                    debug!(session_id = %binding.session_id, player_id = %player_id, "resuming bound session");
                    return self
                        .join_entry(entry, binding.session_id, identity, nickname, &binding.opponent_spec_id)
                        .await;
                }
                return JoinResult::failure(
                    Some(binding.session_id),
                    ErrorCode::ActiveSessionExists,
                    "player already has an active session",
                );
            }
            // Binding points nowhere usable; reconcile and continue.
            debug!(session_id = %binding.session_id, player_id = %player_id, "clearing stale binding");
            self.inner.bindings.clear(player_id, binding.session_id);
        }

        // Ownership checks for explicit ids, before any reservation, so a
        // hijack attempt cannot leave a poisoned binding behind.
        if let Some(requested) = session_id {
            match self.get_entry(requested) {
                Some(SessionEntry::Active(active)) if active.owner_player_id != player_id => {
                    return JoinResult::failure(
                        Some(requested),
                        ErrorCode::SessionNotOwned,
                        "session is owned by another player",
                    );
                }
                Some(SessionEntry::Creating { .. }) => {
                    return JoinResult::failure(
                        Some(requested),
                        ErrorCode::SessionCreating,
                        "session is being created by another player",
                    );
                }
                _ => {}
            }
        }

        // Validate the opponent spec before creating any binding.
        if self.inner.specs.find_by_id(opponent_spec_id).is_none() {
            return JoinResult::failure(
                session_id,
                ErrorCode::OpponentSpecNotFound,
                "opponent spec not found",
            );
        }

        // Reserve the binding (CAS). A concurrent request from the same
        // player may have won; follow its reservation instead.
        let mut chosen_id = session_id.unwrap_or_else(Uuid::new_v4);
        let mut chosen_spec_id = opponent_spec_id.to_string();
        let reserved = self.inner.bindings.get_or_reserve(
            player_id,
            Binding {
                session_id: chosen_id,
                opponent_spec_id: chosen_spec_id.clone(),
                created_at: self.inner.ctx.clock.now(),
            },
        );
        if reserved.session_id != chosen_id {
            if session_id.is_some() && session_id != Some(reserved.session_id) {
                return JoinResult::failure(
                    Some(reserved.session_id),
                    ErrorCode::ActiveSessionExists,
                    "player already has an active session",
                );
            }
            if let Some(entry) = self.entry_for_binding(&reserved, player_id) {
                return self
                    .join_entry(entry, reserved.session_id, identity, nickname, &reserved.opponent_spec_id)
                    .await;
            }
            chosen_id = reserved.session_id;
            chosen_spec_id = reserved.opponent_spec_id.clone();
        }

        let Some(spec) = self.inner.specs.find_by_id(&chosen_spec_id) else {
            self.inner.bindings.clear(player_id, chosen_id);
            return JoinResult::failure(
                Some(chosen_id),
                ErrorCode::OpponentSpecNotFound,
                "opponent spec not found",
            );
        };

        // Fast path: the session already exists.
        if let Some(existing) = self.get_entry(chosen_id) {
            return self
                .join_entry(existing, chosen_id, identity, nickname, &chosen_spec_id)
                .await;
        }

        // Claim creation of this session id; losers join the winner's entry.
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let raced = match self.inner.actors.entry(chosen_id) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(vacant) => {
                vacant.insert(SessionEntry::Creating {
                    outcome: outcome_rx,
                });
                None
            }
        };
        if let Some(existing) = raced {
            return self
                .join_entry(existing, chosen_id, identity, nickname, &chosen_spec_id)
                .await;
        }

        // Admission: capacity plus rate/quota windows, atomically.
        let permit = match self.inner.admission.try_admit(identity, spec.mode) {
            Ok(permit) => permit,
            Err(denial) => {
                return self.fail_creation(
                    chosen_id,
                    player_id,
                    &outcome_tx,
                    denial.code,
                    denial.message,
                );
            }
        };

        // Spawn the actor and perform the first join while still Creating.
        let (tx, task) = SessionActor::spawn(
            ActorConfig {
                session_id: chosen_id,
                opponent_spec: spec,
                mailbox_capacity: self.inner.config.actor_mailbox_capacity,
                round_duration: self.inner.config.round_duration(),
                cleanup_grace: self.inner.config.cleanup_grace(),
            },
            self.inner.ctx.clone(),
            self.inner.removal_tx.clone(),
        );
        let active = Arc::new(ActiveSession {
            session_id: chosen_id,
            handle: SessionHandle::new(tx, chosen_id),
            task,
            permit,
            owner_player_id: player_id,
            opponent_spec_id: chosen_spec_id.clone(),
        });

        let first_join = self
            .join_active(Arc::clone(&active), identity, nickname, &chosen_spec_id)
            .await;
        let (code, message) = match first_join {
            JoinResult::Success { .. } => {
                // Publish Creating -> Active, unless creation was cancelled
                // underneath us (shutdown, explicit removal).
                let published = match self.inner.actors.entry(chosen_id) {
                    Entry::Occupied(mut entry) if matches!(entry.get(), SessionEntry::Creating { .. }) => {
                        entry.insert(SessionEntry::Active(Arc::clone(&active)));
                        true
                    }
                    _ => false,
                };
                if published {
                    let _ = outcome_tx.send(Some(CreationOutcome::Created(Arc::clone(&active))));
                    self.schedule_max_lifespan(chosen_id);
                    self.schedule_idle_timeout(chosen_id);
                    return first_join;
                }
                (
                    ErrorCode::SessionCreationCancelled,
                    "session creation cancelled".to_string(),
                )
            }
            JoinResult::Failure {
                code, ref message, ..
            } => (code, message.clone()),
        };

        // Any creation failure releases everything it reserved.
        let _ = outcome_tx.send(Some(CreationOutcome::Failed {
            code,
            message: message.clone(),
        }));
        self.inner
            .actors
            .remove_if(&chosen_id, |_, entry| matches!(entry, SessionEntry::Creating { .. }));
        self.inner.bindings.clear(player_id, chosen_id);
        active.task.abort();
        active.permit.close();
        self.inner.ctx.bus.revoke_session(chosen_id);
        JoinResult::failure(Some(chosen_id), code, message)
    }

    fn fail_creation(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
        outcome_tx: &watch::Sender<Option<CreationOutcome>>,
        code: ErrorCode,
        message: String,
    ) -> JoinResult {
        let _ = outcome_tx.send(Some(CreationOutcome::Failed {
            code,
            message: message.clone(),
        }));
        self.inner
            .actors
            .remove_if(&session_id, |_, entry| matches!(entry, SessionEntry::Creating { .. }));
        self.inner.bindings.clear(player_id, session_id);
        JoinResult::failure(Some(session_id), code, message)
    }

    async fn join_entry(
        &self,
        entry: SessionEntry,
        session_id: SessionId,
        identity: &ClientIdentity,
        nickname: &str,
        opponent_spec_id: &str,
    ) -> JoinResult {
        match entry {
            SessionEntry::Active(active) => {
                self.join_active(active, identity, nickname, opponent_spec_id)
                    .await
            }
            SessionEntry::Creating { mut outcome } => {
                let settled = timeout(self.inner.config.join_timeout(), async {
                    loop {
                        if let Some(outcome) = outcome.borrow_and_update().clone() {
                            return outcome;
                        }
                        if outcome.changed().await.is_err() {
                            return CreationOutcome::Failed {
                                code: ErrorCode::SessionCreationCancelled,
                                message: "session creation cancelled".to_string(),
                            };
                        }
                    }
                })
                .await;
                match settled {
                    Ok(CreationOutcome::Created(active)) => {
                        self.join_active(active, identity, nickname, opponent_spec_id)
                            .await
                    }
                    Ok(CreationOutcome::Failed { code, message }) => {
                        JoinResult::failure(Some(session_id), code, message)
                    }
                    Err(_) => JoinResult::failure(
                        Some(session_id),
                        ErrorCode::JoinTimeout,
                        "session join timed out",
                    ),
                }
            }
        }
    }

    async fn join_active(
        &self,
        active: Arc<ActiveSession>,
        identity: &ClientIdentity,
        nickname: &str,
        opponent_spec_id: &str,
    ) -> JoinResult {
        let session_id = active.session_id;
        let player_id = identity.player_id;

        if active.opponent_spec_id != opponent_spec_id {
            return JoinResult::failure(
                Some(session_id),
                ErrorCode::OpponentMismatch,
                "session already uses a different opponent",
            );
        }

        let response = timeout(
            self.inner.config.join_timeout(),
            active.handle.join(player_id, nickname.to_string()),
        )
        .await;
        match response {
            Ok(Some(JoinResponse::Accepted { round_snapshot })) => {
                self.schedule_idle_timeout(session_id);
                self.ensure_binding(&active, player_id);
                JoinResult::Success {
                    session_id,
                    player_id,
                    opponent_spec_id: opponent_spec_id.to_string(),
                    nickname: nickname.to_string(),
                    round_snapshot,
                }
            }
            Ok(Some(JoinResponse::Rejected { code, message })) => {
                // Best-effort cleanup of any binding this attempt created.
                self.inner.bindings.clear(player_id, session_id);
                JoinResult::failure(Some(session_id), code, message)
            }
            Ok(None) | Err(_) => {
                self.inner.bindings.clear(player_id, session_id);
                JoinResult::failure(
                    Some(session_id),
                    ErrorCode::JoinTimeout,
                    "session join timed out",
                )
            }
        }
    }

    // ------------------------------------------------------------------------
    // Command Forwarding
    // ------------------------------------------------------------------------

    pub fn start_next_round(&self, session_id: SessionId, player_id: PlayerId) -> CommandResult {
        self.forward(session_id, SessionCommand::StartNextRound { player_id })
    }

    pub fn submit_answer(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
        round_id: RoundId,
        nonce_token: String,
        answer: Answer,
        client_sent_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> CommandResult {
        self.forward(
            session_id,
            SessionCommand::SubmitAnswer {
                player_id,
                round_id,
                nonce_token,
                answer,
                client_sent_at,
            },
        )
    }

    fn forward(&self, session_id: SessionId, command: SessionCommand) -> CommandResult {
        let Some(SessionEntry::Active(active)) = self.get_entry(session_id) else {
            return CommandResult::Rejected {
                session_id,
                code: ErrorCode::SessionNotFound,
                message: "session not found".to_string(),
            };
        };
        self.schedule_idle_timeout(session_id);
        if !active.handle.try_submit(command) {
            return CommandResult::Rejected {
                session_id,
                code: ErrorCode::SessionBusy,
                message: "session is busy, please retry".to_string(),
            };
        }
        CommandResult::Accepted { session_id }
    }

    /// Heartbeat: refreshes the idle timer without sending a command.
    pub fn touch_session(&self, session_id: SessionId) -> TouchResult {
        if !matches!(self.get_entry(session_id), Some(SessionEntry::Active(_))) {
            return TouchResult::SessionNotFound;
        }
        self.schedule_idle_timeout(session_id);
        TouchResult::Success
    }

    // ------------------------------------------------------------------------
    // Active-Session Queries
    // ------------------------------------------------------------------------

    /// Resolves the player's active session, preferring `hint` when it is a
    /// session they own. Heals a missing binding and clears stale ones.
    pub fn get_active_session(
        &self,
        player_id: PlayerId,
        hint: Option<SessionId>,
    ) -> Option<ActiveSessionSnapshot> {
        if let Some(hinted) = hint {
            if let Some(active) = self.owned_active(player_id, hinted) {
                self.ensure_binding(&active, player_id);
                let binding = self.inner.bindings.get(player_id);
                return Some(ActiveSessionSnapshot {
                    session_id: hinted,
                    opponent_spec_id: binding
                        .as_ref()
                        .map(|b| b.opponent_spec_id.clone())
                        .unwrap_or_else(|| active.opponent_spec_id.clone()),
                    created_at: binding
                        .map(|b| b.created_at)
                        .unwrap_or_else(|| self.inner.ctx.clock.now()),
                });
            }
            if self.inner.bindings.get(player_id).map(|b| b.session_id) == Some(hinted) {
                self.inner.bindings.clear(player_id, hinted);
            }
        }

        let binding = self.inner.bindings.get(player_id)?;
        if self.owned_active(player_id, binding.session_id).is_none() {
            self.inner.bindings.clear(player_id, binding.session_id);
            return None;
        }
        Some(ActiveSessionSnapshot {
            session_id: binding.session_id,
            opponent_spec_id: binding.opponent_spec_id,
            created_at: binding.created_at,
        })
    }

    /// Terminates the caller's own active session. Ownership is checked on
    /// the live entry as well as the binding, so a forged binding cannot
    /// take down someone else's match.
    pub fn terminate_active_session_by_owner(&self, player_id: PlayerId) -> Option<SessionId> {
        let binding = self.inner.bindings.take_by_owner(player_id)?;
        if let Some(SessionEntry::Active(active)) = self.get_entry(binding.session_id) {
            if active.owner_player_id != player_id {
                warn!(
                    session_id = %binding.session_id,
                    player_id = %player_id,
                    owner = %active.owner_player_id,
                    "termination attempt on a session owned by another player"
                );
                return None;
            }
        }
        debug!(session_id = %binding.session_id, player_id = %player_id, "terminating session by owner");
        self.remove_session(binding.session_id);
        Some(binding.session_id)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    fn schedule_idle_timeout(&self, session_id: SessionId) {
        let manager = self.clone();
        let delay = self.inner.config.idle_timeout();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.send_timeout(session_id, "timeout");
        });
        if let Some(previous) = self.inner.idle_timers.insert(session_id, task) {
            previous.abort();
        }
    }

    fn schedule_max_lifespan(&self, session_id: SessionId) {
        let manager = self.clone();
        let delay = self.inner.config.max_lifespan();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.send_timeout(session_id, "max_lifespan");
        });
        if let Some(previous) = self.inner.lifespan_timers.insert(session_id, task) {
            previous.abort();
        }
    }

    /// Routes termination through the actor so `SessionResolved` and
    /// `SessionTerminated` are emitted before teardown.
    fn send_timeout(&self, session_id: SessionId, reason: &str) {
        if let Some(SessionEntry::Active(active)) = self.get_entry(session_id) {
            let accepted = active.handle.try_submit(SessionCommand::Timeout {
                reason: reason.to_string(),
            });
            if !accepted {
                warn!(session_id = %session_id, "timeout command dropped, removing session directly");
                self.remove_session(session_id);
            }
        }
    }

    /// Hard removal: cancels timers, aborts the actor, releases the permit
    /// and revokes event-bus access.
    pub fn remove_session(&self, session_id: SessionId) {
        if let Some((_, task)) = self.inner.idle_timers.remove(&session_id) {
            task.abort();
        }
        if let Some((_, task)) = self.inner.lifespan_timers.remove(&session_id) {
            task.abort();
        }
        match self.inner.actors.remove(&session_id) {
            Some((_, SessionEntry::Active(active))) => {
                self.inner
                    .bindings
                    .clear(active.owner_player_id, session_id);
                active.task.abort();
                active.permit.close();
            }
            Some((_, SessionEntry::Creating { .. })) => {
                // The creating caller observes the removed entry and
                // completes its waiters with a cancellation.
            }
            None => {}
        }
        self.inner.ctx.bus.revoke_session(session_id);
    }

    /// Tears down every session and stops the removal listener.
    pub fn shutdown_all(&self) {
        if let Some(task) = self
            .inner
            .removal_listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            task.abort();
        }
        let session_ids: Vec<SessionId> = self.inner.actors.iter().map(|e| *e.key()).collect();
        for session_id in session_ids {
            self.remove_session(session_id);
        }
        for entry in self.inner.idle_timers.iter() {
            entry.value().abort();
        }
        for entry in self.inner.lifespan_timers.iter() {
            entry.value().abort();
        }
        self.inner.idle_timers.clear();
        self.inner.lifespan_timers.clear();
    }

    /// Number of live (non-creating) sessions.
    pub fn active_session_count(&self) -> usize {
        self.inner
            .actors
            .iter()
            .filter(|e| matches!(e.value(), SessionEntry::Active(_)))
            .count()
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn get_entry(&self, session_id: SessionId) -> Option<SessionEntry> {
        self.inner.actors.get(&session_id).map(|e| e.clone())
    }

    fn entry_for_binding(&self, binding: &Binding, player_id: PlayerId) -> Option<SessionEntry> {
        match self.get_entry(binding.session_id) {
            Some(SessionEntry::Active(active)) => {
                (active.owner_player_id == player_id).then(|| SessionEntry::Active(active))
            }
            Some(creating @ SessionEntry::Creating { .. }) => Some(creating),
            None => None,
        }
    }

    fn owned_active(&self, player_id: PlayerId, session_id: SessionId) -> Option<Arc<ActiveSession>> {
        match self.get_entry(session_id) {
            Some(SessionEntry::Active(active)) if active.owner_player_id == player_id => {
                Some(active)
            }
            _ => None,
        }
    }

    fn ensure_binding(&self, active: &ActiveSession, player_id: PlayerId) {
        if active.owner_player_id != player_id {
            return;
        }
        self.inner.bindings.get_or_reserve(
            player_id,
            Binding {
                session_id: active.session_id,
                opponent_spec_id: active.opponent_spec_id.clone(),
                created_at: self.inner.ctx.clock.now(),
            },
        );
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.inner.actors.len())
            .finish()
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(task) = self
            .removal_listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            task.abort();
        }
    }
}
