//! Per-session actor: the single worker that owns a `GameSession`.
//!
//! All reads and writes of session state go through the actor's mailbox,
//! which is the only synchronization mechanism for that state. Child tasks
//! (the LLM stream, the handicap delay, the round deadline, the
//! post-completion grace timer) never touch the session directly; they
//! send commands back into the same mailbox.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::bus::GameEventBus;
use crate::clock::SharedClock;
use crate::domain::{
    Answer, CommandRejection, ErrorCode, GameEvent, GameSession, HandicapPolicy, MatchWinner,
    OpponentSpec, Player, PlayerId, PlayerSet, PlayerType, QuestionConstraints, Round,
    RoundId, RoundResolveReason, ScorePolicy, SessionId, SessionResult, SessionState, Submission,
};
use crate::llm::{LlmAnswer, LlmGateway, LlmStreamEvent, RevealPacer, RoundContext};
use crate::questions::QuestionSelector;
use crate::results::ResultsRepository;
use crate::verify::AnswerVerifier;

use super::command::{JoinResponse, SessionCommand};

// ============================================================================
// Spawn Configuration
// ============================================================================

/// Collaborators shared by every actor in the process.
#[derive(Clone)]
pub struct ActorContext {
    pub bus: Arc<dyn GameEventBus>,
    pub questions: Arc<dyn QuestionSelector>,
    pub verifier: Arc<dyn AnswerVerifier>,
    pub score_policy: Arc<dyn ScorePolicy>,
    pub llm_gateway: Arc<dyn LlmGateway>,
    pub results: Arc<dyn ResultsRepository>,
    pub clock: SharedClock,
}

/// Per-session spawn parameters.
pub struct ActorConfig {
    pub session_id: SessionId,
    pub opponent_spec: OpponentSpec,
    pub mailbox_capacity: usize,
    /// Answer window after the handicap.
    pub round_duration: Duration,
    /// Delay between completion and teardown so terminal events drain.
    pub cleanup_grace: Duration,
}

// ============================================================================
// Session Actor
// ============================================================================

/// Per-round bookkeeping for the LLM stream.
#[derive(Default)]
struct RoundStreamState {
    full_reasoning: String,
    next_seq: u64,
    lock_in_emitted: bool,
    pending_final_answer: Option<LlmAnswer>,
    final_answer_published: bool,
    reasoning_reveal_published: bool,
}

pub struct SessionActor {
    config: ActorConfig,
    ctx: ActorContext,
    command_rx: mpsc::Receiver<SessionCommand>,
    /// Clone handed to child tasks so continuations re-enter the mailbox.
    self_tx: mpsc::Sender<SessionCommand>,
    /// Tells the manager to drop this actor after self-termination.
    on_terminate: mpsc::UnboundedSender<SessionId>,

    session: Option<GameSession>,
    llm_tasks: HashMap<RoundId, JoinHandle<()>>,
    llm_start_tasks: HashMap<RoundId, JoinHandle<()>>,
    deadline_tasks: HashMap<RoundId, JoinHandle<()>>,
    grace_task: Option<JoinHandle<()>>,
    stream_states: HashMap<RoundId, RoundStreamState>,
    session_resolved_emitted: bool,
    terminated: bool,
}

impl SessionActor {
    /// Spawns the actor task. Returns the command sender and the task
    /// handle; aborting the handle is the manager's hard-stop path.
    pub fn spawn(
        config: ActorConfig,
        ctx: ActorContext,
        on_terminate: mpsc::UnboundedSender<SessionId>,
    ) -> (mpsc::Sender<SessionCommand>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let actor = Self {
            config,
            ctx,
            command_rx: rx,
            self_tx: tx.clone(),
            on_terminate,
            session: None,
            llm_tasks: HashMap::new(),
            llm_start_tasks: HashMap::new(),
            deadline_tasks: HashMap::new(),
            grace_task: None,
            stream_states: HashMap::new(),
            session_resolved_emitted: false,
            terminated: false,
        };
        let task = tokio::spawn(actor.run());
        (tx, task)
    }

    async fn run(mut self) {
        debug!(session_id = %self.config.session_id, "session actor started");
        while let Some(command) = self.command_rx.recv().await {
            self.handle_command(command).await;
            if self.terminated {
                break;
            }
        }
        self.cancel_children();
        debug!(session_id = %self.config.session_id, "session actor stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::JoinSession {
                player_id,
                nickname,
                reply,
            } => self.handle_join(player_id, nickname, reply).await,
            SessionCommand::StartNextRound { player_id } => {
                self.handle_start_next_round(player_id).await
            }
            SessionCommand::SubmitAnswer {
                player_id,
                round_id,
                nonce_token,
                answer,
                client_sent_at,
            } => {
                self.handle_submit_answer(player_id, round_id, nonce_token, answer, client_sent_at)
                    .await
            }
            SessionCommand::StartLlmForRound { round_id } => self.handle_start_llm(round_id).await,
            SessionCommand::LlmReasoningDelta {
                round_id,
                delta_text,
            } => self.handle_llm_reasoning_delta(round_id, delta_text).await,
            SessionCommand::LlmReasoningTruncated {
                round_id,
                dropped_chars,
            } => {
                if self.round_in_progress(round_id) {
                    self.publish(GameEvent::LlmReasoningTruncated {
                        session_id: self.config.session_id,
                        round_id,
                        dropped_chars,
                    })
                    .await;
                }
            }
            SessionCommand::LlmReasoningEnded { round_id } => {
                if self.round_in_progress(round_id) {
                    self.publish(GameEvent::LlmReasoningEnded {
                        session_id: self.config.session_id,
                        round_id,
                    })
                    .await;
                }
            }
            SessionCommand::LlmFinalAnswerReceived { round_id, answer } => {
                if self.round_in_progress(round_id) {
                    self.submit_llm_answer(round_id, answer).await;
                }
            }
            SessionCommand::LlmStreamErrored { round_id, message } => {
                self.handle_llm_stream_errored(round_id, message).await
            }
            SessionCommand::RoundDeadlineReached { round_id } => {
                self.handle_round_deadline_reached(round_id).await
            }
            SessionCommand::Timeout { reason } => self.handle_timeout(reason).await,
            SessionCommand::Shutdown { reason } => {
                self.publish(GameEvent::SessionTerminated {
                    session_id: self.config.session_id,
                    reason,
                })
                .await;
                self.terminate();
            }
        }
    }

    // ------------------------------------------------------------------------
    // Join
    // ------------------------------------------------------------------------

    async fn handle_join(
        &mut self,
        player_id: PlayerId,
        nickname: String,
        reply: tokio::sync::oneshot::Sender<JoinResponse>,
    ) {
        let session_id = self.config.session_id;

        let Some(session) = self.session.as_ref() else {
            // First join: create the session with a synthetic LLM player.
            let human = Player {
                player_id,
                player_type: PlayerType::Human,
                nickname: nickname.clone(),
            };
            let llm = Player {
                player_id: Uuid::new_v4(),
                player_type: PlayerType::Llm,
                nickname: self.config.opponent_spec.display_name.clone(),
            };
            let created = GameSession {
                session_id,
                join_code: session_id.to_string(),
                mode: self.config.opponent_spec.mode,
                llm_profile: self.config.opponent_spec.llm_profile.clone(),
                players: PlayerSet {
                    human: human.clone(),
                    llm: llm.clone(),
                },
                rounds: Vec::new(),
                state: SessionState::Waiting,
                created_at: self.ctx.clock.now(),
            };
            let join_code = created.join_code.clone();
            self.session = Some(created);

            self.ctx.bus.authorize_player(session_id, player_id);
            self.publish(GameEvent::SessionCreated {
                session_id,
                join_code,
            })
            .await;
            self.publish(GameEvent::PlayerJoined {
                session_id,
                player_id: human.player_id,
                nickname: human.nickname,
            })
            .await;
            self.publish(GameEvent::PlayerJoined {
                session_id,
                player_id: llm.player_id,
                nickname: llm.nickname,
            })
            .await;

            let _ = reply.send(JoinResponse::Accepted {
                round_snapshot: None,
            });
            return;
        };

        if session.players.human.player_id != player_id {
            // Rejection goes straight back to the caller, never onto the
            // session bus.
            let _ = reply.send(JoinResponse::Rejected {
                code: ErrorCode::SessionTaken,
                message: "session already has a different human player".to_string(),
            });
            return;
        }

        // Same player rejoining (browser refresh): replay the open round.
        let round_snapshot = session
            .current_round()
            .map(|round| self.round_started_event(round, self.round_number_of(round.round_id)));
        let _ = reply.send(JoinResponse::Accepted { round_snapshot });
    }

    // ------------------------------------------------------------------------
    // Round Start
    // ------------------------------------------------------------------------

    async fn handle_start_next_round(&mut self, player_id: PlayerId) {
        let (mode, constraints) = match self.session.as_ref() {
            None => {
                self.publish_error(ErrorCode::SessionNotReady, "session not initialized")
                    .await;
                return;
            }
            Some(session) => {
                if let Err(rejection) = session.ensure_can_start_round(player_id) {
                    self.publish_rejection(rejection).await;
                    return;
                }
                (
                    session.mode,
                    QuestionConstraints::excluding(session.used_question_ids()),
                )
            }
        };

        let question = self
            .ctx
            .questions
            .pick_questions(1, &constraints)
            .await
            .into_iter()
            .next();
        let Some(question) = question else {
            self.publish_error(ErrorCode::NoQuestion, "no question available")
                .await;
            return;
        };

        let released_at = self.ctx.clock.now();
        let handicap = HandicapPolicy::compute_handicap(&question, mode);
        let deadline = released_at
            + chrono::Duration::from_std(handicap + self.config.round_duration)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let round = Round {
            round_id: Uuid::new_v4(),
            question,
            released_at,
            handicap,
            deadline,
            nonce_token: Uuid::new_v4().to_string(),
            human_submission: None,
            llm_submission: None,
            result: None,
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.begin_round(round.clone());
        let round_number = session.rounds.len();

        let event = self.round_started_event(&round, round_number);
        self.publish(event).await;
        self.schedule_llm_start(round.round_id, round.handicap);
        self.schedule_round_deadline(round.round_id, round.deadline);
    }

    fn round_started_event(&self, round: &Round, round_number: usize) -> GameEvent {
        GameEvent::RoundStarted {
            session_id: self.config.session_id,
            round_id: round.round_id,
            round_number,
            question_id: round.question.question_id,
            question_prompt: round.question.prompt.clone(),
            choices: round.question.choices.clone(),
            expected_answer_kind: round.question.expected_answer_kind(),
            released_at: round.released_at,
            handicap_ms: round.handicap.as_millis() as u64,
            deadline_at: round.deadline,
            nonce_token: round.nonce_token.clone(),
        }
    }

    fn round_number_of(&self, round_id: RoundId) -> usize {
        self.session
            .as_ref()
            .and_then(|s| s.rounds.iter().position(|r| r.round_id == round_id))
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    fn schedule_llm_start(&mut self, round_id: RoundId, handicap: Duration) {
        let tx = self.self_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(handicap).await;
            let _ = tx.send(SessionCommand::StartLlmForRound { round_id }).await;
        });
        if let Some(previous) = self.llm_start_tasks.insert(round_id, task) {
            previous.abort();
        }
    }

    fn schedule_round_deadline(&mut self, round_id: RoundId, deadline: chrono::DateTime<chrono::Utc>) {
        let delay = (deadline - self.ctx.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let tx = self.self_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx
                .send(SessionCommand::RoundDeadlineReached { round_id })
                .await;
        });
        if let Some(previous) = self.deadline_tasks.insert(round_id, task) {
            previous.abort();
        }
    }

    // ------------------------------------------------------------------------
    // Submissions
    // ------------------------------------------------------------------------

    async fn handle_submit_answer(
        &mut self,
        player_id: PlayerId,
        round_id: RoundId,
        nonce_token: String,
        answer: Answer,
        client_sent_at: Option<chrono::DateTime<chrono::Utc>>,
    ) {
        let now = self.ctx.clock.now();
        let Some(session) = self.session.as_mut() else {
            self.publish_error(ErrorCode::SessionNotReady, "session not initialized")
                .await;
            return;
        };

        let submitted = session.submit_answer(
            player_id,
            round_id,
            &nonce_token,
            answer,
            client_sent_at,
            now,
        );
        match submitted {
            Ok(player_type) => {
                self.publish(GameEvent::SubmissionReceived {
                    session_id: self.config.session_id,
                    round_id,
                    player_type,
                })
                .await;
                if player_type == PlayerType::Human {
                    self.publish_final_answer_if_ready(round_id).await;
                }
                self.resolve_round_if_ready(round_id).await;
            }
            Err(rejection) => self.publish_rejection(rejection).await,
        }
    }

    /// Submits the LLM's answer through the regular submission path, using
    /// the round's own nonce. The public `LlmFinalAnswer` event is withheld
    /// until the human has submitted; until then only a lock-in marker is
    /// broadcast (once).
    async fn submit_llm_answer(&mut self, round_id: RoundId, answer: LlmAnswer) {
        let (llm_player_id, nonce_token) = {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            let Some(round) = session.round(round_id) else {
                return;
            };
            (session.players.llm.player_id, round.nonce_token.clone())
        };

        self.stream_states
            .entry(round_id)
            .or_default()
            .pending_final_answer = Some(answer.clone());

        let now = self.ctx.clock.now();
        let submitted = self.session.as_mut().map(|session| {
            session.submit_answer(
                llm_player_id,
                round_id,
                &nonce_token,
                answer.final_answer.clone(),
                None,
                now,
            )
        });
        // A duplicate or late answer is a defensive no-op, not an error.
        if !matches!(submitted, Some(Ok(_))) {
            return;
        }

        self.publish(GameEvent::SubmissionReceived {
            session_id: self.config.session_id,
            round_id,
            player_type: PlayerType::Llm,
        })
        .await;

        let human_submitted = self
            .session
            .as_ref()
            .and_then(|s| s.round(round_id))
            .map(|r| r.human_submission.is_some())
            .unwrap_or(false);
        if human_submitted {
            self.publish_final_answer_if_ready(round_id).await;
        } else {
            let state = self.stream_states.entry(round_id).or_default();
            if !state.lock_in_emitted {
                state.lock_in_emitted = true;
                self.publish(GameEvent::LlmAnswerLockIn {
                    session_id: self.config.session_id,
                    round_id,
                })
                .await;
            }
        }

        self.resolve_round_if_ready(round_id).await;
    }

    /// Publishes the withheld `LlmFinalAnswer` once the human can no longer
    /// gain anything from seeing it. Idempotent per round.
    async fn publish_final_answer_if_ready(&mut self, round_id: RoundId) {
        let event = {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            let Some(round) = session.round(round_id) else {
                return;
            };
            if !round.is_in_progress() || round.human_submission.is_none() {
                return;
            }
            let Some(state) = self.stream_states.get_mut(&round_id) else {
                return;
            };
            if state.final_answer_published {
                return;
            }
            let Some(pending) = state.pending_final_answer.clone() else {
                return;
            };
            state.final_answer_published = true;
            GameEvent::LlmFinalAnswer {
                session_id: self.config.session_id,
                round_id,
                answer: pending,
            }
        };
        self.publish(event).await;
    }

    // ------------------------------------------------------------------------
    // LLM Stream
    // ------------------------------------------------------------------------

    /// Idempotent: a second start command for the same round is a no-op.
    async fn handle_start_llm(&mut self, round_id: RoundId) {
        if self.llm_tasks.contains_key(&round_id) || !self.round_in_progress(round_id) {
            return;
        }
        let round_ctx = {
            let Some(round) = self.session.as_ref().and_then(|s| s.round(round_id)) else {
                return;
            };
            RoundContext {
                question_id: round.question.question_id,
                question_prompt: round.question.prompt.clone(),
                choices: round.question.choices.clone(),
                expected_answer_kind: round.question.expected_answer_kind(),
                opponent_spec: self.config.opponent_spec.clone(),
            }
        };

        debug!(
            session_id = %self.config.session_id,
            round_id = %round_id,
            "starting LLM stream"
        );
        self.publish(GameEvent::LlmThinking {
            session_id: self.config.session_id,
            round_id,
        })
        .await;
        self.stream_states.entry(round_id).or_default();

        let gateway = Arc::clone(&self.ctx.llm_gateway);
        let policy = self.config.opponent_spec.streaming.clone();
        let tx = self.self_tx.clone();
        let task = tokio::spawn(async move {
            let upstream = gateway.stream_answer(round_ctx);
            let mut paced = RevealPacer::new(policy).apply(upstream);
            while let Some(event) = paced.next().await {
                let command = match event {
                    LlmStreamEvent::ReasoningDelta { delta_text, .. } => {
                        SessionCommand::LlmReasoningDelta {
                            round_id,
                            delta_text,
                        }
                    }
                    LlmStreamEvent::ReasoningTruncated { dropped_chars, .. } => {
                        SessionCommand::LlmReasoningTruncated {
                            round_id,
                            dropped_chars,
                        }
                    }
                    LlmStreamEvent::ReasoningEnded => {
                        SessionCommand::LlmReasoningEnded { round_id }
                    }
                    LlmStreamEvent::FinalAnswer { answer } => {
                        SessionCommand::LlmFinalAnswerReceived { round_id, answer }
                    }
                    LlmStreamEvent::Error { message, .. } => {
                        SessionCommand::LlmStreamErrored { round_id, message }
                    }
                };
                if tx.send(command).await.is_err() {
                    break;
                }
            }
        });
        self.llm_tasks.insert(round_id, task);
    }

    async fn handle_llm_reasoning_delta(&mut self, round_id: RoundId, delta_text: String) {
        if !self.round_in_progress(round_id) {
            return;
        }
        let seq = {
            let state = self.stream_states.entry(round_id).or_default();
            state.full_reasoning.push_str(&delta_text);
            let seq = state.next_seq;
            state.next_seq += 1;
            seq
        };
        self.publish(GameEvent::LlmReasoningDelta {
            session_id: self.config.session_id,
            round_id,
            delta_text,
            seq,
        })
        .await;
    }

    /// A failing stream degrades to an error event on the affected round;
    /// the session itself keeps running and the round resolves at its
    /// deadline if the LLM never answers.
    async fn handle_llm_stream_errored(&mut self, round_id: RoundId, message: String) {
        if !self.round_in_progress(round_id) {
            return;
        }
        error!(
            session_id = %self.config.session_id,
            round_id = %round_id,
            error = %message,
            "LLM stream error"
        );
        self.publish(GameEvent::LlmStreamError {
            session_id: self.config.session_id,
            round_id,
            message,
        })
        .await;
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    async fn resolve_round_if_ready(&mut self, round_id: RoundId) {
        let result = {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            let Some(round) = session.round(round_id) else {
                return;
            };
            if !round.is_in_progress() || !round.has_all_submissions() {
                return;
            }
            let (Some(human_sub), Some(llm_sub)) =
                (&round.human_submission, &round.llm_submission)
            else {
                return;
            };
            let human_outcome = self.ctx.verifier.verify(&round.question, human_sub);
            let llm_outcome = self.ctx.verifier.verify(&round.question, llm_sub);
            self.ctx.score_policy.compute(
                round,
                round.question.verifier_spec.correct_answer(),
                human_outcome.correct,
                llm_outcome.correct,
                RoundResolveReason::Normal,
            )
        };

        if let Some(session) = self.session.as_mut() {
            session.seal_round(round_id, result);
        }
        self.finalize_round(round_id).await;
    }

    /// Deadline fired: force-resolve the round, filling missing sides with
    /// zero-score timeout submissions.
    async fn handle_round_deadline_reached(&mut self, round_id: RoundId) {
        let now = self.ctx.clock.now();

        enum DeadlineAction {
            Reschedule(chrono::DateTime<chrono::Utc>),
            Resolve(Round),
        }

        let action = {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            let Some(round) = session.round(round_id) else {
                return;
            };
            if !round.is_in_progress() {
                return;
            }
            // The timer runs on runtime time; the deadline is owned by the
            // injected clock. Re-arm if the clock says we fired early.
            if now < round.deadline {
                DeadlineAction::Reschedule(round.deadline)
            } else {
                let correct_answer = round.question.verifier_spec.correct_answer();
                let human_missing = round.human_submission.is_none();
                let llm_missing = round.llm_submission.is_none();
                let reason = match (human_missing, llm_missing) {
                    (true, true) => RoundResolveReason::TimeoverBoth,
                    (true, false) => RoundResolveReason::TimeoverHuman,
                    (false, true) => RoundResolveReason::TimeoverLlm,
                    (false, false) => RoundResolveReason::Normal,
                };
                let timeout_submission = |player_id: PlayerId| Submission {
                    submission_id: Uuid::new_v4(),
                    player_id,
                    answer: correct_answer.clone(),
                    server_received_at: round.deadline,
                    client_sent_at: None,
                };

                let mut filled = round.clone();
                if human_missing {
                    filled.human_submission =
                        Some(timeout_submission(session.players.human.player_id));
                }
                if llm_missing {
                    filled.llm_submission = Some(timeout_submission(session.players.llm.player_id));
                }

                // A side that missed the deadline is incorrect by definition.
                let human_correct = !human_missing
                    && filled
                        .human_submission
                        .as_ref()
                        .map(|s| self.ctx.verifier.verify(&round.question, s).correct)
                        .unwrap_or(false);
                let llm_correct = !llm_missing
                    && filled
                        .llm_submission
                        .as_ref()
                        .map(|s| self.ctx.verifier.verify(&round.question, s).correct)
                        .unwrap_or(false);

                let result = self.ctx.score_policy.compute(
                    &filled,
                    correct_answer,
                    human_correct,
                    llm_correct,
                    reason,
                );
                filled.result = Some(result);
                DeadlineAction::Resolve(filled)
            }
        };

        match action {
            DeadlineAction::Reschedule(deadline) => {
                self.schedule_round_deadline(round_id, deadline);
            }
            DeadlineAction::Resolve(filled) => {
                debug!(
                    session_id = %self.config.session_id,
                    round_id = %round_id,
                    "round deadline reached, force-resolving"
                );
                if let Some(session) = self.session.as_mut() {
                    session.replace_round(filled);
                }
                self.finalize_round(round_id).await;
            }
        }
    }

    /// The single exit path for a resolved round: cancel its tasks, deliver
    /// LLM artifacts, broadcast the result and check for completion.
    async fn finalize_round(&mut self, round_id: RoundId) {
        let resolved_event = {
            let Some(round) = self.session.as_ref().and_then(|s| s.round(round_id)) else {
                return;
            };
            let Some(result) = round.result.as_ref() else {
                return;
            };
            GameEvent::RoundResolved {
                session_id: self.config.session_id,
                round_id,
                correct_answer: result.correct_answer.clone(),
                human_correct: result.human_outcome.correct,
                llm_correct: result.llm_outcome.correct,
                human_score: result.human_outcome.score.points,
                llm_score: result.llm_outcome.score.points,
                winner: result.winner,
                reason: result.reason,
            }
        };

        if let Some(task) = self.llm_tasks.remove(&round_id) {
            task.abort();
        }
        if let Some(task) = self.llm_start_tasks.remove(&round_id) {
            task.abort();
        }
        if let Some(task) = self.deadline_tasks.remove(&round_id) {
            task.abort();
        }

        self.emit_round_end_artifacts(round_id).await;
        self.publish(resolved_event).await;
        self.stream_states.remove(&round_id);

        self.handle_possible_completion().await;
    }

    /// Idempotent delivery of the round's LLM artifacts: the final answer
    /// (reconstructed from the submission if it was never published) and
    /// the full reasoning reveal.
    async fn emit_round_end_artifacts(&mut self, round_id: RoundId) {
        let final_event = {
            let state = self.stream_states.get(&round_id);
            let already = state.map(|s| s.final_answer_published).unwrap_or(false);
            if already {
                None
            } else {
                let pending = state.and_then(|s| s.pending_final_answer.clone());
                pending
                    .or_else(|| {
                        self.session
                            .as_ref()
                            .and_then(|s| s.round(round_id))
                            .and_then(|r| r.llm_submission.as_ref())
                            .map(|sub| LlmAnswer::of(sub.answer.clone()))
                    })
                    .map(|answer| GameEvent::LlmFinalAnswer {
                        session_id: self.config.session_id,
                        round_id,
                        answer,
                    })
            }
        };
        if let Some(event) = final_event {
            if let Some(state) = self.stream_states.get_mut(&round_id) {
                state.final_answer_published = true;
            }
            self.publish(event).await;
        }

        let reveal_event = {
            let state = self.stream_states.get(&round_id);
            let already = state.map(|s| s.reasoning_reveal_published).unwrap_or(false);
            if already {
                None
            } else {
                let mut text = state.map(|s| s.full_reasoning.clone()).unwrap_or_default();
                if text.is_empty() {
                    text = state
                        .and_then(|s| s.pending_final_answer.as_ref())
                        .and_then(|a| a.reasoning_summary.clone())
                        .unwrap_or_default();
                }
                if text.is_empty() {
                    None
                } else {
                    Some(GameEvent::LlmReasoningReveal {
                        session_id: self.config.session_id,
                        round_id,
                        full_reasoning: text,
                    })
                }
            }
        };
        if let Some(event) = reveal_event {
            if let Some(state) = self.stream_states.get_mut(&round_id) {
                state.reasoning_reveal_published = true;
            }
            self.publish(event).await;
        }
    }

    async fn handle_possible_completion(&mut self) {
        let (human_total, llm_total) = {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            if !session.is_completed() {
                return;
            }
            session.total_scores()
        };

        let now = self.ctx.clock.now();
        self.emit_session_resolved("completed", SessionState::Completed, now)
            .await;
        self.publish(GameEvent::SessionCompleted {
            session_id: self.config.session_id,
            human_total_score: human_total,
            llm_total_score: llm_total,
            human_won: human_total >= llm_total,
        })
        .await;
        self.save_session_result(human_total, llm_total).await;

        // Let the terminal events drain to clients before teardown.
        let tx = self.self_tx.clone();
        let grace = self.config.cleanup_grace;
        if let Some(previous) = self.grace_task.replace(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx
                .send(SessionCommand::Shutdown {
                    reason: "completed".to_string(),
                })
                .await;
        })) {
            previous.abort();
        }
    }

    /// Emits `SessionResolved` exactly once per session; the one summary
    /// clients may rely on regardless of how the session ended.
    async fn emit_session_resolved(&mut self, reason: &str, state: SessionState, now: chrono::DateTime<chrono::Utc>) {
        if self.session_resolved_emitted {
            return;
        }
        let event = {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            let (human_total, llm_total) = session.total_scores();
            let rounds_played = session.rounds_played();
            let winner = if rounds_played == 0 {
                MatchWinner::None
            } else if human_total > llm_total {
                MatchWinner::Human
            } else if llm_total > human_total {
                MatchWinner::Llm
            } else {
                MatchWinner::Tie
            };
            GameEvent::SessionResolved {
                session_id: self.config.session_id,
                state,
                reason: reason.to_string(),
                human_total_score: human_total,
                llm_total_score: llm_total,
                winner,
                rounds_played,
                total_rounds: GameSession::TOTAL_ROUNDS,
                resolved_at: now,
                duration_ms: (now - session.created_at).num_milliseconds().max(0) as u64,
            }
        };
        self.session_resolved_emitted = true;
        self.publish(event).await;
    }

    async fn save_session_result(&self, human_total: f64, llm_total: f64) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let now = self.ctx.clock.now();
        let difficulty = session
            .rounds
            .last()
            .map(|r| r.question.difficulty)
            .unwrap_or(crate::domain::Difficulty::Medium);
        let result = SessionResult {
            session_id: session.session_id,
            game_mode: session.mode,
            difficulty,
            llm_profile_name: session.llm_profile.display_name.clone(),
            human_nickname: session.players.human.nickname.clone(),
            human_user_id: session.players.human.player_id,
            human_score: human_total,
            llm_score: llm_total,
            human_won: human_total >= llm_total,
            duration_ms: (now - session.created_at).num_milliseconds().max(0) as u64,
            completed_at: now,
        };
        self.ctx.results.save_result(result).await;
    }

    // ------------------------------------------------------------------------
    // Termination
    // ------------------------------------------------------------------------

    async fn handle_timeout(&mut self, reason: String) {
        let now = self.ctx.clock.now();
        {
            let Some(session) = self.session.as_mut() else {
                // Never joined: nothing to resolve, just go away quietly.
                self.terminate();
                return;
            };
            if session.state == SessionState::Completed || session.is_completed() {
                return;
            }
            session.state = SessionState::Cancelled;
        }

        self.cancel_children();
        self.stream_states.clear();

        self.emit_session_resolved(&reason, SessionState::Cancelled, now)
            .await;
        self.publish(GameEvent::SessionTerminated {
            session_id: self.config.session_id,
            reason,
        })
        .await;
        self.terminate();
    }

    fn terminate(&mut self) {
        if self.on_terminate.send(self.config.session_id).is_err() {
            warn!(
                session_id = %self.config.session_id,
                "manager gone before actor termination notice"
            );
        }
        self.terminated = true;
    }

    fn cancel_children(&mut self) {
        for (_, task) in self.llm_tasks.drain() {
            task.abort();
        }
        for (_, task) in self.llm_start_tasks.drain() {
            task.abort();
        }
        for (_, task) in self.deadline_tasks.drain() {
            task.abort();
        }
        if let Some(task) = self.grace_task.take() {
            task.abort();
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn round_in_progress(&self, round_id: RoundId) -> bool {
        self.session
            .as_ref()
            .and_then(|s| s.round(round_id))
            .map(|r| r.is_in_progress())
            .unwrap_or(false)
    }

    async fn publish(&self, event: GameEvent) {
        self.ctx.bus.publish(event).await;
    }

    async fn publish_rejection(&self, rejection: CommandRejection) {
        self.publish_error(rejection.code, &rejection.message).await;
    }

    async fn publish_error(&self, code: ErrorCode, message: &str) {
        self.publish(GameEvent::SessionError {
            session_id: self.config.session_id,
            error_code: code,
            message: message.to_string(),
        })
        .await;
    }
}
