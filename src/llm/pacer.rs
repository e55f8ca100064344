//! Streaming reveal pacer.
//!
//! Turns a raw, arbitrarily bursty LLM event stream into a downstream
//! stream whose emission rate feels like live token generation:
//!
//! - waits `reveal_delay_ms` once before the first emission (the terminal
//!   is gated too),
//! - paces each delta by `emitted_token_count / target_tokens_per_second`,
//! - switches to burst pacing (`/ burst_multiplier_on_final`) the moment a
//!   terminal event has arrived upstream, interrupting any in-flight
//!   baseline wait,
//! - bounds buffering at `max_buffered_chars` by evicting oldest deltas
//!   (never the last one), reporting evictions as `ReasoningTruncated`
//!   ahead of the next delta,
//! - always emits the terminal event last, exactly once, and discards
//!   anything the upstream produces after it.
//!
//! The upstream is drained by a background collector task so slow
//! downstream consumers never exert backpressure on the provider.
//! Dropping the downstream stream halts both tasks at their next await.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use super::events::{LlmEventStream, LlmStreamEvent};

/// Downstream channel capacity. Small on purpose: the pacer itself is the
/// rate limiter, the channel only smooths scheduling jitter.
const DOWNSTREAM_CAPACITY: usize = 32;

/// How an opponent's reasoning stream is revealed to spectators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingPolicy {
    /// Wait before the first downstream emission, in milliseconds.
    pub reveal_delay_ms: u64,
    /// Baseline reveal rate. Zero or negative disables pacing entirely.
    pub target_tokens_per_second: i32,
    /// Rate multiplier once the terminal event has arrived upstream.
    pub burst_multiplier_on_final: f64,
    /// Buffered-character budget before oldest deltas are evicted.
    pub max_buffered_chars: usize,
}

impl Default for StreamingPolicy {
    fn default() -> Self {
        Self {
            reveal_delay_ms: 0,
            target_tokens_per_second: 0,
            burst_multiplier_on_final: 1.0,
            max_buffered_chars: 200_000,
        }
    }
}

/// Applies a [`StreamingPolicy`] to an upstream LLM event stream.
#[derive(Debug, Clone)]
pub struct RevealPacer {
    policy: StreamingPolicy,
}

impl RevealPacer {
    pub fn new(policy: StreamingPolicy) -> Self {
        Self { policy }
    }

    /// Spawns the collector and pacing tasks and returns the paced stream.
    pub fn apply(&self, upstream: LlmEventStream) -> LlmEventStream {
        let (tx, rx) = mpsc::channel(DOWNSTREAM_CAPACITY);
        let shared = Arc::new(Shared::default());

        let collector = tokio::spawn(collect_upstream(
            upstream,
            Arc::clone(&shared),
            self.policy.max_buffered_chars,
        ));
        tokio::spawn(run_pacing_loop(self.policy.clone(), shared, tx, collector));

        Box::pin(ReceiverStream::new(rx))
    }
}

// ============================================================================
// Shared State
// ============================================================================

struct BufferedDelta {
    delta_text: String,
    emitted_token_count: u32,
    total_token_count: u32,
}

impl BufferedDelta {
    fn into_event(self) -> LlmStreamEvent {
        LlmStreamEvent::ReasoningDelta {
            delta_text: self.delta_text,
            emitted_token_count: self.emitted_token_count,
            total_token_count: self.total_token_count,
        }
    }
}

#[derive(Default)]
struct PacerState {
    buffer: VecDeque<BufferedDelta>,
    buffered_chars: usize,
    /// Chars evicted locally since the last truncation emission.
    dropped_pending: usize,
    /// Truncation reported by the source itself; relayed before the terminal.
    source_truncation: Option<LlmStreamEvent>,
    terminal: Option<LlmStreamEvent>,
    upstream_done: bool,
    reasoning_ended: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<PacerState>,
    /// Signalled on every collector-side state change.
    updated: Notify,
    /// Signalled once, when the terminal event arrives upstream.
    terminal_arrived: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PacerState> {
        // The critical sections never panic; recover the guard regardless.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// Collector Task
// ============================================================================

async fn collect_upstream(mut upstream: LlmEventStream, shared: Arc<Shared>, max_buffered_chars: usize) {
    while let Some(event) = upstream.next().await {
        let terminal_just_arrived = {
            let mut st = shared.lock();
            match event {
                LlmStreamEvent::ReasoningDelta {
                    delta_text,
                    emitted_token_count,
                    total_token_count,
                } => {
                    // Deltas after the terminal or after reasoning ended are
                    // discarded per the stream contract.
                    if st.terminal.is_none() && !st.reasoning_ended {
                        st.buffered_chars += delta_text.len();
                        st.buffer.push_back(BufferedDelta {
                            delta_text,
                            emitted_token_count,
                            total_token_count,
                        });
                        // Evict oldest-first, but never the last remaining
                        // chunk: delta content is never split or rewritten.
                        while st.buffered_chars > max_buffered_chars && st.buffer.len() > 1 {
                            if let Some(oldest) = st.buffer.pop_front() {
                                st.buffered_chars -= oldest.delta_text.len();
                                st.dropped_pending += oldest.delta_text.len();
                            }
                        }
                    }
                    false
                }
                LlmStreamEvent::ReasoningEnded => {
                    st.reasoning_ended = true;
                    false
                }
                truncation @ LlmStreamEvent::ReasoningTruncated { .. } => {
                    st.source_truncation = Some(truncation);
                    false
                }
                terminal @ (LlmStreamEvent::FinalAnswer { .. } | LlmStreamEvent::Error { .. }) => {
                    // Only the first terminal counts.
                    if st.terminal.is_none() {
                        st.terminal = Some(terminal);
                        true
                    } else {
                        false
                    }
                }
            }
        };

        shared.updated.notify_one();
        if terminal_just_arrived {
            shared.terminal_arrived.notify_one();
        }
    }

    shared.lock().upstream_done = true;
    shared.updated.notify_one();
}

// ============================================================================
// Pacing Loop
// ============================================================================

struct Snapshot {
    delta: Option<BufferedDelta>,
    dropped: usize,
    terminal: Option<LlmStreamEvent>,
    terminal_known: bool,
    reasoning_ended: bool,
    upstream_done: bool,
}

async fn run_pacing_loop(
    policy: StreamingPolicy,
    shared: Arc<Shared>,
    tx: mpsc::Sender<LlmStreamEvent>,
    collector: tokio::task::JoinHandle<()>,
) {
    let base_ms_per_token = if policy.target_tokens_per_second <= 0 {
        0.0
    } else {
        1000.0 / f64::from(policy.target_tokens_per_second)
    };
    let burst_ms_per_token = if policy.burst_multiplier_on_final <= 0.0 {
        base_ms_per_token
    } else {
        base_ms_per_token / policy.burst_multiplier_on_final
    };
    // Round up so a paced delta never under-waits.
    let wait_for = |tokens: u32, burst: bool| -> u64 {
        let per_token = if burst { burst_ms_per_token } else { base_ms_per_token };
        let ms = f64::from(tokens) * per_token;
        if ms <= 0.0 {
            0
        } else {
            ms.ceil() as u64
        }
    };

    if policy.reveal_delay_ms > 0 {
        tokio::select! {
            _ = tx.closed() => {
                collector.abort();
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(policy.reveal_delay_ms)) => {}
        }
    }

    // A terminal that arrived during the reveal delay starts us in burst.
    let mut burst_mode = shared.lock().terminal.is_some();
    let mut reasoning_ended_emitted = false;

    loop {
        let snapshot = {
            let mut st = shared.lock();
            let delta = st.buffer.pop_front();
            if let Some(delta) = &delta {
                st.buffered_chars = st.buffered_chars.saturating_sub(delta.delta_text.len());
            }
            let dropped = std::mem::take(&mut st.dropped_pending);
            let terminal = if st.terminal.is_some() {
                st.terminal.clone()
            } else if st.upstream_done {
                // Upstream finished without a terminal; synthesize one so
                // the contract of exactly one terminal holds downstream.
                Some(LlmStreamEvent::Error {
                    message: "upstream completed without terminal event".to_string(),
                    cause: None,
                })
            } else {
                None
            };
            Snapshot {
                delta,
                dropped,
                terminal_known: st.terminal.is_some(),
                terminal,
                reasoning_ended: st.reasoning_ended,
                upstream_done: st.upstream_done,
            }
        };

        // Local evictions are reported before the delta that follows them.
        if snapshot.dropped > 0 {
            let truncated = LlmStreamEvent::ReasoningTruncated {
                dropped_chars: snapshot.dropped,
                reason: None,
            };
            if tx.send(truncated).await.is_err() {
                break;
            }
        }

        if let Some(delta) = snapshot.delta {
            let tokens = delta.emitted_token_count;
            if tx.send(delta.into_event()).await.is_err() {
                break;
            }

            // Terminal known and backlog drained: finish without pacing the
            // tail events.
            let drained_terminal = {
                let mut st = shared.lock();
                if st.terminal.is_some() && st.buffer.is_empty() {
                    let ended = st.reasoning_ended;
                    st.terminal
                        .clone()
                        .map(|t| (t, st.source_truncation.take(), ended))
                } else {
                    None
                }
            };
            if let Some((terminal, source_truncation, reasoning_ended)) = drained_terminal {
                emit_tail(
                    &tx,
                    reasoning_ended,
                    &mut reasoning_ended_emitted,
                    source_truncation,
                    terminal,
                )
                .await;
                break;
            }

            if !burst_mode && snapshot.terminal_known {
                burst_mode = true;
            }

            let wait_ms = wait_for(tokens, burst_mode);
            if wait_ms > 0 {
                let sleep = tokio::time::sleep(Duration::from_millis(wait_ms));
                if burst_mode {
                    tokio::select! {
                        _ = tx.closed() => break,
                        _ = sleep => {}
                    }
                } else {
                    tokio::select! {
                        _ = tx.closed() => break,
                        // Terminal arriving mid-wait cancels the remainder
                        // of the baseline wait.
                        _ = shared.terminal_arrived.notified() => {
                            burst_mode = true;
                        }
                        _ = sleep => {}
                    }
                }
            }
            continue;
        }

        // Buffer empty: reasoning end is relayed once all deltas are out.
        if snapshot.reasoning_ended && !reasoning_ended_emitted {
            reasoning_ended_emitted = true;
            if tx.send(LlmStreamEvent::ReasoningEnded).await.is_err() {
                break;
            }
            continue;
        }

        if let Some(terminal) = snapshot.terminal {
            let source_truncation = shared.lock().source_truncation.take();
            emit_tail(
                &tx,
                snapshot.reasoning_ended,
                &mut reasoning_ended_emitted,
                source_truncation,
                terminal,
            )
            .await;
            break;
        }

        if snapshot.upstream_done {
            break;
        }

        // Nothing to emit and upstream still live: wait for new data.
        tokio::select! {
            _ = tx.closed() => break,
            _ = shared.updated.notified() => {}
        }
    }

    debug!("reveal pacer finished, stopping upstream collector");
    collector.abort();
}

/// Emits the ordered stream tail: `ReasoningEnded` (if due), any
/// source-reported truncation, then the terminal event.
async fn emit_tail(
    tx: &mpsc::Sender<LlmStreamEvent>,
    reasoning_ended: bool,
    reasoning_ended_emitted: &mut bool,
    source_truncation: Option<LlmStreamEvent>,
    terminal: LlmStreamEvent,
) {
    if reasoning_ended && !*reasoning_ended_emitted {
        *reasoning_ended_emitted = true;
        if tx.send(LlmStreamEvent::ReasoningEnded).await.is_err() {
            return;
        }
    }
    if let Some(truncation) = source_truncation {
        if tx.send(truncation).await.is_err() {
            return;
        }
    }
    let _ = tx.send(terminal).await;
}
