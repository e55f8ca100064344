//! Fixed-window rate counters with atomic multi-key check-and-consume.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::SharedClock;
use crate::domain::ErrorCode;

/// Default horizon after which idle counters are swept: safely longer than
/// the largest configured window (24h daily quotas).
const DEFAULT_EVICTION: Duration = Duration::from_secs(25 * 60 * 60);

/// Denial returned when a window entry would be exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDenial {
    pub code: ErrorCode,
    pub message: String,
}

impl AdmissionDenial {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// One limit to check-and-consume in an admission attempt.
#[derive(Debug, Clone)]
pub struct LimitEntry {
    pub key: String,
    pub window: Duration,
    pub limit: u32,
    pub denial: AdmissionDenial,
}

struct WindowCounter {
    window_start: DateTime<Utc>,
    count: u32,
    last_access: DateTime<Utc>,
}

impl WindowCounter {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: DateTime::<Utc>::MIN_UTC,
            count: 0,
            last_access: now,
        }
    }

    fn rotate_if_needed(&mut self, now: DateTime<Utc>, window: Duration) {
        let elapsed = (now - self.window_start).to_std().unwrap_or(Duration::MAX);
        if elapsed >= window {
            self.window_start = now;
            self.count = 0;
        }
    }

    fn can_consume(&mut self, now: DateTime<Utc>, window: Duration, limit: u32) -> bool {
        if limit == 0 || window.is_zero() {
            return true;
        }
        self.rotate_if_needed(now, window);
        self.count + 1 <= limit
    }

    fn consume(&mut self, now: DateTime<Utc>, window: Duration) {
        if window.is_zero() {
            return;
        }
        self.rotate_if_needed(now, window);
        self.count += 1;
        self.last_access = now;
    }
}

struct RegistryState {
    counters: HashMap<String, WindowCounter>,
    last_sweep: DateTime<Utc>,
}

/// Fixed-window counters keyed by string, shared by every admission
/// attempt in the process.
///
/// `try_acquire` validates every entry before committing any of them, so a
/// mid-list failure consumes nothing. Counters untouched for longer than
/// the eviction horizon are swept to bound memory.
pub struct WindowCounterRegistry {
    clock: SharedClock,
    eviction: Duration,
    state: Mutex<RegistryState>,
}

impl WindowCounterRegistry {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_eviction(clock, DEFAULT_EVICTION)
    }

    pub fn with_eviction(clock: SharedClock, eviction: Duration) -> Self {
        let now = clock.now();
        Self {
            clock,
            eviction,
            state: Mutex::new(RegistryState {
                counters: HashMap::new(),
                last_sweep: now,
            }),
        }
    }

    /// Atomically checks all entries and, only if every one passes,
    /// consumes all of them. Returns the first failing entry's denial.
    pub fn try_acquire(&self, entries: &[LimitEntry]) -> Option<AdmissionDenial> {
        if entries.is_empty() {
            return None;
        }
        let now = self.clock.now();
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Self::sweep_if_due(&mut state, now, self.eviction);

        for entry in entries {
            let counter = state
                .counters
                .entry(entry.key.clone())
                .or_insert_with(|| WindowCounter::new(now));
            if !counter.can_consume(now, entry.window, entry.limit) {
                return Some(entry.denial.clone());
            }
        }
        for entry in entries {
            if let Some(counter) = state.counters.get_mut(&entry.key) {
                counter.consume(now, entry.window);
            }
        }
        None
    }

    fn sweep_if_due(state: &mut RegistryState, now: DateTime<Utc>, eviction: Duration) {
        // Sweeping on a fraction of the horizon keeps the scan rare while
        // still bounding idle-counter lifetime.
        let sweep_interval = eviction / 4;
        let due = (now - state.last_sweep).to_std().unwrap_or(Duration::MAX) >= sweep_interval;
        if !due {
            return;
        }
        state.last_sweep = now;
        state
            .counters
            .retain(|_, c| (now - c.last_access).to_std().unwrap_or(Duration::MAX) < eviction);
    }

    #[cfg(test)]
    fn counter_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .counters
            .len()
    }
}
