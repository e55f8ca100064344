//! Per-mode active-session capacity limiting.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::GameMode;

/// Counting semaphore per [`GameMode`], bounding concurrently active
/// sessions.
///
/// The limit for a mode is read once, when that mode's semaphore is first
/// touched; it must be stable for the lifetime of the process.
pub struct ActiveSessionLimiter {
    max_active_by_mode: Box<dyn Fn(GameMode) -> i64 + Send + Sync>,
    semaphores: DashMap<GameMode, Arc<Semaphore>>,
}

impl ActiveSessionLimiter {
    pub fn new(max_active_by_mode: impl Fn(GameMode) -> i64 + Send + Sync + 'static) -> Self {
        Self {
            max_active_by_mode: Box::new(max_active_by_mode),
            semaphores: DashMap::new(),
        }
    }

    /// Tries to reserve one active-session slot for `mode`.
    ///
    /// A configured limit `<= 0` means unlimited: the returned permit is a
    /// no-op. Returns `None` when the mode is at capacity.
    pub fn try_acquire(&self, mode: GameMode) -> Option<CapacityPermit> {
        let max_active = (self.max_active_by_mode)(mode);
        if max_active <= 0 {
            return Some(CapacityPermit::unlimited());
        }
        let semaphore = self
            .semaphores
            .entry(mode)
            .or_insert_with(|| Arc::new(Semaphore::new(max_active as usize)))
            .clone();
        semaphore
            .try_acquire_owned()
            .ok()
            .map(CapacityPermit::held)
    }

    #[cfg(test)]
    fn available(&self, mode: GameMode) -> Option<usize> {
        self.semaphores.get(&mode).map(|s| s.available_permits())
    }
}

/// One reserved unit of active-session capacity.
///
/// `close` releases the unit exactly once; further calls (and the eventual
/// drop) are no-ops. Dropping an unclosed permit also releases it, so every
/// creation exit path gives the slot back.
pub struct CapacityPermit {
    inner: Mutex<Option<OwnedSemaphorePermit>>,
}

impl CapacityPermit {
    fn held(permit: OwnedSemaphorePermit) -> Self {
        Self {
            inner: Mutex::new(Some(permit)),
        }
    }

    fn unlimited() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub fn close(&self) {
        let permit = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(permit);
    }
}

impl std::fmt::Debug for CapacityPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapacityPermit").finish_non_exhaustive()
    }
}
