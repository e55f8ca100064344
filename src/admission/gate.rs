//! The session admission gate: one decision per creation attempt,
//! combining per-mode capacity with the fixed-window quotas.

use std::sync::Arc;

use tracing::debug;

use crate::clock::SharedClock;
use crate::config::SessionLimitConfig;
use crate::domain::{ErrorCode, GameMode, PlayerId};

use super::limiter::{ActiveSessionLimiter, CapacityPermit};
use super::window::{AdmissionDenial, LimitEntry, WindowCounterRegistry};

/// Who is asking to create a session. Quotas key on both coordinates so
/// neither rotating IPs nor rotating player ids dodges them alone.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub player_id: PlayerId,
    pub ip_address: String,
}

impl ClientIdentity {
    fn ip_key(&self) -> &str {
        if self.ip_address.is_empty() {
            "unknown"
        } else {
            &self.ip_address
        }
    }
}

/// Decides whether a new session may be created, reserving capacity
/// atomically when it may.
pub struct SessionAdmissionGate {
    config: SessionLimitConfig,
    limiter: ActiveSessionLimiter,
    windows: WindowCounterRegistry,
}

impl SessionAdmissionGate {
    pub fn new(config: SessionLimitConfig, clock: SharedClock) -> Self {
        let capacity_config = config.clone();
        Self {
            limiter: ActiveSessionLimiter::new(move |mode| {
                capacity_config.for_mode(mode).max_active_sessions
            }),
            windows: WindowCounterRegistry::new(clock),
            config,
        }
    }

    /// One atomic admission decision for `(identity, mode)`.
    ///
    /// Either every limit is consumed and a permit is returned, or nothing
    /// is consumed at all. Window counters are never handed back; only the
    /// capacity unit is released when the permit closes.
    pub fn try_admit(
        &self,
        identity: &ClientIdentity,
        mode: GameMode,
    ) -> Result<AdmissionPermit, AdmissionDenial> {
        let label = mode.label();
        let capacity = self.limiter.try_acquire(mode).ok_or_else(|| {
            AdmissionDenial::new(
                ErrorCode::SessionLimitExceeded,
                format!("too many active {label} sessions"),
            )
        })?;

        if let Some(denial) = self.windows.try_acquire(&self.window_entries(identity, mode)) {
            debug!(
                player_id = %identity.player_id,
                mode = label,
                code = %denial.code,
                "session creation denied by window limits"
            );
            capacity.close();
            return Err(denial);
        }

        Ok(AdmissionPermit { capacity })
    }

    fn window_entries(&self, identity: &ClientIdentity, mode: GameMode) -> Vec<LimitEntry> {
        let limits = self.config.for_mode(mode);
        let label = mode.label();
        let prefix = format!("mode:{label}");
        let ip = identity.ip_key();
        let player = identity.player_id.to_string();
        let daily_window = self.config.daily_window();

        let mut entries = Vec::new();

        if limits.per_person_daily_limit > 0 && !daily_window.is_zero() {
            let denial = AdmissionDenial::new(
                ErrorCode::SessionLimitExceeded,
                format!("daily {label} session limit reached"),
            );
            entries.push(LimitEntry {
                key: format!("{prefix}:person:ip:{ip}:daily"),
                window: daily_window,
                limit: limits.per_person_daily_limit,
                denial: denial.clone(),
            });
            entries.push(LimitEntry {
                key: format!("{prefix}:person:player:{player}:daily"),
                window: daily_window,
                limit: limits.per_person_daily_limit,
                denial,
            });
        }

        if limits.per_person_window_limit > 0 && limits.per_person_window_ms > 0 {
            let window = std::time::Duration::from_millis(limits.per_person_window_ms);
            let denial =
                AdmissionDenial::new(ErrorCode::RateLimited, "session creation rate limited");
            entries.push(LimitEntry {
                key: format!("{prefix}:person:ip:{ip}:window"),
                window,
                limit: limits.per_person_window_limit,
                denial: denial.clone(),
            });
            entries.push(LimitEntry {
                key: format!("{prefix}:person:player:{player}:window"),
                window,
                limit: limits.per_person_window_limit,
                denial,
            });
        }

        if limits.global_window_limit > 0 && limits.global_window_ms > 0 {
            entries.push(LimitEntry {
                key: format!("{prefix}:global:window"),
                window: std::time::Duration::from_millis(limits.global_window_ms),
                limit: limits.global_window_limit,
                denial: AdmissionDenial::new(
                    ErrorCode::RateLimited,
                    format!("global {label} session rate limit reached"),
                ),
            });
        }

        if limits.global_daily_limit > 0 && !daily_window.is_zero() {
            entries.push(LimitEntry {
                key: format!("{prefix}:global:daily"),
                window: daily_window,
                limit: limits.global_daily_limit,
                denial: AdmissionDenial::new(
                    ErrorCode::SessionLimitExceeded,
                    format!("global daily {label} session limit reached"),
                ),
            });
        }

        entries
    }
}

/// Composite permit returned by a successful admission. Closing it gives
/// the capacity unit back; closing twice (or dropping after close) has no
/// further effect.
#[derive(Debug)]
pub struct AdmissionPermit {
    capacity: CapacityPermit,
}

impl AdmissionPermit {
    pub fn close(&self) {
        self.capacity.close();
    }
}
