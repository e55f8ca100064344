//! Engine configuration.
//!
//! All knobs deserialize from YAML with serde defaults, so a partial config
//! file (or none at all) yields a fully working engine. Paths and transport
//! settings live outside this crate.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::GameMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

/// Root engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session_limits: SessionLimitConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_saphyr::from_str(&contents)?)
    }
}

/// Session lifecycle and admission budgets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionLimitConfig {
    /// Fixed window for the daily quotas.
    pub daily_window_ms: u64,
    /// Command mailbox capacity per session actor.
    pub actor_mailbox_capacity: usize,
    /// How long a join waits for a racing creation to settle.
    pub join_timeout_ms: u64,
    /// Idle time after which a session is terminated.
    pub idle_timeout_ms: u64,
    /// Absolute session lifetime cap, regardless of activity.
    pub max_lifespan_ms: u64,
    /// Delay between session completion and actor teardown, so terminal
    /// events drain to clients.
    pub cleanup_grace_ms: u64,
    /// Time a player has to answer once a round is released (after the
    /// handicap).
    pub round_duration_ms: u64,
    pub lightweight: ModeLimitConfig,
    pub premium: ModeLimitConfig,
}

impl Default for SessionLimitConfig {
    fn default() -> Self {
        Self {
            daily_window_ms: 24 * 60 * 60 * 1000,
            actor_mailbox_capacity: 256,
            join_timeout_ms: 5_000,
            idle_timeout_ms: 10 * 60 * 1000,
            max_lifespan_ms: 60 * 60 * 1000,
            cleanup_grace_ms: 60_000,
            round_duration_ms: 60_000,
            lightweight: ModeLimitConfig::lightweight_defaults(),
            premium: ModeLimitConfig::premium_defaults(),
        }
    }
}

impl SessionLimitConfig {
    pub fn for_mode(&self, mode: GameMode) -> &ModeLimitConfig {
        match mode {
            GameMode::Lightweight => &self.lightweight,
            GameMode::Premium => &self.premium,
        }
    }

    pub fn daily_window(&self) -> Duration {
        Duration::from_millis(self.daily_window_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn max_lifespan(&self) -> Duration {
        Duration::from_millis(self.max_lifespan_ms)
    }

    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_millis(self.cleanup_grace_ms)
    }

    pub fn round_duration(&self) -> Duration {
        Duration::from_millis(self.round_duration_ms)
    }
}

/// Per-mode admission budgets. A limit of zero (or a zero window) disables
/// that check; `max_active_sessions <= 0` means unlimited capacity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModeLimitConfig {
    pub max_active_sessions: i64,
    pub per_person_daily_limit: u32,
    pub per_person_window_limit: u32,
    pub per_person_window_ms: u64,
    pub global_window_limit: u32,
    pub global_window_ms: u64,
    pub global_daily_limit: u32,
}

impl ModeLimitConfig {
    pub fn lightweight_defaults() -> Self {
        Self {
            max_active_sessions: 200,
            per_person_daily_limit: 30,
            per_person_window_limit: 5,
            per_person_window_ms: 60_000,
            global_window_limit: 60,
            global_window_ms: 60_000,
            global_daily_limit: 5_000,
        }
    }

    pub fn premium_defaults() -> Self {
        Self {
            max_active_sessions: 20,
            per_person_daily_limit: 5,
            per_person_window_limit: 2,
            per_person_window_ms: 60_000,
            global_window_limit: 10,
            global_window_ms: 60_000,
            global_daily_limit: 300,
        }
    }
}

impl Default for ModeLimitConfig {
    fn default() -> Self {
        Self::lightweight_defaults()
    }
}
