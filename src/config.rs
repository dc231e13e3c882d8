//! Client configuration parsed from environment variables.
//!
//! Every knob has a typed default; unparsable values fall back to it.
//! Command-line flags override what is read here.

use std::path::PathBuf;
use std::time::Duration;

use crate::services::connection::ConnectionStatus;

pub const DEFAULT_DATA_DIR: &str = ".wsprobe";
pub const DEFAULT_STORAGE_KEY: &str = "websocket-manager-storage";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = crate::transport::tungstenite::DEFAULT_CONNECT_TIMEOUT_SECS;
pub const DEFAULT_AUTO_RECONNECT: bool = true;
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 1000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 10_000;

/// Collaborator-side reconnect policy. The core never retries on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub base_ms: u64,
    pub max_ms: u64,
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based): base doubled per
    /// attempt, capped at max.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.max_ms))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { enabled: DEFAULT_AUTO_RECONNECT, base_ms: DEFAULT_RECONNECT_BASE_MS, max_ms: DEFAULT_RECONNECT_MAX_MS }
    }
}

/// Decides when a session reconnects on its own.
///
/// Feed every observed status to `observe`. A drop to `Disconnected` that
/// the user did not ask for yields the backoff delay, once; the session
/// reports `fired` when it acts on it. A successful open or an explicit
/// user connect resets the backoff. A sustained `Error` never reaches
/// `Disconnected`, so it never schedules anything.
#[derive(Debug, Clone)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    last: ConnectionStatus,
    attempt: u32,
    user_closed: bool,
    pending: bool,
}

impl ReconnectTracker {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, last: ConnectionStatus::Disconnected, attempt: 0, user_closed: false, pending: false }
    }

    /// Retries scheduled since the last successful open or user connect.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn user_connect(&mut self) {
        self.user_closed = false;
        self.attempt = 0;
        self.pending = false;
    }

    /// No reconnects until the next `user_connect`.
    pub fn user_close(&mut self) {
        self.user_closed = true;
        self.pending = false;
    }

    pub fn fired(&mut self) {
        self.pending = false;
    }

    /// Record `status`; returns the delay before reconnecting when the
    /// connection just dropped without the user asking.
    pub fn observe(&mut self, status: ConnectionStatus) -> Option<Duration> {
        let previous = std::mem::replace(&mut self.last, status);
        if status == previous {
            return None;
        }
        match status {
            ConnectionStatus::Connected => {
                self.attempt = 0;
                None
            }
            ConnectionStatus::Disconnected if self.policy.enabled && !self.user_closed && !self.pending => {
                let delay = self.policy.delay(self.attempt);
                self.attempt = self.attempt.saturating_add(1);
                self.pending = true;
                Some(delay)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub storage_key: String,
    pub connect_timeout_secs: u64,
    pub reconnect: ReconnectPolicy,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `WSPROBE_DATA_DIR`: default `.wsprobe`
    /// - `WSPROBE_STORAGE_KEY`: default `websocket-manager-storage`
    /// - `WSPROBE_CONNECT_TIMEOUT_SECS`: default 10
    /// - `WSPROBE_AUTO_RECONNECT`: `true` (default) or `false`
    /// - `WSPROBE_RECONNECT_BASE_MS`: default 1000
    /// - `WSPROBE_RECONNECT_MAX_MS`: default 10000
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            data_dir: PathBuf::from(env_string("WSPROBE_DATA_DIR", DEFAULT_DATA_DIR)),
            storage_key: env_string("WSPROBE_STORAGE_KEY", DEFAULT_STORAGE_KEY),
            connect_timeout_secs: env_parse("WSPROBE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
            reconnect: ReconnectPolicy {
                enabled: env_parse("WSPROBE_AUTO_RECONNECT", DEFAULT_AUTO_RECONNECT),
                base_ms: env_parse("WSPROBE_RECONNECT_BASE_MS", DEFAULT_RECONNECT_BASE_MS),
                max_ms: env_parse("WSPROBE_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS),
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(v) => v.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Non-blank value of `key`, or `default`.
pub(crate) fn env_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
