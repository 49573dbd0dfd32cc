//! Session configuration.
//!
//! Both configs have code defaults. `from_env` is opt-in for host
//! applications; nothing in this crate reads the environment on its own.

use std::time::Duration;

pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WS_PING_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_WS_PONG_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_WS_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// HTTP
// =============================================================================

/// Settings for the shared HTTP client owned by an [`crate::HttpSession`].
///
/// Per-request settings (timeout, TLS policy) live on [`crate::RequestSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// TCP/TLS connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Optional `User-Agent` sent on every request.
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { connect_timeout_secs: DEFAULT_HTTP_CONNECT_TIMEOUT_SECS, user_agent: None }
    }
}

impl HttpConfig {
    /// Build HTTP config from environment variables.
    ///
    /// - `HTTP_CONNECT_TIMEOUT_SECS`: default 30
    /// - `HTTP_USER_AGENT`: unset by default
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            connect_timeout_secs: env_parse("HTTP_CONNECT_TIMEOUT_SECS", DEFAULT_HTTP_CONNECT_TIMEOUT_SECS),
            user_agent: std::env::var("HTTP_USER_AGENT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// =============================================================================
// WEBSOCKET
// =============================================================================

/// Tuning knobs for a [`crate::WsSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsConfig {
    /// Interval between liveness probes, in milliseconds.
    pub ping_interval_ms: u64,
    /// How long a probe waits for its pong before declaring the socket dead.
    pub pong_timeout_ms: u64,
    /// Buffered messages per subscriber before slow readers start lagging.
    pub channel_capacity: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: DEFAULT_WS_PING_INTERVAL_MS,
            pong_timeout_ms: DEFAULT_WS_PONG_TIMEOUT_MS,
            channel_capacity: DEFAULT_WS_CHANNEL_CAPACITY,
        }
    }
}

impl WsConfig {
    /// Build WebSocket config from environment variables.
    ///
    /// - `WS_PING_INTERVAL_MS`: default 5000
    /// - `WS_PONG_TIMEOUT_MS`: default 5000
    /// - `WS_CHANNEL_CAPACITY`: default 256 (zero falls back to the default)
    #[must_use]
    pub fn from_env() -> Self {
        let channel_capacity = match env_parse("WS_CHANNEL_CAPACITY", DEFAULT_WS_CHANNEL_CAPACITY) {
            0 => DEFAULT_WS_CHANNEL_CAPACITY,
            n => n,
        };
        Self {
            ping_interval_ms: env_parse("WS_PING_INTERVAL_MS", DEFAULT_WS_PING_INTERVAL_MS),
            pong_timeout_ms: env_parse("WS_PONG_TIMEOUT_MS", DEFAULT_WS_PONG_TIMEOUT_MS),
            channel_capacity,
        }
    }

    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }

    #[must_use]
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
