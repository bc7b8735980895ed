//! Client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Real-time endpoint used when none is configured.
pub const DEFAULT_URL: &str = "ws://localhost:3000/websocket";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the backend's real-time endpoint.
    pub url: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Default reconnect policy against the given endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Linear backoff with a ceiling.
///
/// After the Nth consecutive failure (N starting at 1) the client waits
/// `N * base_delay` before reopening. Once `max_attempts` retries have failed
/// without a transport ever opening, it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
        }
    }
}

impl ReconnectPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// The attempt number to make after `attempts` failures, or `None` once
    /// the ceiling is reached.
    pub fn next_attempt(&self, attempts: u32) -> Option<u32> {
        (attempts < self.max_attempts).then(|| attempts + 1)
    }

    /// Wait before the given (1-based) attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay().saturating_mul(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.base_delay(), Duration::from_secs(1));
    }

    #[test]
    fn delay_is_linear() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<_> = (1..=5).map(|n| policy.delay_for(n).as_millis()).collect();
        assert_eq!(delays, [1000, 2000, 3000, 4000, 5000]);
    }

    #[test]
    fn attempts_stop_at_ceiling() {
        let policy = ReconnectPolicy::default();
        let mut attempts = 0;
        let mut made = Vec::new();
        while let Some(next) = policy.next_attempt(attempts) {
            made.push(next);
            attempts = next;
        }
        assert_eq!(made, [1, 2, 3, 4, 5]);
        assert_eq!(policy.next_attempt(5), None);
        assert_eq!(policy.next_attempt(9), None);
    }

    #[test]
    fn zero_ceiling_never_retries() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            base_delay_ms: 10,
        };
        assert_eq!(policy.next_attempt(0), None);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"url":"ws://chat.example/websocket","reconnect":{"base_delay_ms":250}}"#)
                .unwrap();
        assert_eq!(config.url, "ws://chat.example/websocket");
        assert_eq!(config.reconnect.base_delay_ms, 250);
        assert_eq!(config.reconnect.max_attempts, 5);
    }
}
