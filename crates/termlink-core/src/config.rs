//! Client configuration.
//!
//! Values are injected by the embedding application; nothing here parses
//! files or command lines.

use std::time::Duration;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEIGHT, DEFAULT_KEEPALIVE_INTERVAL,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY, DEFAULT_RECONNECT_MULTIPLIER,
    DEFAULT_TERMINAL_TYPE, DEFAULT_WIDTH, INPUT_QUEUE_DEPTH, RESIZE_POLL_INTERVAL,
};
use crate::session::ReconnectPolicy;

/// Settings for a client session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote user name.
    pub user: String,
    /// Timeout for TCP dial plus handshake.
    pub connect_timeout: Duration,
    /// Keepalive interval while connected.
    pub keepalive_interval: Duration,
    /// Reconnection attempts after a transient failure (0 disables).
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnection attempt.
    pub reconnect_delay: Duration,
    /// Backoff growth factor.
    pub reconnect_multiplier: f64,
    /// Terminal type for the PTY request.
    pub default_terminal: String,
    /// Initial terminal width.
    pub initial_width: u16,
    /// Initial terminal height.
    pub initial_height: u16,
    /// Sampling interval of the resize monitor.
    pub resize_poll_interval: Duration,
    /// Depth of a display's input queue.
    pub input_queue_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            reconnect_multiplier: DEFAULT_RECONNECT_MULTIPLIER,
            default_terminal: DEFAULT_TERMINAL_TYPE.to_string(),
            initial_width: DEFAULT_WIDTH,
            initial_height: DEFAULT_HEIGHT,
            resize_poll_interval: RESIZE_POLL_INTERVAL,
            input_queue_depth: INPUT_QUEUE_DEPTH,
        }
    }
}

impl ClientConfig {
    /// Create a config for the given remote user with default values.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the keepalive interval.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the maximum reconnection attempts.
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the base reconnection delay and its growth factor.
    pub fn with_reconnect_backoff(mut self, delay: Duration, multiplier: f64) -> Self {
        self.reconnect_delay = delay;
        self.reconnect_multiplier = multiplier;
        self
    }

    /// Set the terminal type.
    pub fn with_terminal(mut self, term: impl Into<String>) -> Self {
        self.default_terminal = term.into();
        self
    }

    /// Set the initial terminal size.
    pub fn with_initial_size(mut self, width: u16, height: u16) -> Self {
        self.initial_width = width;
        self.initial_height = height;
        self
    }

    /// Set the resize monitor interval.
    pub fn with_resize_poll_interval(mut self, interval: Duration) -> Self {
        self.resize_poll_interval = interval;
        self
    }

    /// Reconnection policy derived from these settings.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.max_reconnect_attempts,
            self.reconnect_delay,
            self.reconnect_multiplier,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.reconnect_multiplier, 1.5);
        assert_eq!(config.default_terminal, "xterm-256color");
        assert_eq!((config.initial_width, config.initial_height), (80, 24));
        assert_eq!(config.resize_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn config_builder() {
        let config = ClientConfig::new("alice")
            .with_connect_timeout(Duration::from_secs(5))
            .with_max_reconnect_attempts(0)
            .with_reconnect_backoff(Duration::from_millis(100), 2.0)
            .with_terminal("vt100")
            .with_initial_size(132, 43);

        assert_eq!(config.user, "alice");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.max_reconnect_attempts, 0);
        assert_eq!(config.default_terminal, "vt100");
        assert_eq!((config.initial_width, config.initial_height), (132, 43));

        let policy = config.reconnect_policy();
        assert!(!policy.enabled());
        assert_eq!(policy.delay(1), Duration::from_millis(200));
    }
}
