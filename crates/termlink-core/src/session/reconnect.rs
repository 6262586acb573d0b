//! Reconnection backoff.
//!
//! The delay after failed attempt `n` (0-indexed) is `base * multiplier^n`.
//! There is no upper cap on the delay; attempts are bounded by `max_attempts` instead.

use std::time::Duration;

use async_trait::async_trait;

use crate::constants::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY, DEFAULT_RECONNECT_MULTIPLIER,
};

/// Backoff policy for resuming a session after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RECONNECT_ATTEMPTS,
            DEFAULT_RECONNECT_DELAY,
            DEFAULT_RECONNECT_MULTIPLIER,
        )
    }
}

impl ReconnectPolicy {
    /// Create a policy. A non-finite or negative multiplier is treated as 1.
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 0.0 {
            multiplier
        } else {
            1.0
        };
        Self {
            max_attempts,
            base_delay,
            multiplier,
        }
    }

    /// Maximum number of connect attempts per reconnection.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether reconnection is allowed at all.
    pub fn enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay to wait after attempt `attempt` (0-indexed) fails, before the next.
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Sleep capability used between reconnection attempts.
///
/// Production code uses [`TokioSleeper`]; tests substitute an implementation
/// that records the requested delays and returns immediately.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
