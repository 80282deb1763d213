//! Reconnect delay policy.

use crate::SyncConfig;
use std::time::Duration;

/// Exponential backoff: `min(base * 2^attempt, max)`, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl From<&SyncConfig> for BackoffPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            base_delay_ms: config.reconnect_base_delay_ms,
            max_delay_ms: config.reconnect_max_delay_ms,
        }
    }
}

impl BackoffPolicy {
    /// Delay in milliseconds before retry number `attempt` (0-indexed).
    ///
    /// Saturates to `max_delay_ms` once `2^attempt` or the product would
    /// overflow.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        2u64.checked_pow(attempt)
            .and_then(|factor| self.base_delay_ms.checked_mul(factor))
            .map_or(self.max_delay_ms, |ms| ms.min(self.max_delay_ms))
    }

    /// [`Self::delay_ms`] as a `Duration`.
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }
}
