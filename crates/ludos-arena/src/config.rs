//! Pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How hard the pool tries to reset a dirty arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Reset attempts before an arena is retired as Unavailable.
    pub max_reset_attempts: u32,

    /// Pause between two failed reset attempts.
    pub reset_retry_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_reset_attempts: 3,
            reset_retry_delay: Duration::from_millis(250),
        }
    }
}

impl PoolConfig {
    /// At least one reset attempt is always made.
    pub fn validated(mut self) -> Self {
        if self.max_reset_attempts == 0 {
            tracing::warn!("max_reset_attempts of 0 raised to 1");
            self.max_reset_attempts = 1;
        }
        self
    }
}
