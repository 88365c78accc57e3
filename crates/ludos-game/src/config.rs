//! Phase timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timings shared by every session unless a game descriptor overrides
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    /// How long a lobby may sit below its minimum before the session
    /// aborts.
    pub lobby_timeout: Duration,

    /// Length of the pre-game countdown.
    pub countdown: Duration,

    /// Hard ceiling on the Active phase. A rules handler that has not
    /// reported a verdict by then is overruled with an incomplete verdict.
    pub verdict_ceiling: Duration,

    /// Length of the post-game Resolution phase.
    pub resolution: Duration,

    /// Start the countdown as soon as the minimum player count is
    /// reached. When `false`, an explicit start command is required.
    pub auto_start: bool,

    /// Capacity of each session actor's command channel.
    pub command_buffer: usize,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            lobby_timeout: Duration::from_secs(120),
            countdown: Duration::from_secs(10),
            verdict_ceiling: Duration::from_secs(15 * 60),
            resolution: Duration::from_secs(5),
            auto_start: true,
            command_buffer: 64,
        }
    }
}

impl PhaseConfig {
    /// Fixes values that would wedge a session.
    pub fn validated(mut self) -> Self {
        if self.command_buffer == 0 {
            tracing::warn!("command_buffer of 0 raised to 1");
            self.command_buffer = 1;
        }
        if self.verdict_ceiling.is_zero() {
            tracing::warn!("verdict_ceiling of 0 replaced with default");
            self.verdict_ceiling = Self::default().verdict_ceiling;
        }
        self
    }
}
