//! Cancellable phase deadline with generation tokens.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

/// Identifies one arming of a [`PhaseTimer`].
///
/// Tokens are compared by generation only. Once the timer is re-armed or
/// cancelled, every older token is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    generation: u64,
}

impl TimerToken {
    pub fn generation(self) -> u64 {
        self.generation
    }
}

/// A single optional deadline for the current phase.
///
/// Arming replaces any previous deadline. The generation counter only
/// ever grows, so it doubles as a phase-generation counter for anything
/// else that needs to detect staleness (verdict reports, for example).
#[derive(Debug, Default)]
pub struct PhaseTimer {
    generation: u64,
    deadline: Option<Instant>,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer to expire `after` from now and returns its token.
    pub fn arm(&mut self, after: Duration) -> TimerToken {
        self.generation += 1;
        self.deadline = Some(Instant::now() + after);
        trace!(generation = self.generation, ?after, "phase timer armed");
        self.token()
    }

    /// Disarms the timer. Any outstanding token becomes stale.
    pub fn cancel(&mut self) {
        self.generation += 1;
        if self.deadline.take().is_some() {
            trace!(generation = self.generation, "phase timer cancelled");
        }
    }

    /// Resolves once the armed deadline passes, yielding the token that
    /// was current when this future was created.
    ///
    /// Pends forever while disarmed.
    pub async fn expired(&self) -> TimerToken {
        let token = self.token();
        match self.deadline {
            Some(deadline) => {
                time::sleep_until(deadline).await;
                token
            }
            None => std::future::pending().await,
        }
    }

    /// Returns `true` if `token` belongs to the current generation.
    pub fn is_current(&self, token: TimerToken) -> bool {
        token.generation == self.generation
    }

    /// The token for the current generation.
    pub fn token(&self) -> TimerToken {
        TimerToken {
            generation: self.generation,
        }
    }

    /// Time left before expiry, `None` when disarmed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}
