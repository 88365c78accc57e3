//! Timing primitives for Ludos session actors.
//!
//! Two independent clocks live inside every session actor:
//!
//! - [`PhaseTimer`]: the single cancellable deadline of the current
//!   phase (lobby idle bound, countdown, verdict ceiling, resolution).
//!   Every arm bumps a generation counter, and the [`TimerToken`] handed
//!   back by an expiry is checked against it, so a deadline armed for an
//!   earlier phase can never act on a later one.
//! - [`TickScheduler`]: the fixed-timestep cadence driving a game
//!   module's per-tick logic during the Active phase. A tick rate of 0 is
//!   event-driven and [`TickScheduler::wait_for_tick`] pends forever.
//!
//! # Integration
//!
//! Both sit inside the actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* joins, leaves, verdicts */ }
//!         token = timer.expired() => {
//!             if timer.is_current(token) { /* phase deadline reached */ }
//!         }
//!         info = ticker.wait_for_tick() => {
//!             handler.on_tick(info.dt);
//!             ticker.record_tick_end();
//!         }
//!     }
//! }
//! ```

mod timer;

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

pub use timer::{PhaseTimer, TimerToken};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the tick scheduler.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Tick rate in Hz. 0 = event-driven (tick never fires).
    pub tick_rate_hz: u32,
    /// Fraction of the tick budget (0.0–1.0) above which a warning is
    /// logged by [`TickScheduler::record_tick_end`].
    pub budget_warn_threshold: f64,
    /// Random jitter (0–max µs) added to the first tick so sessions that
    /// go Active at the same instant don't tick in lockstep.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 0,
            budget_warn_threshold: 0.80,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    /// Maximum supported tick rate.
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    /// Config for a specific tick rate with default settings.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            warn!(
                rate = self.tick_rate_hz,
                max = Self::MAX_TICK_RATE_HZ,
                "tick_rate_hz exceeds maximum, clamping"
            );
            self.tick_rate_hz = Self::MAX_TICK_RATE_HZ;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Duration of one tick, `None` in event-driven mode.
    pub fn tick_duration(&self) -> Option<Duration> {
        if self.tick_rate_hz == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(1.0 / self.tick_rate_hz as f64))
        }
    }
}

// ---------------------------------------------------------------------------
// Tick info / metrics
// ---------------------------------------------------------------------------

/// Returned by [`TickScheduler::wait_for_tick`] for each tick.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number, starting at 1.
    pub tick: u64,
    /// Fixed delta time, always `1 / tick_rate`.
    pub dt: Duration,
}

/// Counters kept by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Longest handler execution time seen by `record_tick_end`.
    pub max_tick_time: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-timestep tick scheduler, one per session actor.
///
/// Overruns are handled by skipping: when the actor wakes up more than
/// one tick late, missed ticks are dropped and the cadence restarts from
/// now.
pub struct TickScheduler {
    config: TickConfig,
    tick_duration: Option<Duration>,
    tick_count: u64,
    next_tick: Option<Instant>,
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();

        let next_tick = tick_duration.map(|d| {
            let jitter = if config.initial_jitter_us > 0 {
                Duration::from_micros(rand::rng().random_range(0..config.initial_jitter_us))
            } else {
                Duration::ZERO
            };
            Instant::now() + d + jitter
        });

        if let Some(d) = tick_duration {
            debug!(
                rate_hz = config.tick_rate_hz,
                budget_ms = d.as_secs_f64() * 1000.0,
                "tick scheduler created"
            );
        }

        Self {
            config,
            tick_duration,
            tick_count: 0,
            next_tick,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    /// Scheduler for a given rate with default settings.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// An event-driven scheduler that never ticks.
    pub fn idle() -> Self {
        Self::with_rate(0)
    }

    /// Waits until the next tick is due.
    ///
    /// Pends forever in event-driven mode, which lets
    /// `tokio::select!` keep serving its other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, tick_dur) = match (self.next_tick, self.tick_duration) {
            (Some(next), Some(dur)) => (next, dur),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.tick_start = Some(now);

        let late_by = now.saturating_duration_since(next);
        let ticks_skipped = (late_by.as_nanos() / tick_dur.as_nanos()) as u64;
        if ticks_skipped > 0 {
            self.metrics.total_overruns += 1;
            self.metrics.total_skipped += ticks_skipped;
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick overrun, skipping ahead"
            );
            self.next_tick = Some(now + tick_dur);
        } else {
            self.next_tick = Some(next + tick_dur);
        }
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, "tick fired");

        TickInfo {
            tick: self.tick_count,
            dt: tick_dur,
        }
    }

    /// Records that the handler finished the current tick.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        if elapsed > self.metrics.max_tick_time {
            self.metrics.max_tick_time = elapsed;
        }

        if let Some(budget) = self.tick_duration {
            let utilization = elapsed.as_secs_f64() / budget.as_secs_f64();
            if utilization >= self.config.budget_warn_threshold {
                warn!(
                    tick = self.tick_count,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    budget_ms = budget.as_secs_f64() * 1000.0,
                    "tick approaching budget limit"
                );
            }
        }
    }

    pub fn is_event_driven(&self) -> bool {
        self.tick_duration.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
