//! Orchestrator configuration.

use ludos_arena::PoolConfig;
use ludos_game::PhaseConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration for an [`Orchestrator`](crate::Orchestrator).
///
/// Loading it is up to the host. Every field has a default, so a partial
/// document deserializes fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Phase timings for every session.
    pub phases: PhaseConfig,

    /// Reset policy for arenas when the orchestrator builds the pool.
    pub pool: PoolConfig,

    /// Capacity of the session event broadcast. Slow subscribers lag
    /// behind and miss events past this many.
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            phases: PhaseConfig::default(),
            pool: PoolConfig::default(),
            event_buffer: 256,
        }
    }
}

impl OrchestratorConfig {
    pub fn validated(mut self) -> Self {
        self.phases = self.phases.validated();
        self.pool = self.pool.validated();
        if self.event_buffer == 0 {
            tracing::warn!("event_buffer of 0 raised to 1");
            self.event_buffer = 1;
        }
        self
    }
}
