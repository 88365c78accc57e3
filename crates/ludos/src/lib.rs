//! # Ludos
//!
//! Minigame orchestration engine for game servers.
//!
//! Ludos runs many concurrent minigame sessions of different types on
//! shared infrastructure. Each session follows the same lifecycle
//! (Lobby → Countdown → Active → Resolution → Cleanup) while the actual
//! rules live in pluggable [`GameModule`]s that the core never looks
//! inside.
//!
//! The [`Orchestrator`] ties the layers together: it resolves game types
//! through the [`ModuleRegistry`], allocates arenas from the
//! [`ArenaPool`], gates players through the [`PlayerRegistry`], spawns
//! one session actor per game and reclaims everything when a session
//! reaches Cleanup.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ludos::prelude::*;
//!
//! # async fn run(my_game: impl GameModule) -> Result<(), LudosError> {
//! let mut modules = ModuleRegistry::builder();
//! modules.register(my_game)?;
//!
//! let orchestrator = Orchestrator::builder()
//!     .modules(modules.build())
//!     .backend(NoopBackend, vec![Arena::new(ArenaId(1), "map-1")])
//!     .build()?;
//!
//! let session = orchestrator
//!     .request_join(PlayerId(1), &GameType::new("blockparty"))
//!     .await?;
//! # let _ = session;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod orchestrator;

pub use config::OrchestratorConfig;
pub use error::LudosError;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};

pub mod prelude {
    pub use crate::{LudosError, Orchestrator, OrchestratorBuilder, OrchestratorConfig};
    pub use ludos_arena::{Arena, ArenaBackend, ArenaPool, ArenaStatus, NoopBackend, PoolConfig};
    pub use ludos_game::{
        DisconnectOutcome, GameDescriptor, GameModule, ModuleRegistry, PhaseConfig, PlayerEvent,
        RulesHandler, SessionContext, SessionEvent, SessionInfo, VerdictReporter,
    };
    pub use ludos_players::{ConnectionStatus, PlayerRegistry};
    pub use ludos_types::{
        ArenaId, GameType, IncompleteReason, Phase, PlayerId, SessionId, Verdict,
    };
}
