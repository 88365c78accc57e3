//! Game modules and session lifecycle for Ludos.
//!
//! Each session runs as an isolated Tokio task (actor model) that owns
//! its phase, its participants, and the rules handler created for it by
//! a game module. Nothing outside the actor mutates a session: callers
//! talk to it through a [`SessionHandle`], and the actor reports back
//! through [`SessionEvent`]s.
//!
//! # Key types
//!
//! - [`GameModule`] / [`RulesHandler`]: what a minigame plugs in
//! - [`ModuleRegistry`]: game type → module, frozen after startup
//! - [`SessionHandle`]: send commands to a running session actor
//! - [`SessionEvent`]: phase changes, verdicts, cleanup notices
//! - [`PhaseConfig`]: phase timings

mod config;
mod error;
mod module;
mod registry;
mod session;

pub use config::PhaseConfig;
pub use error::GameError;
pub use module::{
    DisconnectOutcome, GameDescriptor, GameModule, PlayerEvent, RulesHandler, SessionContext,
    VerdictReporter,
};
pub use registry::{ModuleRegistry, ModuleRegistryBuilder, RegisteredModule};
pub use session::{
    DisconnectDisposition, SessionEvent, SessionHandle, SessionInfo, SessionParams, spawn_session,
};
