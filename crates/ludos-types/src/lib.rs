//! Shared vocabulary for Ludos.
//!
//! Every other crate in the workspace speaks in these types:
//!
//! - **Identity** ([`PlayerId`], [`SessionId`], [`ArenaId`], [`GameType`]):
//!   newtype wrappers so a session ID can never be passed where an arena
//!   ID is expected.
//! - **Lifecycle** ([`Phase`]): the five stages every minigame session
//!   walks through.
//! - **Outcome** ([`Verdict`], [`IncompleteReason`]): how an Active
//!   phase ended.
//!
//! # Where this sits
//!
//! ```text
//! ludos (orchestrator)
//!     ↕
//! ludos-game / ludos-arena / ludos-players
//!     ↕
//! ludos-types (this crate)  ← no runtime, no I/O, just data
//! ```

mod ids;
mod phase;
mod verdict;

pub use ids::{ArenaId, GameType, PlayerId, SessionId};
pub use phase::Phase;
pub use verdict::{IncompleteReason, Verdict};
