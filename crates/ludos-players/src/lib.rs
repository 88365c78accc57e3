//! Player session registry for Ludos.
//!
//! Tracks which player belongs to which running minigame session and
//! whether they are still connected:
//!
//! 1. **Registration**: binding a player to exactly one session
//!    ([`PlayerRegistry::register`] is the atomic gate)
//! 2. **Connection status**: marking players disconnected mid-game so a
//!    returning player can be routed back into the session they left
//! 3. **Teardown**: unbinding everyone when a session reaches Cleanup
//!
//! # How it fits in the stack
//!
//! ```text
//! Orchestrator (above)  ← registers on join, unregisters on leave/cleanup
//!     ↕
//! Player registry (this crate)  ← player → session, connection status
//!     ↕
//! ludos-types (below)  ← PlayerId, SessionId
//! ```

mod error;
mod registration;
mod registry;

pub use error::RegistryError;
pub use registration::{ConnectionStatus, Registration};
pub use registry::PlayerRegistry;
