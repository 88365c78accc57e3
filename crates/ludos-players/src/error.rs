//! Error types for the player registry.

use ludos_types::{PlayerId, SessionId};

/// Errors returned by [`PlayerRegistry`](crate::PlayerRegistry).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The player is already bound to a session. A player can be in at
    /// most one session at a time.
    #[error("player {0} is already in session {1}")]
    AlreadyInSession(PlayerId, SessionId),

    /// No registration exists for the player.
    #[error("player {0} is not registered to any session")]
    NotRegistered(PlayerId),
}
