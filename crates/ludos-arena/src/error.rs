//! Error types for the arena pool.

use ludos_types::{ArenaId, GameType};

use crate::ArenaStatus;

/// Errors that can occur during arena pool operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    /// No Free arena can host this game type right now. The pool never
    /// queues: callers get this immediately.
    #[error("no free arena for game type {0}")]
    Exhausted(GameType),

    /// The arena ID is not part of the pool.
    #[error("arena {0} not found")]
    NotFound(ArenaId),

    /// An arena with this ID was already added.
    #[error("arena {0} already exists")]
    Duplicate(ArenaId),

    /// `release` was called on an arena that is not allocated. This is
    /// a double release: the pool state is left untouched.
    #[error("arena {0} is not in use")]
    NotInUse(ArenaId),

    /// The arena is in a status that doesn't allow this operation.
    #[error("arena {arena} is {status}, cannot {operation}")]
    InvalidStatus {
        arena: ArenaId,
        status: ArenaStatus,
        operation: &'static str,
    },

    /// The world collaborator failed to reset the arena.
    #[error("reset of arena {arena} failed: {reason}")]
    ResetFailed { arena: ArenaId, reason: String },
}
