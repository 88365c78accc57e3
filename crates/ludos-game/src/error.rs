//! Error types for the game layer.

use ludos_types::{GameType, Phase, PlayerId, SessionId};

/// Errors that can occur during module registration or session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// No module is registered for this game type.
    #[error("unknown game type {0}")]
    UnknownGameType(GameType),

    /// A module for this game type was already registered.
    #[error("game type {0} is already registered")]
    DuplicateGameType(GameType),

    /// The module's descriptor is unusable (e.g. min > max).
    #[error("invalid descriptor for {game_type}: {reason}")]
    InvalidDescriptor { game_type: GameType, reason: String },

    /// The session already holds its maximum number of players.
    #[error("session {0} is full")]
    SessionFull(SessionId),

    /// The session's current phase doesn't allow this operation.
    #[error("session {session} is in {phase}, cannot {operation}")]
    InvalidPhase {
        session: SessionId,
        phase: Phase,
        operation: &'static str,
    },

    /// The player is already a participant of this session.
    #[error("player {0} already in session {1}")]
    AlreadyJoined(PlayerId, SessionId),

    /// The player is not a participant of this session.
    #[error("player {0} not in session {1}")]
    NotInSession(PlayerId, SessionId),

    /// An explicit start was requested below the minimum player count.
    #[error("session {session} has {have} players, needs {need} to start")]
    NotEnoughPlayers {
        session: SessionId,
        have: usize,
        need: usize,
    },

    /// The session actor is gone (it reached Cleanup or its channel closed).
    #[error("session {0} is unavailable")]
    Unavailable(SessionId),
}
