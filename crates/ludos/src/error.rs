//! Unified error type for the orchestrator.

use ludos_arena::ArenaError;
use ludos_game::GameError;
use ludos_players::RegistryError;
use ludos_types::{GameType, Phase, PlayerId, SessionId};

/// Errors surfaced to callers of the [`Orchestrator`](crate::Orchestrator).
///
/// Sub-crate errors that belong to the caller-facing taxonomy are folded
/// into its variants by the `From` impls below, so `?` lands them in the
/// right place. Everything else passes through transparently.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LudosError {
    /// No session of this type has room and no arena is free for a new one,
    /// or the requested session is full.
    #[error("no capacity for game type {0}")]
    CapacityExceeded(GameType),

    #[error("player {0} is already in session {1}")]
    AlreadyInSession(PlayerId, SessionId),

    #[error("unknown game type {0}")]
    UnknownGameType(GameType),

    /// The session does not exist or has already been cleaned up.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// The player is not in any session (or not in the one named).
    #[error("player {0} is not in a session")]
    NotInSession(PlayerId),

    #[error("session {session} is in {phase}, cannot {operation}")]
    InvalidPhase {
        session: SessionId,
        phase: Phase,
        operation: &'static str,
    },

    /// The orchestrator was built without a required part.
    #[error("orchestrator is missing {0}")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Game(GameError),

    #[error(transparent)]
    Arena(ArenaError),

    #[error(transparent)]
    Registry(RegistryError),
}

impl From<GameError> for LudosError {
    fn from(err: GameError) -> Self {
        match err {
            GameError::UnknownGameType(game_type) => Self::UnknownGameType(game_type),
            GameError::NotInSession(player, _) => Self::NotInSession(player),
            GameError::Unavailable(session) => Self::SessionNotFound(session),
            GameError::InvalidPhase {
                session,
                phase,
                operation,
            } => Self::InvalidPhase {
                session,
                phase,
                operation,
            },
            other => Self::Game(other),
        }
    }
}

impl From<ArenaError> for LudosError {
    fn from(err: ArenaError) -> Self {
        match err {
            ArenaError::Exhausted(game_type) => Self::CapacityExceeded(game_type),
            other => Self::Arena(other),
        }
    }
}

impl From<RegistryError> for LudosError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyInSession(player, session) => {
                Self::AlreadyInSession(player, session)
            }
            RegistryError::NotRegistered(player) => Self::NotInSession(player),
        }
    }
}
