//! Arena descriptors and status.

use std::fmt;

use ludos_types::{ArenaId, GameType, SessionId};

/// A reusable game space.
///
/// The pool owns arenas; sessions only keep the ID (and a clone of this
/// description) while the arena is allocated to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arena {
    pub id: ArenaId,
    /// Opaque reference understood by the world collaborator (a map
    /// name, a world folder, a region key).
    pub handle: String,
    /// Game types this arena can host. Empty means any.
    pub game_types: Vec<GameType>,
}

impl Arena {
    pub fn new(id: ArenaId, handle: impl Into<String>) -> Self {
        Self {
            id,
            handle: handle.into(),
            game_types: Vec::new(),
        }
    }

    /// Restricts the arena to the given game types.
    pub fn for_games<I, T>(mut self, games: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<GameType>,
    {
        self.game_types = games.into_iter().map(Into::into).collect();
        self
    }

    /// Returns `true` if this arena can host `game_type`.
    pub fn supports(&self, game_type: &GameType) -> bool {
        self.game_types.is_empty() || self.game_types.contains(game_type)
    }
}

/// Where an arena currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaStatus {
    /// Clean and allocatable.
    Free,
    /// Allocated to a session still gathering players.
    Reserved(SessionId),
    /// The session bound to it is playing.
    InUse(SessionId),
    /// Released and waiting for the world collaborator to reset it.
    /// `attempts` counts failed resets so far.
    DirtyPendingReset { attempts: u32 },
    /// Reset kept failing. Never allocated until manually retried.
    Unavailable,
}

impl ArenaStatus {
    /// The session holding this arena, if any.
    pub fn holder(self) -> Option<SessionId> {
        match self {
            Self::Reserved(s) | Self::InUse(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

impl fmt::Display for ArenaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "Free"),
            Self::Reserved(s) => write!(f, "Reserved({s})"),
            Self::InUse(s) => write!(f, "InUse({s})"),
            Self::DirtyPendingReset { attempts } => {
                write!(f, "DirtyPendingReset({attempts} failed)")
            }
            Self::Unavailable => write!(f, "Unavailable"),
        }
    }
}
