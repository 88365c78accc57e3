//! The session lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The lifecycle phase of a minigame session.
///
/// ```text
/// Lobby ──→ Countdown ──→ Active ──→ Resolution ──→ Cleanup
///   ↑           │
///   └───────────┘   (player count dropped below minimum)
///
/// any non-terminal phase ──→ Cleanup   (abort / force end)
/// ```
///
/// - **Lobby**: accepting joins, waiting for enough players.
/// - **Countdown**: minimum reached, start timer running. Late joins are
///   still accepted up to the maximum.
/// - **Active**: the game module's rules handler is in charge.
/// - **Resolution**: post-game bookkeeping and announcements.
/// - **Cleanup**: terminal. Arena released, players unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Lobby,
    Countdown,
    Active,
    Resolution,
    Cleanup,
}

impl Phase {
    /// Returns `true` if new players may join a session in this phase.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Lobby | Self::Countdown)
    }

    /// Returns `true` once the session can no longer change phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cleanup)
    }

    /// The phase reached when nothing goes wrong.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Lobby => Some(Self::Countdown),
            Self::Countdown => Some(Self::Active),
            Self::Active => Some(Self::Resolution),
            Self::Resolution => Some(Self::Cleanup),
            Self::Cleanup => None,
        }
    }

    /// Returns `true` if moving from `self` to `target` is a legal edge.
    ///
    /// Legal edges are the forward edge ([`Phase::next`]), the
    /// Countdown → Lobby cancel, and an abort from any non-terminal phase
    /// straight to Cleanup.
    pub fn can_transition_to(self, target: Self) -> bool {
        if self.next() == Some(target) {
            return true;
        }
        match (self, target) {
            (Self::Countdown, Self::Lobby) => true,
            (from, Self::Cleanup) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lobby => "Lobby",
            Self::Countdown => "Countdown",
            Self::Active => "Active",
            Self::Resolution => "Resolution",
            Self::Cleanup => "Cleanup",
        };
        f.write_str(name)
    }
}
