//! What the registry knows about one player.

use ludos_types::{PlayerId, SessionId};
use tokio::time::Instant;

/// Whether a registered player is currently reachable.
///
/// ```text
///   Connected ──(disconnect)──→ Disconnected
///       ↑                            │
///       └────────(reconnect)─────────┘
/// ```
///
/// A disconnected player keeps their registration while their session
/// is running so they can come back to it. The registration disappears
/// only when they leave or the session is cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    /// Lost connection at `since`.
    Disconnected { since: Instant },
}

/// A player's binding to a session.
#[derive(Debug, Clone)]
pub struct Registration {
    pub player_id: PlayerId,
    pub session_id: SessionId,
    /// When the player was bound to the session.
    pub joined_at: Instant,
    pub status: ConnectionStatus,
}

impl Registration {
    pub(crate) fn new(player_id: PlayerId, session_id: SessionId) -> Self {
        Self {
            player_id,
            session_id,
            joined_at: Instant::now(),
            status: ConnectionStatus::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.status, ConnectionStatus::Connected)
    }
}
