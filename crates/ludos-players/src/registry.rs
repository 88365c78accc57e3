//! The registry itself: a concurrent player → session map.
//!
//! # Concurrency note
//!
//! Unlike most Ludos state, the registry is touched from many places at
//! once: the orchestrator's join path, disconnect events from the host
//! server, and Cleanup of any number of sessions. It is backed by a
//! `DashMap`, so every method takes `&self` and is safe to call from any
//! task. [`PlayerRegistry::register`] goes through the map's `entry`
//! API, which holds the shard lock across the check and the insert:
//! of two racing registrations for one player, exactly the first wins.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ludos_types::{PlayerId, SessionId};
use tokio::time::Instant;

use crate::{ConnectionStatus, Registration, RegistryError};

/// Maps each player to the session they belong to.
///
/// ## Lifecycle
///
/// ```text
/// register() ──→ [Connected] ──mark_disconnected()──→ [Disconnected]
///     │               ↑                                    │
///     │               └────────mark_connected()────────────┘
///     ▼
/// unregister() / unregister_session()  ──→  (gone)
/// ```
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    entries: DashMap<PlayerId, Registration>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `player` to `session`.
    ///
    /// # Errors
    /// [`RegistryError::AlreadyInSession`] if the player is already bound,
    /// even to the same session.
    pub fn register(
        &self,
        player: PlayerId,
        session: SessionId,
    ) -> Result<Registration, RegistryError> {
        match self.entries.entry(player) {
            Entry::Occupied(existing) => Err(RegistryError::AlreadyInSession(
                player,
                existing.get().session_id,
            )),
            Entry::Vacant(slot) => {
                let registration = Registration::new(player, session);
                slot.insert(registration.clone());
                tracing::debug!(player_id = %player, session_id = %session, "player registered");
                Ok(registration)
            }
        }
    }

    /// Removes the player's registration. Idempotent: unregistering an
    /// unknown player returns `None` and changes nothing.
    pub fn unregister(&self, player: PlayerId) -> Option<Registration> {
        let removed = self.entries.remove(&player).map(|(_, r)| r);
        if let Some(r) = &removed {
            tracing::debug!(player_id = %player, session_id = %r.session_id, "player unregistered");
        }
        removed
    }

    /// Removes the player only if they are still bound to `session`.
    pub fn unregister_from(&self, player: PlayerId, session: SessionId) -> bool {
        self.entries
            .remove_if(&player, |_, r| r.session_id == session)
            .is_some()
    }

    /// Unregisters every listed player that still points at `session`.
    ///
    /// Returns how many registrations were removed.
    pub fn unregister_session(&self, session: SessionId, players: &[PlayerId]) -> usize {
        let removed = players
            .iter()
            .filter(|p| self.unregister_from(**p, session))
            .count();
        // Sweep for anyone the caller's list missed. Counted inside the
        // closure: other sessions register concurrently.
        let mut swept = 0;
        self.entries.retain(|_, r| {
            let keep = r.session_id != session;
            if !keep {
                swept += 1;
            }
            keep
        });
        if swept > 0 {
            tracing::warn!(session_id = %session, swept, "stale registrations swept at cleanup");
        }
        removed + swept
    }

    /// The session the player is in, if any.
    pub fn lookup(&self, player: PlayerId) -> Option<SessionId> {
        self.entries.get(&player).map(|r| r.session_id)
    }

    /// A copy of the player's full registration.
    pub fn get(&self, player: PlayerId) -> Option<Registration> {
        self.entries.get(&player).map(|r| r.value().clone())
    }

    /// Marks a registered player as disconnected.
    ///
    /// Returns the session they were in.
    ///
    /// # Errors
    /// [`RegistryError::NotRegistered`] for an unknown player.
    pub fn mark_disconnected(&self, player: PlayerId) -> Result<SessionId, RegistryError> {
        let mut entry = self
            .entries
            .get_mut(&player)
            .ok_or(RegistryError::NotRegistered(player))?;
        if entry.is_connected() {
            entry.status = ConnectionStatus::Disconnected {
                since: Instant::now(),
            };
        }
        Ok(entry.session_id)
    }

    /// Like [`mark_disconnected`](Self::mark_disconnected), but only if
    /// the player is still bound to `session`.
    ///
    /// # Errors
    /// [`RegistryError::NotRegistered`] if the player is unknown or bound
    /// to another session.
    pub fn mark_disconnected_in(
        &self,
        player: PlayerId,
        session: SessionId,
    ) -> Result<(), RegistryError> {
        match self.entries.get_mut(&player) {
            Some(mut entry) if entry.session_id == session => {
                if entry.is_connected() {
                    entry.status = ConnectionStatus::Disconnected {
                        since: Instant::now(),
                    };
                }
                Ok(())
            }
            _ => Err(RegistryError::NotRegistered(player)),
        }
    }

    /// Marks a registered player as connected again.
    ///
    /// # Errors
    /// [`RegistryError::NotRegistered`] for an unknown player.
    pub fn mark_connected(&self, player: PlayerId) -> Result<SessionId, RegistryError> {
        let mut entry = self
            .entries
            .get_mut(&player)
            .ok_or(RegistryError::NotRegistered(player))?;
        entry.status = ConnectionStatus::Connected;
        Ok(entry.session_id)
    }

    /// Every player currently bound to `session`, in no particular order.
    pub fn players_in(&self, session: SessionId) -> Vec<PlayerId> {
        self.entries
            .iter()
            .filter(|r| r.session_id == session)
            .map(|r| r.player_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
