//! The arena pool: allocation, release, and background resets.
//!
//! # Concurrency note
//!
//! Every session's Lobby creation and Cleanup race on the same free
//! list, so the slots sit behind a `std::sync::Mutex`. The lock is never
//! held across an `.await`: reset attempts run on their own Tokio task
//! and only take the lock to publish a status change.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ludos_types::{ArenaId, GameType, SessionId};
use tracing::{debug, error, info, warn};

use crate::{Arena, ArenaBackend, ArenaError, ArenaStatus, PoolConfig};

struct Slot {
    arena: Arena,
    status: ArenaStatus,
}

struct PoolInner<B> {
    /// Insertion order is allocation order.
    slots: Mutex<Vec<Slot>>,
    backend: B,
    config: PoolConfig,
}

impl<B> PoolInner<B> {
    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        // A panic while holding the lock cannot leave a slot half
        // written: every critical section is a single field assignment.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, id: ArenaId, status: ArenaStatus) {
        if let Some(slot) = self.slots().iter_mut().find(|s| s.arena.id == id) {
            slot.status = status;
        }
    }
}

/// Owns every arena and hands them out one session at a time.
///
/// Cheap to clone: clones share the same slots and backend.
pub struct ArenaPool<B: ArenaBackend> {
    inner: Arc<PoolInner<B>>,
}

impl<B: ArenaBackend> Clone for ArenaPool<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: ArenaBackend> ArenaPool<B> {
    /// Creates an empty pool.
    pub fn new(backend: B, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(Vec::new()),
                backend,
                config: config.validated(),
            }),
        }
    }

    /// Creates a pool pre-filled with `arenas`, all Free.
    ///
    /// # Errors
    /// [`ArenaError::Duplicate`] if two arenas share an ID.
    pub fn with_arenas(
        backend: B,
        config: PoolConfig,
        arenas: impl IntoIterator<Item = Arena>,
    ) -> Result<Self, ArenaError> {
        let pool = Self::new(backend, config);
        for arena in arenas {
            pool.add(arena)?;
        }
        Ok(pool)
    }

    /// Adds a Free arena at the end of the allocation order.
    pub fn add(&self, arena: Arena) -> Result<(), ArenaError> {
        let mut slots = self.inner.slots();
        if slots.iter().any(|s| s.arena.id == arena.id) {
            return Err(ArenaError::Duplicate(arena.id));
        }
        info!(arena_id = %arena.id, handle = %arena.handle, "arena added to pool");
        slots.push(Slot {
            arena,
            status: ArenaStatus::Free,
        });
        Ok(())
    }

    /// Allocates the first Free arena that supports `game_type` and
    /// reserves it for `session`.
    ///
    /// Never waits: an exhausted pool is reported immediately.
    ///
    /// # Errors
    /// [`ArenaError::Exhausted`] if no compatible arena is Free.
    pub fn acquire(
        &self,
        game_type: &GameType,
        session: SessionId,
    ) -> Result<Arena, ArenaError> {
        let mut slots = self.inner.slots();
        let slot = slots
            .iter_mut()
            .find(|s| s.status.is_free() && s.arena.supports(game_type))
            .ok_or_else(|| ArenaError::Exhausted(game_type.clone()))?;

        slot.status = ArenaStatus::Reserved(session);
        debug!(
            arena_id = %slot.arena.id,
            session_id = %session,
            %game_type,
            "arena reserved"
        );
        Ok(slot.arena.clone())
    }

    /// Marks a reserved arena as in use by its session's Active phase.
    ///
    /// # Errors
    /// [`ArenaError::InvalidStatus`] unless the arena is Reserved by
    /// `session` (or already InUse by it, which is a no-op).
    pub fn occupy(&self, id: ArenaId, session: SessionId) -> Result<(), ArenaError> {
        let mut slots = self.inner.slots();
        let slot = find_mut(&mut slots, id)?;
        match slot.status {
            ArenaStatus::Reserved(holder) if holder == session => {
                slot.status = ArenaStatus::InUse(session);
                debug!(arena_id = %id, session_id = %session, "arena in use");
                Ok(())
            }
            ArenaStatus::InUse(holder) if holder == session => Ok(()),
            status => Err(ArenaError::InvalidStatus {
                arena: id,
                status,
                operation: "occupy",
            }),
        }
    }

    /// Returns an allocated arena to the pool.
    ///
    /// The arena becomes DirtyPendingReset and a background task asks the
    /// backend to reset it. The caller does not wait for the reset.
    ///
    /// # Errors
    /// [`ArenaError::NotInUse`] if the arena is not Reserved or InUse.
    /// Nothing changes in that case, so releasing twice is harmless.
    pub fn release(&self, id: ArenaId) -> Result<(), ArenaError> {
        let arena = {
            let mut slots = self.inner.slots();
            let slot = find_mut(&mut slots, id)?;
            let Some(session) = slot.status.holder() else {
                warn!(arena_id = %id, status = %slot.status, "release of arena that is not in use");
                return Err(ArenaError::NotInUse(id));
            };
            slot.status = ArenaStatus::DirtyPendingReset { attempts: 0 };
            info!(arena_id = %id, session_id = %session, "arena released, reset pending");
            slot.arena.clone()
        };
        self.spawn_reset(arena);
        Ok(())
    }

    /// Flags a Free (or retired) arena as needing a reset, e.g. after
    /// the world was edited out-of-band.
    ///
    /// # Errors
    /// [`ArenaError::InvalidStatus`] if the arena is allocated or already
    /// resetting.
    pub fn mark_dirty(&self, id: ArenaId) -> Result<(), ArenaError> {
        self.restart_reset(id, "mark dirty", |status| {
            matches!(status, ArenaStatus::Free | ArenaStatus::Unavailable)
        })
    }

    /// Gives a retired arena another round of reset attempts.
    ///
    /// # Errors
    /// [`ArenaError::InvalidStatus`] unless the arena is Unavailable.
    pub fn retry_reset(&self, id: ArenaId) -> Result<(), ArenaError> {
        self.restart_reset(id, "retry reset", |status| {
            matches!(status, ArenaStatus::Unavailable)
        })
    }

    fn restart_reset(
        &self,
        id: ArenaId,
        operation: &'static str,
        allowed: impl Fn(ArenaStatus) -> bool,
    ) -> Result<(), ArenaError> {
        let arena = {
            let mut slots = self.inner.slots();
            let slot = find_mut(&mut slots, id)?;
            if !allowed(slot.status) {
                return Err(ArenaError::InvalidStatus {
                    arena: id,
                    status: slot.status,
                    operation,
                });
            }
            slot.status = ArenaStatus::DirtyPendingReset { attempts: 0 };
            info!(arena_id = %id, operation, "arena reset scheduled");
            slot.arena.clone()
        };
        self.spawn_reset(arena);
        Ok(())
    }

    fn spawn_reset(&self, arena: Arena) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_reset(inner, arena));
    }

    /// Current status of an arena.
    pub fn status(&self, id: ArenaId) -> Option<ArenaStatus> {
        self.inner
            .slots()
            .iter()
            .find(|s| s.arena.id == id)
            .map(|s| s.status)
    }

    /// Description of an arena.
    pub fn arena(&self, id: ArenaId) -> Option<Arena> {
        self.inner
            .slots()
            .iter()
            .find(|s| s.arena.id == id)
            .map(|s| s.arena.clone())
    }

    /// Every arena with its status, in allocation order.
    pub fn snapshot(&self) -> Vec<(ArenaId, ArenaStatus)> {
        self.inner
            .slots()
            .iter()
            .map(|s| (s.arena.id, s.status))
            .collect()
    }

    /// Number of Free arenas.
    pub fn free_count(&self) -> usize {
        self.inner.slots().iter().filter(|s| s.status.is_free()).count()
    }

    /// Arenas retired after exhausting their reset attempts.
    pub fn retired(&self) -> Vec<ArenaId> {
        self.inner
            .slots()
            .iter()
            .filter(|s| s.status == ArenaStatus::Unavailable)
            .map(|s| s.arena.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots().is_empty()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

fn find_mut(slots: &mut [Slot], id: ArenaId) -> Result<&mut Slot, ArenaError> {
    slots
        .iter_mut()
        .find(|s| s.arena.id == id)
        .ok_or(ArenaError::NotFound(id))
}

/// Calls the backend until the arena is clean or the attempts run out.
async fn run_reset<B: ArenaBackend>(inner: Arc<PoolInner<B>>, arena: Arena) {
    let max = inner.config.max_reset_attempts;

    for attempt in 1..=max {
        match inner.backend.reset(&arena).await {
            Ok(()) => {
                inner.set_status(arena.id, ArenaStatus::Free);
                info!(arena_id = %arena.id, attempt, "arena reset, back in rotation");
                return;
            }
            Err(reason) => {
                let err = ArenaError::ResetFailed {
                    arena: arena.id,
                    reason,
                };
                warn!(attempt, max, error = %err, "arena reset attempt failed");
                inner.set_status(
                    arena.id,
                    ArenaStatus::DirtyPendingReset { attempts: attempt },
                );
                if attempt < max {
                    tokio::time::sleep(inner.config.reset_retry_delay).await;
                }
            }
        }
    }

    inner.set_status(arena.id, ArenaStatus::Unavailable);
    error!(
        arena_id = %arena.id,
        handle = %arena.handle,
        attempts = max,
        "arena reset failed repeatedly, arena is permanently unavailable"
    );
}
