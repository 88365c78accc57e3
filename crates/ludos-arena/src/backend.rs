//! The reset contract implemented by the world/map collaborator.
//!
//! Ludos never touches world data. After a session releases its arena,
//! the pool asks an [`ArenaBackend`] to restore the map to a playable
//! state: regenerate a block-party floor, reload a rush map from its
//! template, and so on.

use std::future::Future;

use crate::Arena;

/// Restores an arena after a game.
///
/// `reset` must be idempotent: the pool calls it again after a failure,
/// and an operator may trigger it on an arena that is already clean.
///
/// # Example
///
/// ```rust
/// use ludos_arena::{Arena, ArenaBackend};
///
/// struct ReloadTemplate;
///
/// impl ArenaBackend for ReloadTemplate {
///     async fn reset(&self, arena: &Arena) -> Result<(), String> {
///         // Copy the pristine template over `arena.handle`...
///         let _ = &arena.handle;
///         Ok(())
///     }
/// }
/// ```
pub trait ArenaBackend: Send + Sync + 'static {
    /// Resets the arena. `Err` carries a human-readable reason that is
    /// logged and counted as one failed attempt.
    fn reset(&self, arena: &Arena) -> impl Future<Output = Result<(), String>> + Send;
}

/// Backend for arenas that need no reset between games.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

impl ArenaBackend for NoopBackend {
    async fn reset(&self, _arena: &Arena) -> Result<(), String> {
        Ok(())
    }
}
