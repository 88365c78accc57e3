//! `Orchestrator` builder and the session table.
//!
//! The orchestrator is the single writer of the session table. Session
//! actors report back through one event channel; a background task
//! drains it, occupies arenas when games go Active and reclaims arena
//! and players exactly once when a session enters Cleanup.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ludos_arena::{Arena, ArenaBackend, ArenaPool};
use ludos_game::{
    DisconnectDisposition, GameError, ModuleRegistry, PlayerEvent, SessionEvent, SessionHandle,
    SessionInfo, SessionParams, spawn_session,
};
use ludos_players::PlayerRegistry;
use ludos_types::{ArenaId, GameType, Phase, PlayerId, SessionId};
use tokio::sync::{Mutex, Notify, broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::{LudosError, OrchestratorConfig};

/// A row of the session table.
struct SessionEntry {
    handle: SessionHandle,
    arena: ArenaId,
}

/// State shared between the orchestrator handles and the event loop.
struct Shared<B: ArenaBackend> {
    pool: ArenaPool<B>,
    players: PlayerRegistry,
    /// Keyed by session ID, so iteration is oldest first.
    sessions: Mutex<BTreeMap<SessionId, SessionEntry>>,
    /// Signalled whenever the table becomes empty.
    drained: Notify,
    announcements: broadcast::Sender<SessionEvent>,
}

/// One join gate per game type, fixed when the orchestrator is built.
type JoinGates = HashMap<GameType, Mutex<()>>;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

enum PoolSource<B: ArenaBackend> {
    Ready(ArenaPool<B>),
    Build { backend: B, arenas: Vec<Arena> },
}

/// Builder for an [`Orchestrator`].
///
/// # Example
///
/// ```rust,ignore
/// use ludos::prelude::*;
///
/// let orchestrator = Orchestrator::builder()
///     .config(OrchestratorConfig::default())
///     .modules(registry)
///     .arenas(pool)
///     .build()?;
/// ```
pub struct OrchestratorBuilder<B: ArenaBackend> {
    config: OrchestratorConfig,
    modules: ModuleRegistry,
    pool: Option<PoolSource<B>>,
}

impl<B: ArenaBackend> OrchestratorBuilder<B> {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            modules: ModuleRegistry::default(),
            pool: None,
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the frozen game module registry.
    pub fn modules(mut self, modules: ModuleRegistry) -> Self {
        self.modules = modules;
        self
    }

    /// Uses an already built arena pool.
    pub fn arenas(mut self, pool: ArenaPool<B>) -> Self {
        self.pool = Some(PoolSource::Ready(pool));
        self
    }

    /// Builds the arena pool from `arenas` with the configured reset
    /// policy.
    pub fn backend(mut self, backend: B, arenas: impl IntoIterator<Item = Arena>) -> Self {
        self.pool = Some(PoolSource::Build {
            backend,
            arenas: arenas.into_iter().collect(),
        });
        self
    }

    /// Builds the orchestrator and spawns its event loop.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - [`LudosError::NotConfigured`] without an arena pool
    /// - [`LudosError::Arena`] if two arenas share an ID
    pub fn build(self) -> Result<Orchestrator<B>, LudosError> {
        let config = self.config.validated();
        let pool = match self.pool {
            Some(PoolSource::Ready(pool)) => pool,
            Some(PoolSource::Build { backend, arenas }) => {
                ArenaPool::with_arenas(backend, config.pool.clone(), arenas)?
            }
            None => return Err(LudosError::NotConfigured("an arena pool")),
        };
        if self.modules.is_empty() {
            warn!("orchestrator built without any game module");
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (announcements, _) = broadcast::channel(config.event_buffer);
        let shared = Arc::new(Shared {
            pool,
            players: PlayerRegistry::new(),
            sessions: Mutex::new(BTreeMap::new()),
            drained: Notify::new(),
            announcements,
        });
        tokio::spawn(event_loop(Arc::clone(&shared), events_rx));

        info!(
            arenas = shared.pool.len(),
            game_types = ?self.modules.game_types(),
            "orchestrator started"
        );

        let join_gates: JoinGates = self
            .modules
            .game_types()
            .into_iter()
            .map(|game_type| (game_type, Mutex::new(())))
            .collect();

        Ok(Orchestrator {
            shared,
            join_gates: Arc::new(join_gates),
            modules: self.modules,
            config,
            next_session: Arc::new(AtomicU64::new(1)),
            events: events_tx,
        })
    }
}

impl<B: ArenaBackend> Default for OrchestratorBuilder<B> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Top-level coordinator for minigame sessions.
///
/// Cheap to clone: every clone drives the same sessions.
pub struct Orchestrator<B: ArenaBackend> {
    shared: Arc<Shared<B>>,
    join_gates: Arc<JoinGates>,
    modules: ModuleRegistry,
    config: OrchestratorConfig,
    next_session: Arc<AtomicU64>,
    /// Handed to every session actor.
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<B: ArenaBackend> Clone for Orchestrator<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            join_gates: Arc::clone(&self.join_gates),
            modules: self.modules.clone(),
            config: self.config.clone(),
            next_session: Arc::clone(&self.next_session),
            events: self.events.clone(),
        }
    }
}

impl<B: ArenaBackend> Orchestrator<B> {
    pub fn builder() -> OrchestratorBuilder<B> {
        OrchestratorBuilder::new()
    }

    /// Puts `player` into a session of `game_type`.
    ///
    /// Joinable sessions of that type are tried oldest first. When none
    /// has room, a new session is opened on a fresh arena. Joins are
    /// serialized: concurrent requests never open two sessions where one
    /// would do. Only joins for the same game type wait on each other;
    /// the session table is never locked across a round-trip to a
    /// session actor.
    ///
    /// # Errors
    /// - [`LudosError::UnknownGameType`] if no module is registered for it
    /// - [`LudosError::AlreadyInSession`] if the player is already playing
    /// - [`LudosError::CapacityExceeded`] if every session is full and no
    ///   arena is free
    pub async fn request_join(
        &self,
        player: PlayerId,
        game_type: &GameType,
    ) -> Result<SessionId, LudosError> {
        let module = self.modules.resolve(game_type)?.clone();
        if let Some(current) = self.shared.players.lookup(player) {
            return Err(LudosError::AlreadyInSession(player, current));
        }

        let gate = self
            .join_gates
            .get(game_type)
            .ok_or_else(|| LudosError::UnknownGameType(game_type.clone()))?;
        let _serialized = gate.lock().await;

        let candidates: Vec<SessionHandle> = self
            .shared
            .sessions
            .lock()
            .await
            .values()
            .filter(|entry| entry.handle.game_type() == game_type)
            .map(|entry| entry.handle.clone())
            .collect();
        for handle in candidates {
            let session = handle.session_id();
            self.shared.players.register(player, session)?;
            match handle.join(player).await {
                Ok(count) => {
                    info!(%player, session_id = %session, players = count, "player joined session");
                    return Ok(session);
                }
                Err(
                    GameError::SessionFull(_)
                    | GameError::InvalidPhase { .. }
                    | GameError::Unavailable(_),
                ) => {
                    self.shared.players.unregister_from(player, session);
                }
                Err(e) => {
                    self.shared.players.unregister_from(player, session);
                    return Err(e.into());
                }
            }
        }

        // Nothing has room: open a new session.
        let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        self.shared.players.register(player, session)?;
        let arena = match self.shared.pool.acquire(game_type, session) {
            Ok(arena) => arena,
            Err(e) => {
                self.shared.players.unregister_from(player, session);
                debug!(%player, %game_type, error = %e, "no arena for a new session");
                return Err(e.into());
            }
        };
        let arena_id = arena.id;
        let handle = {
            // Spawned under the table lock, so the event loop cannot see
            // this session's cleanup before its row exists.
            let mut sessions = self.shared.sessions.lock().await;
            let handle = spawn_session(
                SessionParams {
                    id: session,
                    module,
                    arena,
                    config: self.config.phases.clone(),
                },
                self.events.clone(),
            );
            sessions.insert(
                session,
                SessionEntry {
                    handle: handle.clone(),
                    arena: arena_id,
                },
            );
            handle
        };
        info!(session_id = %session, %game_type, arena = %arena_id, "session created");

        if let Err(e) = handle.join(player).await {
            self.shared.players.unregister_from(player, session);
            error!(session_id = %session, %player, error = %e, "first join into new session failed");
            let _ = handle.force_end().await;
            return Err(e.into());
        }
        info!(%player, session_id = %session, players = 1, "player joined session");
        Ok(session)
    }

    /// Puts `player` into one specific session.
    ///
    /// # Errors
    /// - [`LudosError::SessionNotFound`] for an unknown or finished session
    /// - [`LudosError::AlreadyInSession`] if the player is already playing
    /// - [`LudosError::CapacityExceeded`] if the session is full
    /// - [`LudosError::InvalidPhase`] once the game has started
    pub async fn request_join_session(
        &self,
        player: PlayerId,
        session: SessionId,
    ) -> Result<(), LudosError> {
        let handle = self.handle(session).await?;
        self.shared.players.register(player, session)?;
        match handle.join(player).await {
            Ok(count) => {
                info!(%player, session_id = %session, players = count, "player joined session");
                Ok(())
            }
            Err(e) => {
                self.shared.players.unregister_from(player, session);
                Err(match e {
                    GameError::SessionFull(_) => {
                        LudosError::CapacityExceeded(handle.game_type().clone())
                    }
                    other => other.into(),
                })
            }
        }
    }

    /// Takes `player` out of their session for good.
    ///
    /// Returns the session they left.
    pub async fn request_leave(&self, player: PlayerId) -> Result<SessionId, LudosError> {
        let session = self
            .shared
            .players
            .lookup(player)
            .ok_or(LudosError::NotInSession(player))?;

        if let Ok(handle) = self.handle(session).await {
            match handle.leave(player).await {
                Ok(()) | Err(GameError::Unavailable(_)) => {}
                Err(GameError::NotInSession(..)) => {
                    warn!(%player, session_id = %session, "registration without participant, dropping it");
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.shared.players.unregister_from(player, session);
        info!(%player, session_id = %session, "player left session");
        Ok(session)
    }

    /// Starts the countdown of a lobby that does not auto-start.
    pub async fn start(&self, session: SessionId) -> Result<(), LudosError> {
        let handle = self.handle(session).await?;
        handle.start().await?;
        Ok(())
    }

    /// Ends a session from whatever phase it is in. Its arena and
    /// players are reclaimed once it reaches Cleanup.
    pub async fn force_end(&self, session: SessionId) -> Result<(), LudosError> {
        let handle = self.handle(session).await?;
        info!(session_id = %session, "force end");
        handle.force_end().await?;
        Ok(())
    }

    /// Routes a connection loss to the player's session.
    ///
    /// Unknown players are ignored: disconnect notices arrive for
    /// everyone, not only for players in a game.
    pub async fn on_player_disconnect(&self, player: PlayerId) -> Result<(), LudosError> {
        let Some(session) = self.shared.players.lookup(player) else {
            debug!(%player, "disconnect outside any session");
            return Ok(());
        };

        let outcome = match self.handle(session).await {
            Ok(handle) => handle.disconnect(player).await,
            Err(_) => Err(GameError::Unavailable(session)),
        };
        match outcome {
            Ok(DisconnectDisposition::Retained) => {
                if self
                    .shared
                    .players
                    .mark_disconnected_in(player, session)
                    .is_err()
                {
                    debug!(%player, session_id = %session, "session reclaimed during disconnect");
                }
                info!(%player, session_id = %session, "player disconnected, seat kept");
            }
            Ok(DisconnectDisposition::Removed)
            | Err(GameError::Unavailable(_) | GameError::NotInSession(..)) => {
                self.shared.players.unregister_from(player, session);
                info!(%player, session_id = %session, "player disconnected, seat released");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Routes a returning player back into the session they dropped from.
    pub async fn on_player_reconnect(&self, player: PlayerId) -> Result<SessionId, LudosError> {
        let session = self
            .shared
            .players
            .lookup(player)
            .ok_or(LudosError::NotInSession(player))?;
        let handle = self.handle(session).await?;
        handle.reconnect(player).await?;
        self.shared.players.mark_connected(player)?;
        Ok(session)
    }

    /// Forwards a game action to the player's session.
    pub async fn player_event(&self, player: PlayerId, event: PlayerEvent) -> Result<(), LudosError> {
        let session = self
            .shared
            .players
            .lookup(player)
            .ok_or(LudosError::NotInSession(player))?;
        let handle = self.handle(session).await?;
        handle.player_event(player, event).await?;
        Ok(())
    }

    pub async fn session_info(&self, session: SessionId) -> Result<SessionInfo, LudosError> {
        let handle = self.handle(session).await?;
        Ok(handle.info().await?)
    }

    /// Info on every live session, oldest first. Sessions that stop
    /// while being queried are skipped.
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let handles: Vec<SessionHandle> = self
            .shared
            .sessions
            .lock()
            .await
            .values()
            .map(|entry| entry.handle.clone())
            .collect();
        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(info) = handle.info().await {
                infos.push(info);
            }
        }
        infos
    }

    /// The session a player is in, if any.
    pub fn player_session(&self, player: PlayerId) -> Option<SessionId> {
        self.shared.players.lookup(player)
    }

    /// Subscribes to every session's events (phase changes, verdicts,
    /// cleanups), for announcements and bookkeeping.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.announcements.subscribe()
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.shared.players
    }

    pub fn pool(&self) -> &ArenaPool<B> {
        &self.shared.pool
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Force-ends every session and waits until all of them have been
    /// reclaimed.
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = self
            .shared
            .sessions
            .lock()
            .await
            .values()
            .map(|entry| entry.handle.clone())
            .collect();
        info!(sessions = handles.len(), "orchestrator shutting down");
        for handle in &handles {
            let _ = handle.force_end().await;
        }

        loop {
            let drained = self.shared.drained.notified();
            if self.shared.sessions.lock().await.is_empty() {
                break;
            }
            drained.await;
        }
        info!("all sessions reclaimed");
    }

    async fn handle(&self, session: SessionId) -> Result<SessionHandle, LudosError> {
        self.shared
            .sessions
            .lock()
            .await
            .get(&session)
            .map(|entry| entry.handle.clone())
            .ok_or(LudosError::SessionNotFound(session))
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Drains session events until every sender (orchestrator clones and
/// session actors) is gone.
async fn event_loop<B: ArenaBackend>(
    shared: Arc<Shared<B>>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        match &event {
            SessionEvent::PhaseChanged {
                session,
                to: Phase::Active,
                ..
            } => shared.occupy(*session).await,
            SessionEvent::CleanupEntered {
                session,
                arena,
                players,
            } => shared.reclaim(*session, *arena, players).await,
            _ => {}
        }
        // No subscribers is fine.
        let _ = shared.announcements.send(event);
    }
    debug!("orchestrator event loop stopped");
}

impl<B: ArenaBackend> Shared<B> {
    async fn occupy(&self, session: SessionId) {
        let (arena, handle) = {
            let sessions = self.sessions.lock().await;
            match sessions.get(&session) {
                Some(entry) => (entry.arena, entry.handle.clone()),
                None => return,
            }
        };
        if let Err(e) = self.pool.occupy(arena, session) {
            error!(session_id = %session, %arena, error = %e, "arena not held by its session, ending session");
            let _ = handle.force_end().await;
        }
    }

    /// Runs once per session: only the call that removes the table entry
    /// releases the arena.
    async fn reclaim(&self, session: SessionId, arena: ArenaId, players: &[PlayerId]) {
        let (entry, now_empty) = {
            let mut sessions = self.sessions.lock().await;
            let entry = sessions.remove(&session);
            (entry, sessions.is_empty())
        };

        match entry {
            Some(entry) => {
                if entry.arena != arena {
                    error!(session_id = %session, expected = %entry.arena, reported = %arena, "cleanup reported the wrong arena");
                }
                if let Err(e) = self.pool.release(entry.arena) {
                    error!(session_id = %session, arena = %entry.arena, error = %e, "arena release failed");
                }
                let unregistered = self.players.unregister_session(session, players);
                info!(
                    session_id = %session,
                    arena = %entry.arena,
                    players = unregistered,
                    "session reclaimed"
                );
            }
            None => warn!(session_id = %session, "cleanup for unknown session ignored"),
        }

        if now_empty {
            self.drained.notify_waiters();
        }
    }
}
