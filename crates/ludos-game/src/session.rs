//! Session actor: one isolated Tokio task per running minigame.
//!
//! The actor owns the session's phase, its participants, its phase
//! timer and the rules handler. Everything that changes a session goes
//! through its command channel, so transitions for one session are
//! strictly sequential while sessions never wait on each other.
//!
//! The actor reports back through [`SessionEvent`]s. It never touches
//! the arena pool or the player registry itself: the orchestrator does
//! that when it sees the events.

use std::collections::HashSet;
use std::time::Duration;

use ludos_arena::Arena;
use ludos_tick::{PhaseTimer, TickScheduler, TimerToken};
use ludos_types::{ArenaId, GameType, IncompleteReason, Phase, PlayerId, SessionId, Verdict};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::module::VerdictReport;
use crate::{
    DisconnectOutcome, GameDescriptor, GameError, PhaseConfig, PlayerEvent, RegisteredModule,
    RulesHandler, SessionContext, VerdictReporter,
};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What happened to a participant after a disconnect notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectDisposition {
    /// No longer a participant. Its registration can be dropped.
    Removed,
    /// Still a participant (the game is running) but marked disconnected
    /// until it reconnects or the session ends.
    Retained,
}

/// Notifications from a session actor to whoever spawned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PhaseChanged {
        session: SessionId,
        game_type: GameType,
        from: Phase,
        to: Phase,
    },
    /// The Active phase ended with this verdict.
    Resolved {
        session: SessionId,
        verdict: Verdict,
    },
    /// The session reached Cleanup. Sent exactly once, last.
    CleanupEntered {
        session: SessionId,
        arena: ArenaId,
        players: Vec<PlayerId>,
    },
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            Self::PhaseChanged { session, .. }
            | Self::Resolved { session, .. }
            | Self::CleanupEntered { session, .. } => *session,
        }
    }
}

/// A snapshot of session metadata.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub game_type: GameType,
    pub phase: Phase,
    /// Participants in join order, disconnected ones included.
    pub players: Vec<PlayerId>,
    /// Participants currently marked disconnected.
    pub disconnected: Vec<PlayerId>,
    pub min_players: usize,
    pub max_players: usize,
    pub arena: ArenaId,
    /// Time left before the current phase times out, if it has a deadline.
    pub deadline_in: Option<Duration>,
    /// Set once the Active phase has resolved.
    pub verdict: Option<Verdict>,
    /// Ticks delivered to the rules handler so far.
    pub ticks: u64,
}

impl SessionInfo {
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Joinable and below capacity.
    pub fn has_room(&self) -> bool {
        self.phase.is_joinable() && self.players.len() < self.max_players
    }
}

/// Everything needed to spawn a session actor.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub id: SessionId,
    pub module: RegisteredModule,
    /// The arena reserved for this session.
    pub arena: Arena,
    pub config: PhaseConfig,
}

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

/// Commands sent to a session actor through its channel.
enum SessionCommand {
    Join {
        player: PlayerId,
        reply: oneshot::Sender<Result<usize, GameError>>,
    },
    Leave {
        player: PlayerId,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    Disconnect {
        player: PlayerId,
        reply: oneshot::Sender<Result<DisconnectDisposition, GameError>>,
    },
    Reconnect {
        player: PlayerId,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    Start {
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    Event {
        player: PlayerId,
        event: PlayerEvent,
    },
    ForceEnd,
    Info {
        reply: oneshot::Sender<SessionInfo>,
    },
}

/// Handle to a running session actor.
///
/// Cheap to clone. Every method fails with [`GameError::Unavailable`]
/// once the actor has reached Cleanup and stopped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    game_type: GameType,
    sender: mpsc::Sender<SessionCommand>,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Join { .. } => "Join",
            Self::Leave { .. } => "Leave",
            Self::Disconnect { .. } => "Disconnect",
            Self::Reconnect { .. } => "Reconnect",
            Self::Start { .. } => "Start",
            Self::Event { .. } => "Event",
            Self::ForceEnd => "ForceEnd",
            Self::Info { .. } => "Info",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn game_type(&self) -> &GameType {
        &self.game_type
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Adds a participant. Returns the new participant count.
    pub async fn join(&self, player: PlayerId) -> Result<usize, GameError> {
        self.request(|reply| SessionCommand::Join { player, reply })
            .await?
    }

    /// Removes a participant for good.
    pub async fn leave(&self, player: PlayerId) -> Result<(), GameError> {
        self.request(|reply| SessionCommand::Leave { player, reply })
            .await?
    }

    /// Reports that a participant lost its connection.
    pub async fn disconnect(&self, player: PlayerId) -> Result<DisconnectDisposition, GameError> {
        self.request(|reply| SessionCommand::Disconnect { player, reply })
            .await?
    }

    /// Reports that a disconnected participant is back.
    pub async fn reconnect(&self, player: PlayerId) -> Result<(), GameError> {
        self.request(|reply| SessionCommand::Reconnect { player, reply })
            .await?
    }

    /// Starts the countdown without waiting for auto-start.
    pub async fn start(&self) -> Result<(), GameError> {
        self.request(|reply| SessionCommand::Start { reply }).await?
    }

    /// Forwards a game action to the rules handler (fire-and-forget).
    pub async fn player_event(&self, player: PlayerId, event: PlayerEvent) -> Result<(), GameError> {
        self.sender
            .send(SessionCommand::Event { player, event })
            .await
            .map_err(|_| GameError::Unavailable(self.session_id))
    }

    /// Ends the session from whatever phase it is in (fire-and-forget).
    pub async fn force_end(&self) -> Result<(), GameError> {
        self.sender
            .send(SessionCommand::ForceEnd)
            .await
            .map_err(|_| GameError::Unavailable(self.session_id))
    }

    pub async fn info(&self) -> Result<SessionInfo, GameError> {
        self.request(|reply| SessionCommand::Info { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| GameError::Unavailable(self.session_id))?;
        reply_rx
            .await
            .map_err(|_| GameError::Unavailable(self.session_id))
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct SessionActor {
    id: SessionId,
    descriptor: GameDescriptor,
    config: PhaseConfig,
    arena: Arena,
    phase: Phase,
    /// Join order.
    participants: Vec<PlayerId>,
    disconnected: HashSet<PlayerId>,
    /// Dropped on Cleanup.
    handler: Option<Box<dyn RulesHandler>>,
    timer: PhaseTimer,
    ticker: TickScheduler,
    /// Ticks of a finished Active phase; the live count is in `ticker`.
    ticks_done: u64,
    verdict: Option<Verdict>,
    verdict_tx: mpsc::UnboundedSender<VerdictReport>,
    verdict_rx: mpsc::UnboundedReceiver<VerdictReport>,
    commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionActor {
    async fn run(mut self) {
        info!(
            session_id = %self.id,
            game_type = %self.descriptor.game_type,
            arena = %self.arena.id,
            "session actor started"
        );
        self.timer.arm(self.config.lobby_timeout);

        while !self.phase.is_terminal() {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        warn!(session_id = %self.id, "all session handles dropped, aborting");
                        self.transition(Phase::Cleanup);
                    }
                },
                Some(report) = self.verdict_rx.recv() => self.handle_verdict(report),
                token = self.timer.expired() => self.handle_timeout(token),
                tick = self.ticker.wait_for_tick() => {
                    if let Some(handler) = self.handler.as_mut() {
                        handler.on_tick(tick.dt);
                    }
                    self.ticker.record_tick_end();
                }
            }
        }

        info!(session_id = %self.id, "session actor stopped");
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Join { player, reply } => {
                let _ = reply.send(self.handle_join(player));
            }
            SessionCommand::Leave { player, reply } => {
                let result = self.remove_participant(player, false).map(|_| ());
                let _ = reply.send(result);
            }
            SessionCommand::Disconnect { player, reply } => {
                let _ = reply.send(self.remove_participant(player, true));
            }
            SessionCommand::Reconnect { player, reply } => {
                let _ = reply.send(self.handle_reconnect(player));
            }
            SessionCommand::Start { reply } => {
                let _ = reply.send(self.handle_start());
            }
            SessionCommand::Event { player, event } => self.handle_player_event(player, event),
            SessionCommand::ForceEnd => self.handle_force_end(),
            SessionCommand::Info { reply } => {
                let _ = reply.send(self.info());
            }
        }
    }

    // -- Commands -------------------------------------------------------

    fn handle_join(&mut self, player: PlayerId) -> Result<usize, GameError> {
        if !self.phase.is_joinable() {
            return Err(self.invalid_phase("join"));
        }
        if self.participants.contains(&player) {
            return Err(GameError::AlreadyJoined(player, self.id));
        }
        if self.participants.len() >= self.descriptor.max_players {
            return Err(GameError::SessionFull(self.id));
        }

        self.participants.push(player);
        if let Some(handler) = self.handler.as_mut() {
            handler.on_player_join(player);
        }
        info!(
            session_id = %self.id,
            %player,
            players = self.participants.len(),
            "player joined"
        );

        if self.phase == Phase::Lobby
            && self.config.auto_start
            && self.participants.len() >= self.descriptor.min_players
        {
            self.transition(Phase::Countdown);
        }
        Ok(self.participants.len())
    }

    /// Shared by leave (`retain = false`) and disconnect (`retain = true`).
    /// Only a disconnect during Active keeps the player as a participant.
    fn remove_participant(
        &mut self,
        player: PlayerId,
        retain: bool,
    ) -> Result<DisconnectDisposition, GameError> {
        let Some(pos) = self.participants.iter().position(|p| *p == player) else {
            return Err(GameError::NotInSession(player, self.id));
        };

        match self.phase {
            Phase::Lobby => {
                self.participants.remove(pos);
                self.notify_departure(player);
                info!(session_id = %self.id, %player, players = self.participants.len(), "player left lobby");
                if self.participants.is_empty() {
                    info!(session_id = %self.id, "lobby emptied, aborting");
                    self.transition(Phase::Cleanup);
                }
                Ok(DisconnectDisposition::Removed)
            }
            Phase::Countdown => {
                self.participants.remove(pos);
                self.notify_departure(player);
                info!(session_id = %self.id, %player, players = self.participants.len(), "player left during countdown");
                if self.participants.len() < self.descriptor.min_players {
                    self.transition(Phase::Lobby);
                    if self.participants.is_empty() {
                        self.transition(Phase::Cleanup);
                    }
                }
                Ok(DisconnectDisposition::Removed)
            }
            Phase::Active => {
                let was_connected = !self.disconnected.contains(&player);
                let disposition = if retain {
                    self.disconnected.insert(player);
                    DisconnectDisposition::Retained
                } else {
                    self.participants.remove(pos);
                    self.disconnected.remove(&player);
                    DisconnectDisposition::Removed
                };
                if was_connected {
                    info!(
                        session_id = %self.id,
                        %player,
                        connected = self.connected().len(),
                        ?disposition,
                        "player dropped out of active game"
                    );
                    self.after_active_dropout(player);
                }
                Ok(disposition)
            }
            Phase::Resolution => {
                self.participants.remove(pos);
                self.disconnected.remove(&player);
                Ok(DisconnectDisposition::Removed)
            }
            Phase::Cleanup => Err(self.invalid_phase("leave")),
        }
    }

    /// Tells the handler a player left before the game ran. The outcome
    /// only matters once the game runs.
    fn notify_departure(&mut self, player: PlayerId) {
        if let Some(handler) = self.handler.as_mut() {
            let _ = handler.on_player_disconnect(player);
        }
    }

    fn after_active_dropout(&mut self, player: PlayerId) {
        let Some(handler) = self.handler.as_mut() else {
            return;
        };
        match handler.on_player_disconnect(player) {
            DisconnectOutcome::Resolve(verdict) => self.resolve(verdict),
            DisconnectOutcome::Continue if self.connected().len() <= 1 => {
                let verdict = self
                    .handler
                    .as_mut()
                    .and_then(|h| h.resolve_early())
                    .unwrap_or_else(|| Verdict::incomplete(IncompleteReason::PlayersLeft));
                debug!(session_id = %self.id, %verdict, "resolving early");
                self.resolve(verdict);
            }
            DisconnectOutcome::Continue => {}
        }
    }

    fn handle_reconnect(&mut self, player: PlayerId) -> Result<(), GameError> {
        if !self.participants.contains(&player) {
            return Err(GameError::NotInSession(player, self.id));
        }
        if self.disconnected.remove(&player) {
            info!(session_id = %self.id, %player, phase = %self.phase, "player reconnected");
            if self.phase == Phase::Active {
                if let Some(handler) = self.handler.as_mut() {
                    handler.on_player_reconnect(player);
                }
            }
        }
        Ok(())
    }

    fn handle_start(&mut self) -> Result<(), GameError> {
        if self.phase != Phase::Lobby {
            return Err(self.invalid_phase("start"));
        }
        if self.participants.len() < self.descriptor.min_players {
            return Err(GameError::NotEnoughPlayers {
                session: self.id,
                have: self.participants.len(),
                need: self.descriptor.min_players,
            });
        }
        self.transition(Phase::Countdown);
        Ok(())
    }

    fn handle_player_event(&mut self, player: PlayerId, event: PlayerEvent) {
        if self.phase != Phase::Active
            || !self.participants.contains(&player)
            || self.disconnected.contains(&player)
        {
            debug!(
                session_id = %self.id,
                %player,
                event = %event.name,
                phase = %self.phase,
                "player event ignored"
            );
            return;
        }
        if let Some(handler) = self.handler.as_mut() {
            handler.on_player_event(player, event);
        }
    }

    fn handle_force_end(&mut self) {
        info!(session_id = %self.id, phase = %self.phase, "force end requested");
        if self.phase == Phase::Active {
            self.announce_verdict(Verdict::incomplete(IncompleteReason::ForcedEnd));
        }
        self.transition(Phase::Cleanup);
    }

    // -- Internal inputs ------------------------------------------------

    fn handle_verdict(&mut self, report: VerdictReport) {
        if self.phase != Phase::Active || !self.timer.is_current(report.token) {
            debug!(
                session_id = %self.id,
                phase = %self.phase,
                verdict = %report.verdict,
                "stale verdict discarded"
            );
            return;
        }
        info!(session_id = %self.id, verdict = %report.verdict, "verdict received");
        self.resolve(report.verdict);
    }

    fn handle_timeout(&mut self, token: TimerToken) {
        if !self.timer.is_current(token) {
            debug!(session_id = %self.id, generation = token.generation(), "stale timer ignored");
            return;
        }
        match self.phase {
            Phase::Lobby => {
                if self.participants.len() < self.descriptor.min_players {
                    info!(
                        session_id = %self.id,
                        players = self.participants.len(),
                        need = self.descriptor.min_players,
                        "lobby timed out, aborting"
                    );
                    self.transition(Phase::Cleanup);
                } else {
                    debug!(session_id = %self.id, "lobby timed out with enough players, waiting for start");
                    self.timer.arm(self.config.lobby_timeout);
                }
            }
            Phase::Countdown => self.transition(Phase::Active),
            Phase::Active => {
                warn!(
                    session_id = %self.id,
                    game_type = %self.descriptor.game_type,
                    "rules handler never reported a verdict"
                );
                self.resolve(Verdict::incomplete(IncompleteReason::VerdictTimeout));
            }
            Phase::Resolution => self.transition(Phase::Cleanup),
            Phase::Cleanup => {}
        }
    }

    // -- Transitions ----------------------------------------------------

    /// Ends the Active phase with `verdict`.
    fn resolve(&mut self, verdict: Verdict) {
        if self.phase != Phase::Active {
            return;
        }
        self.announce_verdict(verdict);
        self.transition(Phase::Resolution);
    }

    fn announce_verdict(&mut self, verdict: Verdict) {
        if let Some(handler) = self.handler.as_mut() {
            handler.on_resolution(&verdict);
        }
        let _ = self.events.send(SessionEvent::Resolved {
            session: self.id,
            verdict: verdict.clone(),
        });
        self.verdict = Some(verdict);
    }

    fn transition(&mut self, target: Phase) {
        let from = self.phase;
        if from.is_terminal() {
            return;
        }
        let to = if from.can_transition_to(target) {
            target
        } else {
            error!(
                session_id = %self.id,
                %from,
                to = %target,
                "invalid phase transition, forcing cleanup"
            );
            Phase::Cleanup
        };

        self.phase = to;
        info!(session_id = %self.id, %from, %to, "phase changed");
        let _ = self.events.send(SessionEvent::PhaseChanged {
            session: self.id,
            game_type: self.descriptor.game_type.clone(),
            from,
            to,
        });

        match to {
            Phase::Lobby => {
                self.timer.arm(self.config.lobby_timeout);
            }
            Phase::Countdown => {
                let countdown = self.descriptor.countdown.unwrap_or(self.config.countdown);
                self.timer.arm(countdown);
            }
            Phase::Active => self.enter_active(),
            Phase::Resolution => {
                self.stop_ticking();
                self.timer.arm(self.config.resolution);
            }
            Phase::Cleanup => self.enter_cleanup(),
        }
    }

    fn enter_active(&mut self) {
        let ceiling = self
            .descriptor
            .verdict_ceiling
            .unwrap_or(self.config.verdict_ceiling);
        let token = self.timer.arm(ceiling);
        self.ticker = TickScheduler::with_rate(self.descriptor.tick_rate_hz);

        let reporter = VerdictReporter::new(self.id, token, self.verdict_tx.clone());
        let players = self.connected();
        if let Some(handler) = self.handler.as_mut() {
            handler.on_activate(&players, reporter);
        }
    }

    fn enter_cleanup(&mut self) {
        self.timer.cancel();
        self.stop_ticking();
        self.handler = None;
        let _ = self.events.send(SessionEvent::CleanupEntered {
            session: self.id,
            arena: self.arena.id,
            players: self.participants.clone(),
        });
    }

    fn stop_ticking(&mut self) {
        let ticker = std::mem::replace(&mut self.ticker, TickScheduler::idle());
        if ticker.is_event_driven() {
            return;
        }
        let metrics = ticker.metrics();
        self.ticks_done += metrics.total_ticks;
        debug!(
            session_id = %self.id,
            ticks = metrics.total_ticks,
            overruns = metrics.total_overruns,
            skipped = metrics.total_skipped,
            max_tick_ms = metrics.max_tick_time.as_secs_f64() * 1000.0,
            "ticking stopped"
        );
    }

    // -- Helpers --------------------------------------------------------

    fn connected(&self) -> Vec<PlayerId> {
        self.participants
            .iter()
            .copied()
            .filter(|p| !self.disconnected.contains(p))
            .collect()
    }

    fn invalid_phase(&self, operation: &'static str) -> GameError {
        GameError::InvalidPhase {
            session: self.id,
            phase: self.phase,
            operation,
        }
    }

    fn info(&self) -> SessionInfo {
        let mut disconnected: Vec<PlayerId> = self.disconnected.iter().copied().collect();
        disconnected.sort();
        SessionInfo {
            session_id: self.id,
            game_type: self.descriptor.game_type.clone(),
            phase: self.phase,
            players: self.participants.clone(),
            disconnected,
            min_players: self.descriptor.min_players,
            max_players: self.descriptor.max_players,
            arena: self.arena.id,
            deadline_in: self.timer.remaining(),
            verdict: self.verdict.clone(),
            ticks: self.ticks_done + self.ticker.tick_count(),
        }
    }
}

/// Spawns a session actor in Lobby and returns a handle to it.
///
/// The rules handler is created here, before the actor starts. `events`
/// receives every [`SessionEvent`] the actor emits; the last one is
/// always [`SessionEvent::CleanupEntered`].
pub fn spawn_session(
    params: SessionParams,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> SessionHandle {
    let SessionParams {
        id,
        module,
        arena,
        config,
    } = params;
    let config = config.validated();
    let (tx, rx) = mpsc::channel(config.command_buffer);
    let (verdict_tx, verdict_rx) = mpsc::unbounded_channel();

    let ctx = SessionContext {
        session_id: id,
        game_type: module.descriptor.game_type.clone(),
        arena: arena.clone(),
    };
    let handler = module.module.create_handler(&ctx);
    let game_type = module.descriptor.game_type.clone();

    let actor = SessionActor {
        id,
        descriptor: module.descriptor,
        config,
        arena,
        phase: Phase::Lobby,
        participants: Vec::new(),
        disconnected: HashSet::new(),
        handler: Some(handler),
        timer: PhaseTimer::new(),
        ticker: TickScheduler::idle(),
        ticks_done: 0,
        verdict: None,
        verdict_tx,
        verdict_rx,
        commands: rx,
        events,
    };

    tokio::spawn(actor.run());

    SessionHandle {
        session_id: id,
        game_type,
        sender: tx,
    }
}
