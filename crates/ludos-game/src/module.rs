//! The game module contract, the extension point for minigames.
//!
//! A minigame (block party, arena, rush...) plugs into Ludos by
//! implementing two traits:
//!
//! - [`GameModule`]: registered once at startup. Describes the game
//!   type and creates one rules handler per session.
//! - [`RulesHandler`]: lives as long as its session. The session actor
//!   calls into it while the game is running and waits for exactly one
//!   [`Verdict`] through the [`VerdictReporter`] it hands over when the
//!   Active phase begins.
//!
//! The core only ever sees `dyn GameModule` / `dyn RulesHandler`. It
//! never interprets game rules: it only learns that the round ended, and
//! how.

use std::time::Duration;

use ludos_arena::Arena;
use ludos_tick::TimerToken;
use ludos_types::{GameType, PlayerId, SessionId, Verdict};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::GameError;

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// What a game module declares about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDescriptor {
    /// Tag players use to ask for this game.
    pub game_type: GameType,

    /// Players needed before the countdown may start.
    pub min_players: usize,

    /// Hard cap on participants.
    pub max_players: usize,

    /// Rate at which [`RulesHandler::on_tick`] is called during Active.
    /// 0 = event-driven, no ticks.
    pub tick_rate_hz: u32,

    /// Overrides [`PhaseConfig::countdown`](crate::PhaseConfig::countdown).
    pub countdown: Option<Duration>,

    /// Overrides [`PhaseConfig::verdict_ceiling`](crate::PhaseConfig::verdict_ceiling).
    pub verdict_ceiling: Option<Duration>,
}

impl GameDescriptor {
    pub fn new(game_type: impl Into<GameType>, min_players: usize, max_players: usize) -> Self {
        Self {
            game_type: game_type.into(),
            min_players,
            max_players,
            tick_rate_hz: 0,
            countdown: None,
            verdict_ceiling: None,
        }
    }

    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    pub fn with_countdown(mut self, countdown: Duration) -> Self {
        self.countdown = Some(countdown);
        self
    }

    pub fn with_verdict_ceiling(mut self, ceiling: Duration) -> Self {
        self.verdict_ceiling = Some(ceiling);
        self
    }

    /// Checks `1 <= min_players <= max_players`.
    pub fn validate(&self) -> Result<(), GameError> {
        let reason = if self.min_players == 0 {
            "min_players must be at least 1"
        } else if self.min_players > self.max_players {
            "min_players exceeds max_players"
        } else if self.game_type.as_str().is_empty() {
            "game type tag is empty"
        } else {
            return Ok(());
        };
        Err(GameError::InvalidDescriptor {
            game_type: self.game_type.clone(),
            reason: reason.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Handler inputs and outputs
// ---------------------------------------------------------------------------

/// Everything a module gets to know about a freshly created session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub game_type: GameType,
    /// The arena the session is bound to. `arena.handle` tells the
    /// module which world to play in.
    pub arena: Arena,
}

/// A game-specific player action, forwarded to the rules handler
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEvent {
    /// Event name as understood by the module (`"moved"`, `"bed_broken"`).
    pub name: String,
    /// Free-form payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PlayerEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// What a rules handler wants after a participant disconnects mid-game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// Keep playing.
    Continue,
    /// End the round now with this verdict.
    Resolve(Verdict),
}

/// A verdict travelling from a reporter back to its session actor.
#[derive(Debug)]
pub(crate) struct VerdictReport {
    pub(crate) token: TimerToken,
    pub(crate) verdict: Verdict,
}

/// Single-shot slot through which a rules handler ends the Active phase.
///
/// Handed to [`RulesHandler::on_activate`]. [`report`](Self::report)
/// consumes the reporter, so a handler cannot report twice. The reporter
/// is `Send` and may be moved into a spawned task. A report that arrives
/// after the session already left Active (verdict ceiling, force end) is
/// discarded by the actor.
#[derive(Debug)]
pub struct VerdictReporter {
    session_id: SessionId,
    token: TimerToken,
    tx: mpsc::UnboundedSender<VerdictReport>,
}

impl VerdictReporter {
    pub(crate) fn new(
        session_id: SessionId,
        token: TimerToken,
        tx: mpsc::UnboundedSender<VerdictReport>,
    ) -> Self {
        Self {
            session_id,
            token,
            tx,
        }
    }

    /// The session this reporter belongs to.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Reports the round's verdict. Returns `false` if the session is
    /// already gone.
    pub fn report(self, verdict: Verdict) -> bool {
        tracing::debug!(session_id = %self.session_id, %verdict, "verdict reported");
        self.tx
            .send(VerdictReport {
                token: self.token,
                verdict,
            })
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Per-session game rules, created by [`GameModule::create_handler`].
///
/// All methods run on the session actor's task, one at a time, so a
/// handler needs no internal locking. They must not block: long work
/// belongs on a spawned task that later calls the reporter.
///
/// # Contract
///
/// After `on_activate`, the handler must eventually call
/// [`VerdictReporter::report`] exactly once. If it doesn't within the
/// verdict ceiling, the session is resolved as incomplete.
pub trait RulesHandler: Send + 'static {
    /// A player joined the session (Lobby or Countdown).
    fn on_player_join(&mut self, _player: PlayerId) {}

    /// The Active phase begins with these connected `players`.
    fn on_activate(&mut self, players: &[PlayerId], reporter: VerdictReporter);

    /// A game action from a connected participant during Active.
    fn on_player_event(&mut self, _player: PlayerId, _event: PlayerEvent) {}

    /// A participant disconnected or left, in any phase before Resolution.
    ///
    /// Only the outcome returned during Active is acted on.
    fn on_player_disconnect(&mut self, player: PlayerId) -> DisconnectOutcome;

    /// A disconnected participant came back during Active.
    fn on_player_reconnect(&mut self, _player: PlayerId) {}

    /// Called at the descriptor's tick rate during Active.
    fn on_tick(&mut self, _dt: Duration) {}

    /// At most one connected participant is left. Return a verdict to
    /// end the round cleanly, or `None` to let the core declare it
    /// incomplete.
    fn resolve_early(&mut self) -> Option<Verdict> {
        None
    }

    /// The round is over. Announcements and stats go here.
    fn on_resolution(&mut self, _verdict: &Verdict) {}
}

/// A minigame, registered once at startup.
///
/// # Example
///
/// ```rust
/// use ludos_game::{
///     DisconnectOutcome, GameDescriptor, GameModule, RulesHandler,
///     SessionContext, VerdictReporter,
/// };
/// use ludos_types::{PlayerId, Verdict};
///
/// struct CoinFlip;
///
/// struct CoinFlipRules;
///
/// impl RulesHandler for CoinFlipRules {
///     fn on_activate(&mut self, players: &[PlayerId], reporter: VerdictReporter) {
///         reporter.report(Verdict::Winner(vec![players[0]]));
///     }
///
///     fn on_player_disconnect(&mut self, _player: PlayerId) -> DisconnectOutcome {
///         DisconnectOutcome::Continue
///     }
/// }
///
/// impl GameModule for CoinFlip {
///     fn describe(&self) -> GameDescriptor {
///         GameDescriptor::new("coinflip", 2, 2)
///     }
///
///     fn create_handler(&self, _ctx: &SessionContext) -> Box<dyn RulesHandler> {
///         Box::new(CoinFlipRules)
///     }
/// }
/// ```
pub trait GameModule: Send + Sync + 'static {
    /// Static facts about the game. Read once at registration.
    fn describe(&self) -> GameDescriptor;

    /// Creates the rules handler for a new session.
    fn create_handler(&self, ctx: &SessionContext) -> Box<dyn RulesHandler>;
}
