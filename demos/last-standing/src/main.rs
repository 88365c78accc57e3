use std::collections::BTreeSet;
use std::time::Duration;

use ludos::prelude::*;
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ---------------------------------------------------------------------------
// Game types
// ---------------------------------------------------------------------------

const GAME: &str = "last-standing";

/// Ring radius at the start of a round. Shrinks by one per tick.
const RING_START: u32 = 60;

#[derive(Deserialize)]
struct Elimination {
    player: u64,
}

// ---------------------------------------------------------------------------
// Game rules
// ---------------------------------------------------------------------------

struct LastStanding;

struct Rules {
    session: SessionId,
    alive: BTreeSet<PlayerId>,
    ring: u32,
    reporter: Option<VerdictReporter>,
}

impl Rules {
    fn finish(&mut self, verdict: Verdict) {
        if let Some(reporter) = self.reporter.take() {
            reporter.report(verdict);
        }
    }

    fn sole_survivor(&self) -> Option<Verdict> {
        match self.alive.len() {
            1 => Some(Verdict::Winner(self.alive.iter().copied().collect())),
            _ => None,
        }
    }
}

impl RulesHandler for Rules {
    fn on_activate(&mut self, players: &[PlayerId], reporter: VerdictReporter) {
        self.alive = players.iter().copied().collect();
        self.ring = RING_START;
        self.reporter = Some(reporter);
        tracing::info!(session_id = %self.session, alive = self.alive.len(), "fight!");
    }

    fn on_player_event(&mut self, player: PlayerId, event: PlayerEvent) {
        if event.name != "eliminate" {
            return;
        }
        let Ok(hit) = serde_json::from_value::<Elimination>(event.data) else {
            tracing::debug!(%player, "malformed elimination");
            return;
        };
        let target = PlayerId(hit.player);
        if self.alive.remove(&target) {
            tracing::info!(session_id = %self.session, by = %player, eliminated = %target, left = self.alive.len(), "player eliminated");
        }
        if let Some(verdict) = self.sole_survivor() {
            self.finish(verdict);
        }
    }

    fn on_player_disconnect(&mut self, player: PlayerId) -> DisconnectOutcome {
        self.alive.remove(&player);
        match self.sole_survivor() {
            Some(verdict) if self.reporter.is_some() => DisconnectOutcome::Resolve(verdict),
            _ => DisconnectOutcome::Continue,
        }
    }

    fn on_tick(&mut self, _dt: Duration) {
        self.ring = self.ring.saturating_sub(1);
        if self.ring == 0 {
            // Everyone still standing is caught by the ring.
            self.finish(Verdict::Draw);
        }
    }

    fn resolve_early(&mut self) -> Option<Verdict> {
        self.sole_survivor()
    }

    fn on_resolution(&mut self, verdict: &Verdict) {
        tracing::info!(session_id = %self.session, %verdict, "round over");
    }
}

impl GameModule for LastStanding {
    fn describe(&self) -> GameDescriptor {
        GameDescriptor::new(GAME, 2, 8)
            .with_tick_rate(2)
            .with_countdown(Duration::from_secs(3))
    }

    fn create_handler(&self, ctx: &SessionContext) -> Box<dyn RulesHandler> {
        tracing::debug!(session_id = %ctx.session_id, arena = %ctx.arena.handle, "rules created");
        Box::new(Rules {
            session: ctx.session_id,
            alive: BTreeSet::new(),
            ring: RING_START,
            reporter: None,
        })
    }
}

// ---------------------------------------------------------------------------
// World collaborator
// ---------------------------------------------------------------------------

/// Pretends to reload a map from disk.
struct WorldReloader {
    reload_time: Duration,
}

impl ArenaBackend for WorldReloader {
    async fn reset(&self, arena: &Arena) -> Result<(), String> {
        tokio::time::sleep(self.reload_time).await;
        tracing::info!(world = %arena.handle, "world reloaded");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn build() -> Result<Orchestrator<WorldReloader>, LudosError> {
    let mut modules = ModuleRegistry::builder();
    modules.register(LastStanding)?;

    let config = OrchestratorConfig {
        phases: PhaseConfig {
            resolution: Duration::from_secs(2),
            ..PhaseConfig::default()
        },
        ..OrchestratorConfig::default()
    };

    Orchestrator::builder()
        .config(config)
        .modules(modules.build())
        .backend(
            WorldReloader {
                reload_time: Duration::from_millis(200),
            },
            [
                Arena::new(ArenaId(1), "canyon"),
                Arena::new(ArenaId(2), "glacier"),
            ],
        )
        .build()
}

fn eliminate(target: u64) -> PlayerEvent {
    PlayerEvent::new("eliminate").with_data(serde_json::json!({ "player": target }))
}

/// Four players queue, one drops, the rest fight it out.
async fn scripted_match(orchestrator: &Orchestrator<WorldReloader>) -> Result<SessionId, LudosError> {
    let game = GameType::new(GAME);
    let mut session = None;
    for p in 1..=4 {
        session = Some(orchestrator.request_join(PlayerId(p), &game).await?);
    }
    let session = session.ok_or(LudosError::NotConfigured("players"))?;

    tokio::time::sleep(Duration::from_secs(4)).await;
    orchestrator.player_event(PlayerId(1), eliminate(3)).await?;
    orchestrator.on_player_disconnect(PlayerId(4)).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    orchestrator.player_event(PlayerId(1), eliminate(2)).await?;
    Ok(session)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    let orchestrator = build()?;
    let mut announcements = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = announcements.recv().await {
            if let SessionEvent::Resolved { session, verdict } = event {
                tracing::info!(session_id = %session, %verdict, "announcement");
            }
        }
    });

    let session = scripted_match(&orchestrator).await?;
    tokio::time::sleep(Duration::from_secs(3)).await;
    tracing::info!(
        %session,
        free_arenas = orchestrator.pool().free_count(),
        "match finished"
    );
    orchestrator.shutdown().await;
    Ok(())
}
