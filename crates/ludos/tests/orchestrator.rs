//! Integration tests for the orchestrator: joins, disconnects, verdicts
//! and resource reclamation across whole session lifecycles.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ludos::prelude::*;
use ludos_game::GameError;
use rand::Rng;
use tokio::sync::broadcast;

// =========================================================================
// Mock game: a duel whose verdict the test controls.
// =========================================================================

type Reporters = Arc<Mutex<HashMap<SessionId, VerdictReporter>>>;

#[derive(Clone, Copy)]
enum Mode {
    /// Park the reporter so the test can decide.
    Hold,
    /// First player wins as soon as the game starts.
    Instant,
}

struct Duel {
    tag: &'static str,
    min: usize,
    max: usize,
    mode: Mode,
    reporters: Reporters,
}

struct DuelRules {
    session: SessionId,
    mode: Mode,
    reporters: Reporters,
}

impl RulesHandler for DuelRules {
    fn on_activate(&mut self, players: &[PlayerId], reporter: VerdictReporter) {
        match self.mode {
            Mode::Hold => {
                self.reporters.lock().unwrap().insert(self.session, reporter);
            }
            Mode::Instant => {
                reporter.report(Verdict::Winner(vec![players[0]]));
            }
        }
    }

    fn on_player_disconnect(&mut self, _player: PlayerId) -> DisconnectOutcome {
        DisconnectOutcome::Continue
    }
}

impl GameModule for Duel {
    fn describe(&self) -> GameDescriptor {
        GameDescriptor::new(self.tag, self.min, self.max)
    }

    fn create_handler(&self, ctx: &SessionContext) -> Box<dyn RulesHandler> {
        Box::new(DuelRules {
            session: ctx.session_id,
            mode: self.mode,
            reporters: Arc::clone(&self.reporters),
        })
    }
}

/// A game whose rules handler takes its time over every join.
struct Sluggish;

struct SluggishRules;

impl RulesHandler for SluggishRules {
    fn on_player_join(&mut self, _player: PlayerId) {
        std::thread::sleep(Duration::from_millis(400));
    }

    fn on_activate(&mut self, _players: &[PlayerId], _reporter: VerdictReporter) {}

    fn on_player_disconnect(&mut self, _player: PlayerId) -> DisconnectOutcome {
        DisconnectOutcome::Continue
    }
}

impl GameModule for Sluggish {
    fn describe(&self) -> GameDescriptor {
        GameDescriptor::new("sluggish", 2, 4)
    }

    fn create_handler(&self, _ctx: &SessionContext) -> Box<dyn RulesHandler> {
        Box::new(SluggishRules)
    }
}

/// Fails the first `failures` resets, then succeeds.
#[derive(Clone, Default)]
struct FlakyBackend {
    failures: Arc<AtomicU32>,
}

impl ArenaBackend for FlakyBackend {
    async fn reset(&self, arena: &Arena) -> Result<(), String> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(format!("{} still has players' builds in it", arena.handle));
        }
        Ok(())
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn pid(id: u64) -> PlayerId {
    PlayerId(id)
}

fn duel() -> GameType {
    GameType::new("duel")
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        phases: PhaseConfig {
            lobby_timeout: Duration::from_secs(60),
            countdown: Duration::from_secs(5),
            verdict_ceiling: Duration::from_secs(30),
            resolution: Duration::from_secs(2),
            auto_start: true,
            command_buffer: 16,
        },
        pool: PoolConfig {
            max_reset_attempts: 3,
            reset_retry_delay: Duration::from_millis(10),
        },
        event_buffer: 4096,
    }
}

fn arenas(n: u32) -> Vec<Arena> {
    (1..=n).map(|i| Arena::new(ArenaId(i), format!("map-{i}"))).collect()
}

fn modules(mode: Mode, reporters: &Reporters) -> ModuleRegistry {
    let mut builder = ModuleRegistry::builder();
    builder
        .register(Duel {
            tag: "duel",
            min: 2,
            max: 4,
            mode,
            reporters: Arc::clone(reporters),
        })
        .unwrap();
    builder.build()
}

fn orchestrator(n_arenas: u32, mode: Mode) -> (Orchestrator<NoopBackend>, Reporters) {
    let reporters = Reporters::default();
    let orchestrator = Orchestrator::builder()
        .config(config())
        .modules(modules(mode, &reporters))
        .backend(NoopBackend, arenas(n_arenas))
        .build()
        .unwrap();
    (orchestrator, reporters)
}

async fn sleep_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

/// Lets the event loop and reset tasks catch up.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

// =========================================================================
// Builder
// =========================================================================

#[tokio::test]
async fn test_build_without_pool_fails() {
    let result = Orchestrator::<NoopBackend>::builder()
        .modules(ModuleRegistry::default())
        .build();
    assert!(matches!(result, Err(LudosError::NotConfigured(_))));
}

#[tokio::test]
async fn test_build_with_duplicate_arena_fails() {
    let result = Orchestrator::builder()
        .backend(NoopBackend, vec![Arena::new(ArenaId(1), "a"), Arena::new(ArenaId(1), "b")])
        .build();
    assert!(matches!(result, Err(LudosError::Arena(_))));
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_two_joins_share_session_and_start_countdown() {
    let (orch, _) = orchestrator(2, Mode::Hold);

    let s1 = orch.request_join(pid(1), &duel()).await.unwrap();
    let s2 = orch.request_join(pid(2), &duel()).await.unwrap();

    assert_eq!(s1, s2);
    let info = orch.session_info(s1).await.unwrap();
    assert_eq!(info.phase, Phase::Countdown);
    assert_eq!(info.players, vec![pid(1), pid(2)]);
    assert_eq!(orch.player_session(pid(2)), Some(s1));
    // Only one arena was taken.
    assert_eq!(orch.pool().free_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fifth_join_exceeds_capacity_with_single_arena() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    let session = orch.request_join(pid(1), &duel()).await.unwrap();
    orch.request_join(pid(2), &duel()).await.unwrap();

    assert_eq!(orch.request_join(pid(3), &duel()).await.unwrap(), session);
    assert_eq!(orch.request_join(pid(4), &duel()).await.unwrap(), session);
    assert_eq!(
        orch.request_join(pid(5), &duel()).await.unwrap_err(),
        LudosError::CapacityExceeded(duel())
    );
    // The rejected player holds no registration.
    assert_eq!(orch.player_session(pid(5)), None);
    assert_eq!(orch.registry().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_full_session_spills_into_new_one() {
    let (orch, _) = orchestrator(2, Mode::Hold);
    let first = orch.request_join(pid(1), &duel()).await.unwrap();
    for p in 2..=4 {
        orch.request_join(pid(p), &duel()).await.unwrap();
    }

    let second = orch.request_join(pid(5), &duel()).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(orch.sessions().await.len(), 2);
    assert_eq!(orch.pool().free_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_join_rejected_when_already_in_session() {
    let (orch, _) = orchestrator(2, Mode::Hold);
    let session = orch.request_join(pid(1), &duel()).await.unwrap();

    assert_eq!(
        orch.request_join(pid(1), &duel()).await.unwrap_err(),
        LudosError::AlreadyInSession(pid(1), session)
    );
    assert_eq!(
        orch.request_join_session(pid(1), session).await.unwrap_err(),
        LudosError::AlreadyInSession(pid(1), session)
    );
}

#[tokio::test(start_paused = true)]
async fn test_join_unknown_game_type() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    assert_eq!(
        orch.request_join(pid(1), &GameType::new("spleef")).await.unwrap_err(),
        LudosError::UnknownGameType(GameType::new("spleef"))
    );
    assert!(orch.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_join_specific_session() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    let session = orch.request_join(pid(1), &duel()).await.unwrap();

    orch.request_join_session(pid(2), session).await.unwrap();

    assert_eq!(orch.player_session(pid(2)), Some(session));
    assert_eq!(
        orch.request_join_session(pid(3), SessionId(99)).await.unwrap_err(),
        LudosError::SessionNotFound(SessionId(99))
    );
}

#[tokio::test(start_paused = true)]
async fn test_join_specific_session_after_start_rejected() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    let session = orch.request_join(pid(1), &duel()).await.unwrap();
    orch.request_join(pid(2), &duel()).await.unwrap();
    sleep_secs(6).await;

    let err = orch.request_join_session(pid(3), session).await.unwrap_err();

    assert!(matches!(err, LudosError::InvalidPhase { phase: Phase::Active, .. }));
    assert_eq!(orch.player_session(pid(3)), None);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_joins_are_serialized() {
    let (orch, _) = orchestrator(4, Mode::Hold);

    let mut tasks = Vec::new();
    for p in 1..=4 {
        let orch = orch.clone();
        tasks.push(tokio::spawn(async move { orch.request_join(pid(p), &duel()).await }));
    }
    let mut sessions = HashSet::new();
    for t in tasks {
        sessions.insert(t.await.unwrap().unwrap());
    }

    // Four joins fit in a single session of max 4.
    assert_eq!(sessions.len(), 1);
    assert_eq!(orch.pool().free_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_does_not_wait_on_other_game_type() {
    let reporters = Reporters::default();
    let mut builder = ModuleRegistry::builder();
    builder
        .register(Sluggish)
        .unwrap()
        .register(Duel {
            tag: "duel",
            min: 2,
            max: 4,
            mode: Mode::Hold,
            reporters: Arc::clone(&reporters),
        })
        .unwrap();
    let orch = Orchestrator::builder()
        .config(config())
        .modules(builder.build())
        .backend(NoopBackend, arenas(2))
        .build()
        .unwrap();

    let slow = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.request_join(pid(1), &GameType::new("sluggish")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A whole duel lobby opens, empties and is reclaimed meanwhile.
    let session = orch.request_join(pid(2), &duel()).await.unwrap();
    orch.request_leave(pid(2)).await.unwrap();
    while orch.session_info(session).await.is_ok() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(!slow.is_finished(), "duel traffic waited on the sluggish join");

    slow.await.unwrap().unwrap();
    assert!(orch.player_session(pid(1)).is_some());
}

// =========================================================================
// Leaving and disconnecting
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_countdown_disconnect_returns_to_lobby() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    let session = orch.request_join(pid(1), &duel()).await.unwrap();
    orch.request_join(pid(2), &duel()).await.unwrap();

    orch.on_player_disconnect(pid(2)).await.unwrap();

    let info = orch.session_info(session).await.unwrap();
    assert_eq!(info.phase, Phase::Lobby);
    assert_eq!(info.players, vec![pid(1)]);
    assert_eq!(orch.player_session(pid(2)), None);

    // The cancelled countdown never fires.
    sleep_secs(10).await;
    assert_eq!(orch.session_info(session).await.unwrap().phase, Phase::Lobby);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_of_unknown_player_is_ignored() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    assert!(orch.on_player_disconnect(pid(42)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_last_leave_from_lobby_reclaims_arena() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    let session = orch.request_join(pid(1), &duel()).await.unwrap();
    assert_eq!(orch.pool().free_count(), 0);

    assert_eq!(orch.request_leave(pid(1)).await.unwrap(), session);
    settle().await;

    assert_eq!(
        orch.session_info(session).await.unwrap_err(),
        LudosError::SessionNotFound(session)
    );
    assert_eq!(orch.pool().free_count(), 1);
    assert!(orch.registry().is_empty());
    assert_eq!(
        orch.request_leave(pid(1)).await.unwrap_err(),
        LudosError::NotInSession(pid(1))
    );
}

#[tokio::test(start_paused = true)]
async fn test_active_disconnect_keeps_seat_until_reconnect() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    let session = orch.request_join(pid(1), &duel()).await.unwrap();
    for p in 2..=3 {
        orch.request_join(pid(p), &duel()).await.unwrap();
    }
    sleep_secs(6).await;

    orch.on_player_disconnect(pid(2)).await.unwrap();

    let registration = orch.registry().get(pid(2)).unwrap();
    assert_eq!(registration.session_id, session);
    assert!(matches!(registration.status, ConnectionStatus::Disconnected { .. }));
    // The seat is kept, so the player cannot queue for something else.
    assert!(matches!(
        orch.request_join(pid(2), &duel()).await,
        Err(LudosError::AlreadyInSession(..))
    ));

    assert_eq!(orch.on_player_reconnect(pid(2)).await.unwrap(), session);
    assert!(orch.registry().get(pid(2)).unwrap().is_connected());
    assert!(orch.session_info(session).await.unwrap().disconnected.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_all_but_one_disconnect_resolves_incomplete() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    let mut events = orch.subscribe();
    let session = orch.request_join(pid(1), &duel()).await.unwrap();
    orch.request_join(pid(2), &duel()).await.unwrap();
    sleep_secs(6).await;

    orch.on_player_disconnect(pid(1)).await.unwrap();
    settle().await;

    assert!(drain(&mut events).contains(&SessionEvent::Resolved {
        session,
        verdict: Verdict::incomplete(IncompleteReason::PlayersLeft),
    }));

    sleep_secs(3).await;
    assert!(orch.registry().is_empty());
    assert_eq!(orch.pool().free_count(), 1);
}

// =========================================================================
// Verdicts and reclamation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_arena_occupied_while_active() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    let session = orch.request_join(pid(1), &duel()).await.unwrap();
    orch.request_join(pid(2), &duel()).await.unwrap();
    assert_eq!(orch.pool().status(ArenaId(1)), Some(ArenaStatus::Reserved(session)));

    sleep_secs(6).await;

    assert_eq!(orch.pool().status(ArenaId(1)), Some(ArenaStatus::InUse(session)));
}

#[tokio::test(start_paused = true)]
async fn test_reported_verdict_runs_to_cleanup() {
    let (orch, _) = orchestrator(1, Mode::Instant);
    let mut events = orch.subscribe();
    let session = orch.request_join(pid(1), &duel()).await.unwrap();
    orch.request_join(pid(2), &duel()).await.unwrap();

    sleep_secs(6).await;
    assert_eq!(
        orch.session_info(session).await.unwrap().verdict,
        Some(Verdict::Winner(vec![pid(1)]))
    );
    sleep_secs(3).await;

    let phases: Vec<(Phase, Phase)> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::PhaseChanged { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            (Phase::Lobby, Phase::Countdown),
            (Phase::Countdown, Phase::Active),
            (Phase::Active, Phase::Resolution),
            (Phase::Resolution, Phase::Cleanup),
        ]
    );
    assert!(orch.sessions().await.is_empty());
    assert_eq!(orch.pool().free_count(), 1);
    assert!(orch.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_silent_module_hits_verdict_ceiling() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    let mut events = orch.subscribe();
    let session = orch.request_join(pid(1), &duel()).await.unwrap();
    orch.request_join(pid(2), &duel()).await.unwrap();
    sleep_secs(6).await;

    // Countdown ended at 5 s, ceiling is 30 s.
    sleep_secs(30).await;

    let info = orch.session_info(session).await.unwrap();
    assert_eq!(info.phase, Phase::Resolution);
    assert_eq!(
        info.verdict,
        Some(Verdict::incomplete(IncompleteReason::VerdictTimeout))
    );

    sleep_secs(3).await;
    let events = drain(&mut events);
    assert!(matches!(
        events.last(),
        Some(SessionEvent::CleanupEntered { session: s, arena: ArenaId(1), .. }) if *s == session
    ));
    assert_eq!(orch.pool().free_count(), 1);
    assert!(orch.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_held_reporter_resolves_session() {
    let (orch, reporters) = orchestrator(1, Mode::Hold);
    let session = orch.request_join(pid(1), &duel()).await.unwrap();
    orch.request_join(pid(2), &duel()).await.unwrap();
    sleep_secs(6).await;

    let reporter = reporters.lock().unwrap().remove(&session).unwrap();
    assert!(reporter.report(Verdict::Draw));
    settle().await;

    assert_eq!(orch.session_info(session).await.unwrap().verdict, Some(Verdict::Draw));
}

#[tokio::test(start_paused = true)]
async fn test_failed_resets_retire_arena() {
    let reporters = Reporters::default();
    let backend = FlakyBackend {
        failures: Arc::new(AtomicU32::new(3)),
    };
    let orch = Orchestrator::builder()
        .config(config())
        .modules(modules(Mode::Instant, &reporters))
        .backend(backend, arenas(1))
        .build()
        .unwrap();
    orch.request_join(pid(1), &duel()).await.unwrap();
    orch.request_join(pid(2), &duel()).await.unwrap();

    // Countdown, instant verdict, resolution, then three failed resets.
    sleep_secs(10).await;

    assert_eq!(orch.pool().retired(), vec![ArenaId(1)]);
    assert!(orch.registry().is_empty());
    for p in 10..13 {
        assert_eq!(
            orch.request_join(pid(p), &duel()).await.unwrap_err(),
            LudosError::CapacityExceeded(duel())
        );
    }
}

// =========================================================================
// Operator commands
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_force_end_active_session() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    let mut events = orch.subscribe();
    let session = orch.request_join(pid(1), &duel()).await.unwrap();
    orch.request_join(pid(2), &duel()).await.unwrap();
    sleep_secs(6).await;

    orch.force_end(session).await.unwrap();
    settle().await;

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::Resolved {
        session,
        verdict: Verdict::incomplete(IncompleteReason::ForcedEnd),
    }));
    assert!(!events.iter().any(|e| matches!(
        e,
        SessionEvent::PhaseChanged { to: Phase::Resolution, .. }
    )));
    assert_eq!(
        orch.force_end(session).await.unwrap_err(),
        LudosError::SessionNotFound(session)
    );
    assert_eq!(orch.pool().free_count(), 1);
    assert!(orch.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_explicit_start() {
    let reporters = Reporters::default();
    let mut config = config();
    config.phases.auto_start = false;
    let orch = Orchestrator::builder()
        .config(config)
        .modules(modules(Mode::Hold, &reporters))
        .backend(NoopBackend, arenas(1))
        .build()
        .unwrap();
    let session = orch.request_join(pid(1), &duel()).await.unwrap();

    assert!(matches!(
        orch.start(session).await.unwrap_err(),
        LudosError::Game(GameError::NotEnoughPlayers { have: 1, need: 2, .. })
    ));

    orch.request_join(pid(2), &duel()).await.unwrap();
    assert_eq!(orch.session_info(session).await.unwrap().phase, Phase::Lobby);

    orch.start(session).await.unwrap();
    assert_eq!(orch.session_info(session).await.unwrap().phase, Phase::Countdown);
}

#[tokio::test(start_paused = true)]
async fn test_player_event_requires_session() {
    let (orch, _) = orchestrator(1, Mode::Hold);
    assert_eq!(
        orch.player_event(pid(1), PlayerEvent::new("jump")).await.unwrap_err(),
        LudosError::NotInSession(pid(1))
    );
    orch.request_join(pid(1), &duel()).await.unwrap();
    assert!(orch.player_event(pid(1), PlayerEvent::new("jump")).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_reclaims_everything() {
    let (orch, _) = orchestrator(3, Mode::Hold);
    for p in 1..=10 {
        orch.request_join(pid(p), &duel()).await.unwrap();
    }
    sleep_secs(6).await;
    assert_eq!(orch.sessions().await.len(), 3);

    orch.shutdown().await;
    settle().await;

    assert!(orch.sessions().await.is_empty());
    assert!(orch.registry().is_empty());
    assert_eq!(orch.pool().free_count(), 3);
}

// =========================================================================
// Invariants under randomized concurrent traffic
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_randomized_traffic_keeps_invariants() {
    let reporters = Reporters::default();
    let mut builder = ModuleRegistry::builder();
    builder
        .register(Duel {
            tag: "duel",
            min: 2,
            max: 4,
            mode: Mode::Hold,
            reporters: Arc::clone(&reporters),
        })
        .unwrap()
        .register(Duel {
            tag: "brawl",
            min: 3,
            max: 6,
            mode: Mode::Instant,
            reporters: Arc::clone(&reporters),
        })
        .unwrap();
    let orch = Orchestrator::builder()
        .config(config())
        .modules(builder.build())
        .backend(NoopBackend, arenas(3))
        .build()
        .unwrap();
    let mut events = orch.subscribe();

    let mut tasks = Vec::new();
    for worker in 0..6u64 {
        let orch = orch.clone();
        tasks.push(tokio::spawn(async move {
            for step in 0..60u64 {
                let player = pid(worker * 3 + step % 3);
                let roll = rand::rng().random_range(0..100);
                match roll {
                    0..40 => {
                        let game = if roll % 2 == 0 { "duel" } else { "brawl" };
                        let _ = orch.request_join(player, &GameType::new(game)).await;
                    }
                    40..55 => {
                        let _ = orch.request_leave(player).await;
                    }
                    55..70 => {
                        let _ = orch.on_player_disconnect(player).await;
                    }
                    70..75 => {
                        let _ = orch.on_player_reconnect(player).await;
                    }
                    75..80 => {
                        if let Some(session) = orch.player_session(player) {
                            let _ = orch.force_end(session).await;
                        }
                    }
                    _ => {
                        let millis = rand::rng().random_range(100..3_000);
                        tokio::time::sleep(Duration::from_millis(millis)).await;
                    }
                }
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    settle().await;

    // Quiescent: every registration points at a live session that lists
    // the player, and every held arena belongs to exactly one session.
    let infos = orch.sessions().await;
    let mut seen_players = HashSet::new();
    let mut seen_arenas = HashSet::new();
    for info in &infos {
        assert!(seen_arenas.insert(info.arena), "arena {} shared", info.arena);
        assert_eq!(
            orch.pool().status(info.arena).and_then(|s| s.holder()),
            Some(info.session_id)
        );
        for p in &info.players {
            assert!(seen_players.insert(*p), "player {p} in two sessions");
            assert_eq!(orch.player_session(*p), Some(info.session_id));
        }
    }
    assert_eq!(orch.registry().len(), seen_players.len());

    orch.shutdown().await;
    settle().await;
    assert!(orch.registry().is_empty());
    assert_eq!(orch.pool().free_count(), 3);

    // Every session walked a legal path from Lobby to Cleanup.
    let mut last_phase: HashMap<SessionId, Phase> = HashMap::new();
    for event in drain(&mut events) {
        if let SessionEvent::PhaseChanged { session, from, to, .. } = event {
            let previous = last_phase.get(&session).copied().unwrap_or(Phase::Lobby);
            assert_eq!(previous, from, "session {session} skipped a phase");
            assert!(from.can_transition_to(to), "illegal {from} -> {to}");
            last_phase.insert(session, to);
        }
    }
    assert!(!last_phase.is_empty());
    assert!(last_phase.values().all(|p| *p == Phase::Cleanup));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_traffic_never_shares_an_arena() {
    let reporters = Reporters::default();
    let mut builder = ModuleRegistry::builder();
    builder
        .register(Duel {
            tag: "duel",
            min: 2,
            max: 3,
            mode: Mode::Instant,
            reporters: Arc::clone(&reporters),
        })
        .unwrap()
        .register(Duel {
            tag: "brawl",
            min: 2,
            max: 4,
            mode: Mode::Hold,
            reporters: Arc::clone(&reporters),
        })
        .unwrap();
    let config = OrchestratorConfig {
        phases: PhaseConfig {
            lobby_timeout: Duration::from_millis(400),
            countdown: Duration::from_millis(20),
            verdict_ceiling: Duration::from_millis(150),
            resolution: Duration::from_millis(20),
            auto_start: true,
            command_buffer: 16,
        },
        pool: PoolConfig {
            max_reset_attempts: 3,
            reset_retry_delay: Duration::from_millis(1),
        },
        event_buffer: 16,
    };
    let orch = Orchestrator::builder()
        .config(config)
        .modules(builder.build())
        .backend(NoopBackend, arenas(3))
        .build()
        .unwrap();

    let players = 24u64;
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let sampler = {
        let orch = orch.clone();
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            let mut samples = 0u32;
            while !stop.load(Ordering::SeqCst) {
                let mut holders = HashSet::new();
                for (arena, status) in orch.pool().snapshot() {
                    if let Some(session) = status.holder() {
                        assert!(holders.insert(session), "session {session} holds a second arena {arena}");
                    }
                }
                assert!(orch.registry().len() <= players as usize);
                samples += 1;
                tokio::task::yield_now().await;
            }
            samples
        })
    };

    let mut tasks = Vec::new();
    for worker in 0..8u64 {
        let orch = orch.clone();
        tasks.push(tokio::spawn(async move {
            for step in 0..250u64 {
                let player = pid(worker * 3 + step % 3);
                let roll = rand::rng().random_range(0..100);
                match roll {
                    0..45 => {
                        let game = if roll % 2 == 0 { "duel" } else { "brawl" };
                        let _ = orch.request_join(player, &GameType::new(game)).await;
                    }
                    45..60 => {
                        let _ = orch.request_leave(player).await;
                    }
                    60..75 => {
                        let _ = orch.on_player_disconnect(player).await;
                    }
                    75..80 => {
                        let _ = orch.on_player_reconnect(player).await;
                    }
                    80..83 => {
                        if let Some(session) = orch.player_session(player) {
                            let _ = orch.force_end(session).await;
                        }
                    }
                    _ => {
                        let millis = rand::rng().random_range(0..5);
                        tokio::time::sleep(Duration::from_millis(millis)).await;
                    }
                }
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    assert!(sampler.await.unwrap() > 0);

    // The event loop survived the traffic: everything is reclaimed.
    tokio::time::timeout(Duration::from_secs(5), orch.shutdown())
        .await
        .expect("shutdown drained every session");
    tokio::time::timeout(Duration::from_secs(5), async {
        while orch.pool().free_count() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("every arena reset and freed");
    assert!(orch.registry().is_empty());
}
