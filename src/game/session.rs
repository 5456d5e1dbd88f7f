//! Per-match session worker and its fixed-tick loop

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, GameConfig};
use crate::protocol::{RosterEntry, WorkerCommand, WorkerEvent};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::Timer;

use super::scoring::assign_scores;
use super::snapshot::SnapshotBuilder;
use super::state::{MatchState, TickOutcome};
use super::{PlayerId, RoomId};

const COMMAND_QUEUE: usize = 256;
const EVENT_QUEUE: usize = 64;

/// Why a worker task returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Stop requested, every handle dropped, or the event consumer went away
    Stopped,
    /// Match finished, the result was delivered and the worker was then stopped
    Finished,
    /// A tick failed; `WorkerFailed` was emitted
    Faulted,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a match needs at least 2 players, got {found}")]
    RosterTooSmall { found: usize },

    #[error("player {0} appears twice in the roster")]
    DuplicatePlayer(PlayerId),

    #[error("match worker is not running")]
    ChannelClosed,

    #[error("match worker command queue is full")]
    QueueFull,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Handle for talking to a running match worker
#[derive(Clone)]
pub struct SessionHandle {
    pub room_id: RoomId,
    command_tx: mpsc::Sender<WorkerCommand>,
    running: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Queue a relative paddle move
    pub fn move_relative(&self, player_id: PlayerId, delta: f64) -> Result<(), SessionError> {
        self.send(WorkerCommand::PlayerMoveRelative { player_id, delta })
    }

    /// Forward a command without waiting
    pub fn send(&self, command: WorkerCommand) -> Result<(), SessionError> {
        self.command_tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::QueueFull,
            TrySendError::Closed(_) => SessionError::ChannelClosed,
        })
    }

    /// Ask the worker to exit after any in-flight tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.command_tx.try_send(WorkerCommand::Stop);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.command_tx.is_closed()
    }
}

/// Validate the roster and start a worker task for the match
pub fn spawn(
    room_id: RoomId,
    roster: Vec<RosterEntry>,
    fee: u64,
    config: GameConfig,
) -> Result<
    (
        SessionHandle,
        mpsc::Receiver<WorkerEvent>,
        JoinHandle<WorkerExit>,
    ),
    SessionError,
> {
    config.validate()?;

    if roster.len() < 2 {
        return Err(SessionError::RosterTooSmall {
            found: roster.len(),
        });
    }

    let mut seen = HashSet::with_capacity(roster.len());
    if let Some(dup) = roster.iter().find(|entry| !seen.insert(entry.id)) {
        return Err(SessionError::DuplicatePlayer(dup.id));
    }

    let state = MatchState::new(room_id, &roster, config);
    let (worker, handle, events) = SessionWorker::new(state, fee);
    let join = tokio::spawn(worker.run());

    Ok((handle, events, join))
}

/// The authoritative match loop
pub struct SessionWorker {
    state: MatchState,
    fee: u64,
    command_rx: mpsc::Receiver<WorkerCommand>,
    event_tx: mpsc::Sender<WorkerEvent>,
    running: Arc<AtomicBool>,
    limiter: PlayerRateLimiter,
    /// Accepted deltas waiting for the next tick
    pending: Vec<(PlayerId, f64)>,
    snapshots: SnapshotBuilder,
    /// Result delivered; waiting for the stop command
    finished: bool,
}

impl SessionWorker {
    fn new(state: MatchState, fee: u64) -> (Self, SessionHandle, mpsc::Receiver<WorkerEvent>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let running = Arc::new(AtomicBool::new(true));

        let handle = SessionHandle {
            room_id: state.room_id,
            command_tx,
            running: running.clone(),
        };

        let limiter =
            PlayerRateLimiter::new(Duration::from_millis(state.config().input_rate_limit_ms));

        let worker = Self {
            state,
            fee,
            command_rx,
            event_tx,
            running,
            limiter,
            pending: Vec::new(),
            snapshots: SnapshotBuilder::new(),
            finished: false,
        };

        (worker, handle, event_rx)
    }

    /// Run until stopped or faulted. A finished match stops ticking but keeps
    /// the worker alive until its orchestrator stops it.
    pub async fn run(mut self) -> WorkerExit {
        let room_id = self.state.room_id;
        info!(
            room_id = %room_id,
            players = self.state.players.len(),
            fee = self.fee,
            "Match started"
        );

        let mut ticker = interval(self.state.config().tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let exit = loop {
            if !self.running.load(Ordering::Acquire) {
                break self.stopped();
            }

            tokio::select! {
                biased;

                command = self.command_rx.recv() => match command {
                    Some(WorkerCommand::PlayerMoveRelative { player_id, delta }) => {
                        self.accept_move(player_id, delta);
                    }
                    Some(WorkerCommand::Stop) | None => break self.stopped(),
                },

                _ = ticker.tick(), if !self.finished => {
                    if let Some(exit) = self.step().await {
                        break exit;
                    }
                }
            }
        };

        self.running.store(false, Ordering::Release);
        info!(
            room_id = %room_id,
            exit = ?exit,
            ticks = self.state.tick,
            snapshots = self.snapshots.built(),
            "Match worker exited"
        );
        exit
    }

    fn stopped(&self) -> WorkerExit {
        if self.finished {
            WorkerExit::Finished
        } else {
            WorkerExit::Stopped
        }
    }

    fn accept_move(&mut self, player_id: PlayerId, delta: f64) {
        if self.finished {
            return;
        }
        if !self.limiter.check(&player_id) {
            debug!(room_id = %self.state.room_id, player_id = %player_id, "Move rate limited");
            return;
        }
        self.pending.push((player_id, delta));
    }

    /// One tick: apply queued moves, simulate, report
    async fn step(&mut self) -> Option<WorkerExit> {
        let timer = Timer::new();

        for (player_id, delta) in self.pending.drain(..) {
            self.state.move_player(&player_id, delta);
        }

        let state = &mut self.state;
        let outcome = match catch_unwind(AssertUnwindSafe(|| state.tick())) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => return Some(self.fail(e.to_string()).await),
            Err(panic) => return Some(self.fail(panic_reason(panic.as_ref())).await),
        };

        let snapshot = self.snapshots.build(&self.state);
        match self.event_tx.try_send(snapshot) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(
                    room_id = %self.state.room_id,
                    tick = self.state.tick,
                    "Snapshot dropped, event queue full"
                );
            }
            Err(TrySendError::Closed(_)) => {
                warn!(room_id = %self.state.room_id, "Event consumer gone, stopping match");
                return Some(WorkerExit::Stopped);
            }
        }

        if let TickOutcome::Finished { last_eliminated } = outcome {
            self.finish(last_eliminated).await;
            return None;
        }

        let fps = self.state.config().fps as u64;
        if self.state.tick % fps.max(1) == 0 {
            self.limiter.shrink();
        }

        let budget = self.state.config().tick_duration().as_micros() as u64;
        let elapsed = timer.elapsed_micros();
        if elapsed > budget {
            warn!(
                room_id = %self.state.room_id,
                tick = self.state.tick,
                elapsed_us = elapsed,
                budget_us = budget,
                "Slow tick"
            );
        }

        None
    }

    async fn finish(&mut self, last_eliminated: PlayerId) {
        self.finished = true;
        let mut game_result = self.state.result(self.fee);
        assign_scores(&mut game_result);

        info!(
            room_id = %self.state.room_id,
            last_eliminated = %last_eliminated,
            ticks = self.state.tick,
            "Match finished"
        );

        let event = WorkerEvent::GameFinished {
            room_id: self.state.room_id,
            game_result,
        };
        if self.event_tx.send(event).await.is_err() {
            warn!(room_id = %self.state.room_id, "Result dropped, event consumer gone");
        }
    }

    async fn fail(&mut self, reason: String) -> WorkerExit {
        error!(
            room_id = %self.state.room_id,
            tick = self.state.tick,
            reason = %reason,
            "Match worker fault"
        );

        let event = WorkerEvent::WorkerFailed {
            room_id: self.state.room_id,
            reason,
        };
        let _ = self.event_tx.send(event).await;
        WorkerExit::Faulted
    }
}

fn panic_reason(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("tick panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("tick panicked: {message}")
    } else {
        "tick panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaunchAngle;
    use crate::game::MatchPhase;
    use crate::protocol::{MatchSnapshot, ResultState};
    use glam::DVec2;
    use tokio::time::timeout;
    use uuid::Uuid;

    const WAIT: Duration = Duration::from_secs(5);

    fn roster(n: usize) -> Vec<RosterEntry> {
        (0..n)
            .map(|i| RosterEntry::new(Uuid::new_v4(), format!("player{i}")))
            .collect()
    }

    fn config() -> GameConfig {
        GameConfig {
            seed: Some(7),
            ..GameConfig::default()
        }
    }

    async fn next_snapshot(events: &mut mpsc::Receiver<WorkerEvent>) -> MatchSnapshot {
        match timeout(WAIT, events.recv()).await {
            Ok(Some(WorkerEvent::GameState { state, .. })) => state,
            other => panic!("expected a snapshot, got {other:?}"),
        }
    }

    async fn drain(mut events: mpsc::Receiver<WorkerEvent>) -> Vec<WorkerEvent> {
        let mut all = Vec::new();
        while let Ok(Some(event)) = timeout(WAIT, events.recv()).await {
            all.push(event);
        }
        all
    }

    #[tokio::test]
    async fn spawn_rejects_bad_rosters() {
        let room = Uuid::new_v4();

        assert!(matches!(
            spawn(room, vec![], 10, config()),
            Err(SessionError::RosterTooSmall { found: 0 })
        ));
        assert!(matches!(
            spawn(room, roster(1), 10, config()),
            Err(SessionError::RosterTooSmall { found: 1 })
        ));

        let mut dup = roster(2);
        dup[1].id = dup[0].id;
        let id = dup[0].id;
        assert!(matches!(
            spawn(room, dup, 10, config()),
            Err(SessionError::DuplicatePlayer(found)) if found == id
        ));
    }

    #[tokio::test]
    async fn emits_a_snapshot_every_tick() {
        let room = Uuid::new_v4();
        let (handle, mut events, join) = spawn(room, roster(3), 10, config()).unwrap();

        let first = next_snapshot(&mut events).await;
        assert_eq!(first.phase, MatchPhase::Countdown);
        assert_eq!(first.players.len(), 3);

        let second = next_snapshot(&mut events).await;
        assert!(second.countdown_seconds < first.countdown_seconds);

        handle.stop();
        assert_eq!(join.await.unwrap(), WorkerExit::Stopped);
    }

    #[tokio::test]
    async fn move_is_applied_on_the_next_tick() {
        let players = roster(2);
        let mover = players[0].id;
        let (handle, mut events, join) = spawn(Uuid::new_v4(), players, 10, config()).unwrap();

        next_snapshot(&mut events).await;
        handle.move_relative(mover, 100.0).unwrap();

        let mut moved = false;
        for _ in 0..10 {
            let snapshot = next_snapshot(&mut events).await;
            if (snapshot.players[0].position - 0.6).abs() < 1e-9 {
                moved = true;
                break;
            }
        }
        assert!(moved);

        handle.stop();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn burst_of_moves_applies_only_the_first() {
        let players = roster(2);
        let mover = players[0].id;
        let (handle, mut events, join) = spawn(Uuid::new_v4(), players, 10, config()).unwrap();

        next_snapshot(&mut events).await;
        for _ in 0..10 {
            handle.move_relative(mover, 100.0).unwrap();
        }

        let mut last = None;
        for _ in 0..5 {
            last = Some(next_snapshot(&mut events).await);
        }
        let position = last.unwrap().players[0].position;
        assert!((position - 0.6).abs() < 1e-9, "position {position}");

        handle.stop();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_worker() {
        let (handle, _events, join) = spawn(Uuid::new_v4(), roster(2), 10, config()).unwrap();
        drop(handle);
        assert_eq!(join.await.unwrap(), WorkerExit::Stopped);
    }

    #[tokio::test]
    async fn finished_match_reports_once_and_waits_for_stop() {
        let players = roster(2);
        let left = players[0].id;
        let right = players[1].id;

        // Fast serve to the right, wide of the centred paddle
        let config = GameConfig {
            countdown_secs: 0.0,
            ball_speed: 30.0,
            launch_angle: LaunchAngle::Fixed(0.3f64.atan()),
            ..config()
        };
        let room = Uuid::new_v4();
        let (handle, mut events, join) = spawn(room, players, 100, config).unwrap();

        let mut last_state = None;
        let (room_id, result) = loop {
            match timeout(WAIT, events.recv()).await {
                Ok(Some(WorkerEvent::GameState { state, .. })) => last_state = Some(state),
                Ok(Some(WorkerEvent::GameFinished { room_id, game_result })) => {
                    break (room_id, game_result)
                }
                other => panic!("unexpected {other:?}"),
            }
        };

        assert_eq!(room_id, room);
        assert_eq!(result.state, ResultState::Finished);
        assert_eq!(last_state.unwrap().phase, MatchPhase::Finished);
        let score_of = |id| result.players.iter().find(|p| p.id == id).unwrap();
        assert_eq!(score_of(left).place, Some(1));
        assert_eq!(score_of(left).score, 180);
        assert_eq!(score_of(right).place, Some(2));
        assert_eq!(score_of(right).score, 20);

        // No more ticks, but still alive until stopped
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_running());
        assert!(events.try_recv().is_err());

        handle.stop();
        assert_eq!(timeout(WAIT, join).await.unwrap().unwrap(), WorkerExit::Finished);
        assert!(drain(events).await.is_empty());
    }

    #[tokio::test]
    async fn non_finite_state_faults_the_worker() {
        let config = GameConfig {
            countdown_secs: 0.0,
            ..config()
        };
        let mut state = MatchState::new(Uuid::new_v4(), &roster(2), config);
        state.tick().unwrap();
        state.ball.velocity = DVec2::new(f64::NAN, f64::NAN);

        let (worker, _handle, events) = SessionWorker::new(state, 10);
        let exit = tokio::spawn(worker.run()).await.unwrap();
        assert_eq!(exit, WorkerExit::Faulted);

        let all = drain(events).await;
        assert_eq!(all.len(), 1);
        assert!(matches!(&all[0], WorkerEvent::WorkerFailed { reason, .. } if reason.contains("not finite")));
    }

    #[tokio::test]
    async fn panic_inside_a_tick_faults_the_worker() {
        // Unvalidated tuning: the first paddle hit draws from an infinite range
        let config = GameConfig {
            countdown_secs: 0.0,
            ball_speed: 30.0,
            launch_angle: LaunchAngle::Fixed(0.0),
            vertex_avoid_angle: f64::INFINITY,
            ..config()
        };
        let state = MatchState::new(Uuid::new_v4(), &roster(2), config);

        let (worker, _handle, events) = SessionWorker::new(state, 10);
        let exit = timeout(WAIT, tokio::spawn(worker.run()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, WorkerExit::Faulted);

        let all = drain(events).await;
        let failures: Vec<_> = all
            .iter()
            .filter(|event| matches!(event, WorkerEvent::WorkerFailed { .. }))
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            all.last(),
            Some(WorkerEvent::WorkerFailed { reason, .. }) if reason.starts_with("tick panicked")
        ));
    }

    #[tokio::test]
    async fn full_event_queue_drops_snapshots_and_keeps_ticking() {
        let (handle, mut events, _join) = spawn(Uuid::new_v4(), roster(2), 10, config()).unwrap();

        // Well over EVENT_QUEUE ticks without reading
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(handle.is_running());

        for _ in 0..EVENT_QUEUE {
            next_snapshot(&mut events).await;
        }
        next_snapshot(&mut events).await;
        assert!(handle.is_running());
        handle.stop();
    }

    #[tokio::test]
    async fn spawn_rejects_invalid_tuning() {
        let config = GameConfig {
            vertex_avoid_angle: f64::INFINITY,
            ..config()
        };
        assert!(matches!(
            spawn(Uuid::new_v4(), roster(2), 10, config),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn panic_reason_reads_string_payloads() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_reason(payload.as_ref()), "tick panicked: boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_reason(payload.as_ref()), "tick panicked: bang");
    }
}
