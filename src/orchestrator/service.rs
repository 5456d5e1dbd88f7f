//! Orchestrator service - starts match workers, routes input, collects results

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::GameConfig;
use crate::game::{self, PlayerId, RoomId, SessionHandle, WorkerExit};
use crate::protocol::{GameResult, RosterEntry, WorkerEvent};

use super::registry::{MatchEntry, MatchSummary, SessionRegistry};
use super::results::ResultSink;
use super::OrchestratorError;

const EVENT_FANOUT: usize = 1024;

/// Owns the lifecycle of every match worker
#[derive(Clone)]
pub struct SessionOrchestrator {
    registry: Arc<SessionRegistry>,
    sink: Arc<dyn ResultSink>,
    config: GameConfig,
    events: broadcast::Sender<WorkerEvent>,
}

impl SessionOrchestrator {
    pub fn new(registry: Arc<SessionRegistry>, sink: Arc<dyn ResultSink>, config: GameConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_FANOUT);
        Self {
            registry,
            sink,
            config,
            events,
        }
    }

    /// Spawn a worker for a new match
    pub fn start_match(
        &self,
        room_id: RoomId,
        roster: Vec<RosterEntry>,
        fee: u64,
    ) -> Result<(), OrchestratorError> {
        if self.registry.contains(&room_id) {
            return Err(OrchestratorError::RoomActive(room_id));
        }
        if let Some(busy) = roster
            .iter()
            .find(|entry| self.registry.room_for_player(&entry.id).is_some())
        {
            return Err(OrchestratorError::PlayerBusy(busy.id));
        }

        let (handle, events, join) = game::spawn(room_id, roster.clone(), fee, self.config.clone())?;

        let entry = MatchEntry {
            handle: handle.clone(),
            players: roster.iter().map(|entry| entry.id).collect(),
            fee,
            started_at: Utc::now(),
        };
        // Lost a race for the room or a player since the checks above
        if let Err(e) = self.registry.insert(entry) {
            handle.stop();
            return Err(e);
        }

        info!(
            room_id = %room_id,
            player_count = roster.len(),
            fee,
            "Created new match"
        );

        tokio::spawn(forward_events(
            handle,
            self.registry.clone(),
            self.sink.clone(),
            self.events.clone(),
            room_id,
            roster,
            fee,
            events,
            join,
        ));

        Ok(())
    }

    /// Forward a relative paddle move to the player's match
    pub fn route_input(&self, player_id: PlayerId, delta: f64) -> Result<(), OrchestratorError> {
        let room_id = self
            .registry
            .room_for_player(&player_id)
            .ok_or(OrchestratorError::UnknownPlayer(player_id))?;
        let handle = self
            .registry
            .handle(&room_id)
            .ok_or(OrchestratorError::UnknownRoom(room_id))?;

        handle.move_relative(player_id, delta)?;
        Ok(())
    }

    /// Ask a match to stop; its result is recorded as aborted
    pub fn stop_match(&self, room_id: RoomId) -> Result<(), OrchestratorError> {
        let handle = self
            .registry
            .handle(&room_id)
            .ok_or(OrchestratorError::UnknownRoom(room_id))?;
        handle.stop();
        info!(room_id = %room_id, "Match stop requested");
        Ok(())
    }

    /// Stop every running match
    pub fn stop_all(&self) {
        for summary in self.registry.summaries() {
            if let Some(handle) = self.registry.handle(&summary.room_id) {
                handle.stop();
            }
        }
    }

    /// Every event from every match
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    pub fn active_matches(&self) -> usize {
        self.registry.active_matches()
    }

    pub fn total_players(&self) -> usize {
        self.registry.total_players()
    }

    pub fn room_for_player(&self, player_id: &PlayerId) -> Option<RoomId> {
        self.registry.room_for_player(player_id)
    }

    pub fn matches(&self) -> Vec<MatchSummary> {
        self.registry.summaries()
    }
}

/// Fan worker events out to subscribers, then clean up and record the result
/// once the worker is gone
#[allow(clippy::too_many_arguments)]
async fn forward_events(
    handle: SessionHandle,
    registry: Arc<SessionRegistry>,
    sink: Arc<dyn ResultSink>,
    fanout: broadcast::Sender<WorkerEvent>,
    room_id: RoomId,
    roster: Vec<RosterEntry>,
    fee: u64,
    mut events: mpsc::Receiver<WorkerEvent>,
    join: JoinHandle<WorkerExit>,
) {
    let mut result: Option<GameResult> = None;
    let mut failed = false;

    while let Some(event) = events.recv().await {
        let finished = matches!(event, WorkerEvent::GameFinished { .. });
        match &event {
            WorkerEvent::GameFinished { game_result, .. } => {
                result = Some(game_result.clone());
            }
            WorkerEvent::WorkerFailed { reason, .. } => {
                warn!(room_id = %room_id, reason = %reason, "Match worker failed");
                failed = true;
            }
            WorkerEvent::GameState { .. } => {}
        }

        // No subscribers is fine
        if fanout.send(event).is_err() {
            debug!(room_id = %room_id, "No event subscribers");
        }

        // A finished worker idles until told to stop
        if finished {
            handle.stop();
        }
    }

    let exit = match join.await {
        Ok(exit) => exit,
        Err(e) => {
            error!(room_id = %room_id, error = %e, "Match task crashed");
            if !failed {
                let _ = fanout.send(WorkerEvent::WorkerFailed {
                    room_id,
                    reason: e.to_string(),
                });
            }
            WorkerExit::Faulted
        }
    };

    registry.remove(&room_id);

    let result = result.unwrap_or_else(|| GameResult::aborted(&roster, fee));
    if let Err(e) = sink.record(room_id, result).await {
        error!(room_id = %room_id, error = %e, "Failed to record match result");
    }

    info!(room_id = %room_id, exit = ?exit, "Match removed from registry");
}
