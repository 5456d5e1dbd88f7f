//! Session worker message definitions
//! These are the wire types exchanged between a match worker and its orchestrator

use serde::{Deserialize, Serialize};

use crate::game::{MatchPhase, PlayerId, RoomId};

/// A player handed to a new match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: PlayerId,
    pub username: String,
}

impl RosterEntry {
    pub fn new(id: PlayerId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// Messages sent from the orchestrator to a match worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerCommand {
    /// Move a paddle by a relative amount (raw pointer delta)
    #[serde(rename_all = "camelCase")]
    PlayerMoveRelative { player_id: PlayerId, delta: f64 },

    /// Cooperative shutdown
    Stop,
}

/// Messages sent from a match worker to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerEvent {
    /// Match state snapshot (sent every tick)
    #[serde(rename_all = "camelCase")]
    GameState { room_id: RoomId, state: MatchSnapshot },

    /// Match has ended (sent exactly once)
    #[serde(rename_all = "camelCase")]
    GameFinished {
        room_id: RoomId,
        game_result: GameResult,
    },

    /// The worker hit a fault and stopped
    #[serde(rename_all = "camelCase")]
    WorkerFailed { room_id: RoomId, reason: String },
}

/// Per-tick view of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub phase: MatchPhase,
    pub ball_position: [f64; 2],
    pub players: Vec<PlayerSnapshot>,
    /// Seconds left before the serve (0 outside the countdown)
    pub countdown_seconds: f64,
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub username: String,
    /// Paddle centre along the seat, 0..1
    pub position: f64,
    pub x: f64,
    pub y: f64,
    pub is_active: bool,
    pub place: Option<u32>,
    pub players_kicked: u32,
}

/// How a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultState {
    Finished,
    Aborted,
}

/// Final outcome of a match, consumed for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub players: Vec<ResultPlayer>,
    pub state: ResultState,
    /// Entry fee paid by each player
    pub fee: u64,
}

impl GameResult {
    /// Result for a match that ended without a winner
    pub fn aborted(roster: &[RosterEntry], fee: u64) -> Self {
        Self {
            players: roster
                .iter()
                .map(|entry| ResultPlayer {
                    id: entry.id,
                    username: entry.username.clone(),
                    place: None,
                    players_kicked: 0,
                    is_active: false,
                    score: 0,
                })
                .collect(),
            state: ResultState::Aborted,
            fee,
        }
    }

    /// Total prize pool
    pub fn pool(&self) -> u64 {
        self.fee.saturating_mul(self.players.len() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPlayer {
    pub id: PlayerId,
    pub username: String,
    pub place: Option<u32>,
    pub players_kicked: u32,
    pub is_active: bool,
    pub score: u64,
}
