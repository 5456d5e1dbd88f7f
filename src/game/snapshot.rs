//! Snapshot building for outbound state messages

use crate::protocol::{MatchSnapshot, PlayerSnapshot, WorkerEvent};

use super::state::MatchState;

/// Builds per-tick snapshots of a match
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    /// Snapshots built so far
    built: u64,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn built(&self) -> u64 {
        self.built
    }

    /// Build a state message for the current tick
    pub fn build(&mut self, state: &MatchState) -> WorkerEvent {
        self.built += 1;
        WorkerEvent::GameState {
            room_id: state.room_id,
            state: snapshot_of(state),
        }
    }
}

/// Copy of the match as clients see it
pub fn snapshot_of(state: &MatchState) -> MatchSnapshot {
    MatchSnapshot {
        phase: state.phase,
        ball_position: state.ball.position.to_array(),
        players: state
            .players
            .iter()
            .map(|p| PlayerSnapshot {
                id: p.id,
                username: p.username.clone(),
                position: p.position,
                x: p.x,
                y: p.y,
                is_active: p.is_active,
                place: p.place,
                players_kicked: p.players_kicked,
            })
            .collect(),
        countdown_seconds: state.countdown_seconds(),
    }
}
