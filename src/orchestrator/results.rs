//! Destinations for final match results

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::game::RoomId;
use crate::protocol::GameResult;

// Port for persisting final match results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, room_id: RoomId, result: GameResult) -> anyhow::Result<()>;
}

/// Writes each result as a structured log line
#[derive(Debug, Default, Clone, Copy)]
pub struct LogResultSink;

#[async_trait]
impl ResultSink for LogResultSink {
    async fn record(&self, room_id: RoomId, result: GameResult) -> anyhow::Result<()> {
        let players = serde_json::to_string(&result.players)?;
        info!(
            room_id = %room_id,
            state = ?result.state,
            fee = result.fee,
            pool = result.pool(),
            players = %players,
            "Match result"
        );
        Ok(())
    }
}

/// Keeps results in memory, newest last
#[derive(Debug, Default)]
pub struct InMemoryResultSink {
    results: Mutex<Vec<(RoomId, GameResult)>>,
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<(RoomId, GameResult)> {
        self.results.lock().clone()
    }

    pub fn get(&self, room_id: &RoomId) -> Option<GameResult> {
        self.results
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| id == room_id)
            .map(|(_, result)| result.clone())
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn record(&self, room_id: RoomId, result: GameResult) -> anyhow::Result<()> {
        self.results.lock().push((room_id, result));
        Ok(())
    }
}
