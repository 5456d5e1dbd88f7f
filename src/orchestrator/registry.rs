//! Registry of running matches and the players seated in them

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::game::{PlayerId, RoomId, SessionHandle};

use super::OrchestratorError;

/// A running match
#[derive(Clone)]
pub struct MatchEntry {
    pub handle: SessionHandle,
    pub players: Vec<PlayerId>,
    pub fee: u64,
    pub started_at: DateTime<Utc>,
}

/// Public view of a running match
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub room_id: RoomId,
    pub players: Vec<PlayerId>,
    pub fee: u64,
    pub started_at: DateTime<Utc>,
}

/// Room and player lookups for running matches
#[derive(Default)]
pub struct SessionRegistry {
    rooms: DashMap<RoomId, MatchEntry>,
    players: DashMap<PlayerId, RoomId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a match and seat its players as one step. Changes nothing if
    /// the room is taken or any player is already seated elsewhere.
    pub fn insert(&self, entry: MatchEntry) -> Result<(), OrchestratorError> {
        let room_id = entry.handle.room_id;

        // Holding the room slot keeps a second insert for this room out
        let slot = match self.rooms.entry(room_id) {
            Entry::Occupied(_) => return Err(OrchestratorError::RoomActive(room_id)),
            Entry::Vacant(slot) => slot,
        };

        let mut seated = Vec::with_capacity(entry.players.len());
        for &player_id in &entry.players {
            match self.players.entry(player_id) {
                Entry::Occupied(taken) if *taken.get() != room_id => {
                    drop(taken);
                    for claimed in &seated {
                        self.players.remove_if(claimed, |_, room| *room == room_id);
                    }
                    return Err(OrchestratorError::PlayerBusy(player_id));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(free) => {
                    free.insert(room_id);
                    seated.push(player_id);
                }
            }
        }

        slot.insert(entry);
        Ok(())
    }

    /// Drop a match and release its players
    pub fn remove(&self, room_id: &RoomId) -> Option<MatchEntry> {
        let (_, entry) = self.rooms.remove(room_id)?;
        for player_id in &entry.players {
            self.players.remove_if(player_id, |_, room| room == room_id);
        }
        Some(entry)
    }

    pub fn handle(&self, room_id: &RoomId) -> Option<SessionHandle> {
        self.rooms.get(room_id).map(|entry| entry.handle.clone())
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_for_player(&self, player_id: &PlayerId) -> Option<RoomId> {
        self.players.get(player_id).map(|room| *room)
    }

    pub fn active_matches(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.players.len()
    }

    pub fn summaries(&self) -> Vec<MatchSummary> {
        let mut summaries: Vec<MatchSummary> = self
            .rooms
            .iter()
            .map(|entry| MatchSummary {
                room_id: *entry.key(),
                players: entry.players.clone(),
                fee: entry.fee,
                started_at: entry.started_at,
            })
            .collect();
        summaries.sort_by_key(|s| s.started_at);
        summaries
    }
}
