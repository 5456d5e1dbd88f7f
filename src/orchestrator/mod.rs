//! Match orchestration: worker lifecycle, input routing and result capture

pub mod registry;
pub mod results;
pub mod service;

pub use registry::{MatchEntry, MatchSummary, SessionRegistry};
pub use results::{InMemoryResultSink, LogResultSink, ResultSink};
pub use service::SessionOrchestrator;

use crate::game::{PlayerId, RoomId, SessionError};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("room {0} already has a running match")]
    RoomActive(RoomId),

    #[error("player {0} is already in a match")]
    PlayerBusy(PlayerId),

    #[error("no running match for room {0}")]
    UnknownRoom(RoomId),

    #[error("player {0} is not in a match")]
    UnknownPlayer(PlayerId),

    #[error(transparent)]
    Session(#[from] SessionError),
}
