//! Match simulation modules

pub mod arena;
pub mod physics;
pub mod scoring;
pub mod session;
pub mod snapshot;
pub mod state;

pub use session::{spawn, SessionError, SessionHandle, SessionWorker, WorkerExit};
pub use state::{MatchPhase, MatchState, Player, SimulationError, TickOutcome};

use uuid::Uuid;

/// Player identifier, shared with the account system
pub type PlayerId = Uuid;

/// Match (room) identifier
pub type RoomId = Uuid;
