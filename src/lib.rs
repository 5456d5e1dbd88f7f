//! Polygon pong match server
//!
//! Authoritative simulation for multiplayer pong on a regular polygon arena:
//! - Arena geometry and the collision/goal engine
//! - Per-match session workers ticking at a fixed rate
//! - Elimination order, placement and prize scoring
//! - Orchestration of running matches and an HTTP status/control surface

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod orchestrator;
pub mod protocol;
pub mod util;
