//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::orchestrator::{ResultSink, SessionOrchestrator, SessionRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: SessionOrchestrator,
}

impl AppState {
    pub fn new(config: Config, sink: Arc<dyn ResultSink>) -> Self {
        let config = Arc::new(config);

        let registry = Arc::new(SessionRegistry::new());
        let orchestrator = SessionOrchestrator::new(registry, sink, config.game.clone());

        Self {
            config,
            orchestrator,
        }
    }
}
