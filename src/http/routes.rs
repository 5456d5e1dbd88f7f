//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{RoomId, SessionError};
use crate::http::middleware::require_api_key;
use crate::orchestrator::{MatchSummary, OrchestratorError};
use crate::protocol::RosterEntry;
use crate::util::time::uptime_secs;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health_handler));

    let mut router = Router::new().merge(public_routes);

    // Control routes only exist when a key is configured
    if state.config.internal_api_key.is_some() {
        let control_routes = Router::new()
            .route("/matches", get(list_matches_handler).post(start_match_handler))
            .route("/matches/:room_id/stop", post(stop_match_handler))
            .layer(middleware::from_fn_with_state(state.clone(), require_api_key));
        router = router.merge(control_routes);
    }

    router
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.orchestrator.active_matches(),
        active_players: state.orchestrator.total_players(),
    })
}

// ============================================================================
// Match control endpoints
// ============================================================================

async fn list_matches_handler(State(state): State<AppState>) -> Json<Vec<MatchSummary>> {
    Json(state.orchestrator.matches())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartMatchRequest {
    #[serde(default)]
    room_id: Option<RoomId>,
    players: Vec<RosterEntry>,
    fee: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartMatchResponse {
    room_id: RoomId,
    player_count: usize,
}

async fn start_match_handler(
    State(state): State<AppState>,
    Json(req): Json<StartMatchRequest>,
) -> Result<(StatusCode, Json<StartMatchResponse>), AppError> {
    let room_id = req.room_id.unwrap_or_else(Uuid::new_v4);
    let player_count = req.players.len();

    state.orchestrator.start_match(room_id, req.players, req.fee)?;

    Ok((
        StatusCode::CREATED,
        Json(StartMatchResponse {
            room_id,
            player_count,
        }),
    ))
}

#[derive(Serialize)]
struct StopMatchResponse {
    status: &'static str,
}

async fn stop_match_handler(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> Result<(StatusCode, Json<StopMatchResponse>), AppError> {
    state.orchestrator.stop_match(room_id)?;
    Ok((StatusCode::ACCEPTED, Json(StopMatchResponse { status: "stopping" })))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<OrchestratorError> for AppError {
    fn from(e: OrchestratorError) -> Self {
        let message = e.to_string();
        match e {
            OrchestratorError::RoomActive(_) | OrchestratorError::PlayerBusy(_) => {
                AppError::Conflict(message)
            }
            OrchestratorError::UnknownRoom(_) | OrchestratorError::UnknownPlayer(_) => {
                AppError::NotFound(message)
            }
            OrchestratorError::Session(
                SessionError::RosterTooSmall { .. }
                | SessionError::DuplicatePlayer(_)
                | SessionError::Config(_),
            ) => AppError::BadRequest(message),
            OrchestratorError::Session(_) => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
