//! Bearer key check for the match control routes

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::app::AppState;

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Invalid API key")]
    InvalidKey,

    #[error("Control routes are disabled")]
    Disabled,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingHeader | AuthError::InvalidKey => StatusCode::UNAUTHORIZED,
            AuthError::Disabled => StatusCode::FORBIDDEN,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

/// Compare without bailing out on the first differing byte
fn keys_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Middleware to require the internal API key
pub async fn require_api_key(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let expected = state
        .config
        .internal_api_key
        .as_deref()
        .ok_or(AuthError::Disabled)?;

    let TypedHeader(Authorization(bearer)) = auth.ok_or(AuthError::MissingHeader)?;
    if !keys_match(expected, bearer.token()) {
        return Err(AuthError::InvalidKey);
    }

    Ok(next.run(request).await)
}
