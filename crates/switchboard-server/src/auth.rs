//! API-key authentication.
//!
//! When auth is required every HTTP request must carry `X-API-Key`
//! matching one of the configured keys. WebSocket clients may pass the key
//! as a header or as an `api_key` query parameter, since browsers cannot
//! set custom headers on WebSocket handshakes.
//!
//! Key comparison uses constant-time equality to avoid timing leaks.

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Query parameter fallback for WebSocket clients.
pub const API_KEY_QUERY_PARAM: &str = "api_key";

/// Authentication error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No key was presented.
    MissingKey,
    /// The presented key matched nothing.
    InvalidKey,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingKey => write!(f, "Missing API key"),
            AuthError::InvalidKey => write!(f, "Invalid API key"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": StatusCode::UNAUTHORIZED.as_u16(),
        });
        (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
    }
}

/// Compare two strings in constant time.
///
/// Length differences are decided after a dummy comparison so the timing
/// does not depend on how many leading characters match.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() == b_bytes.len() {
        a_bytes.ct_eq(b_bytes).into()
    } else {
        let _ = a_bytes.ct_eq(a_bytes);
        false
    }
}

/// Check a presented key against the configured set.
fn key_matches(presented: &str, keys: &[String]) -> bool {
    // Evaluate against every key so timing does not reveal which one hit.
    let mut matched = false;
    for key in keys {
        matched |= constant_time_eq(presented, key);
    }
    matched
}

/// Extract the presented key from a request: header first, then the query
/// parameter (WebSocket clients).
fn presented_key(request: &Request<Body>) -> Option<String> {
    if let Some(header) = request.headers().get(API_KEY_HEADER)
        && let Ok(value) = header.to_str()
    {
        return Some(value.to_string());
    }

    let query = request.uri().query()?;
    for pair in query.split('&') {
        if let Some((name, value)) = pair.split_once('=')
            && name == API_KEY_QUERY_PARAM
        {
            return Some(value.to_string());
        }
    }
    None
}

/// Validate a request against the bridge config.
pub fn validate_request(request: &Request<Body>, state: &AppState) -> Result<(), AuthError> {
    if !state.config.auth_required {
        return Ok(());
    }

    let Some(key) = presented_key(request) else {
        return Err(AuthError::MissingKey);
    };

    if key_matches(&key, &state.config.api_keys) {
        Ok(())
    } else {
        Err(AuthError::InvalidKey)
    }
}

/// Authentication middleware.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    validate_request(&request, &state)?;
    Ok(next.run(request).await)
}
