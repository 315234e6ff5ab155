//! WebSocket endpoint for live events and the sampling return leg.
//!
//! ## Module structure
//!
//! - `protocol` — message types (ClientMessage, ServerMessage)
//! - `connection` — connection lifecycle and message handling
//!
//! Authentication runs in the shared middleware before the upgrade, so a
//! rejected key yields HTTP 401 during the handshake. WebSocket clients
//! may pass the key as `X-API-Key` or as the `api_key` query parameter.

mod connection;
mod protocol;

use axum::{
    extract::{State, ws::WebSocketUpgrade},
    response::Response,
};

use crate::state::AppState;

pub use protocol::{ClientMessage, ServerMessage};

/// GET /ws - WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| connection::handle_socket(socket, state))
}
