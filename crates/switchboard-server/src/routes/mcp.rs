//! The `/mcp` endpoint: JSON-RPC over POST, the SSE stream over GET,
//! session teardown over DELETE, and the sampling return leg.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    Json,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use tokio::sync::mpsc;

use switchboard_mcp::{CreateMessageResult, JsonRpcError, JsonRpcResponse};

use crate::rpc::{self, RpcMessage};
use crate::session::BufferedEvent;
use crate::state::AppState;

/// Session continuity header.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// SSE resume header.
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

// ─────────────────────────────────────────────────────────────────────────────
// POST /mcp
// ─────────────────────────────────────────────────────────────────────────────

/// POST handler: single message or batch, with optional SSE upgrade for
/// single messages.
pub async fn post_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            let response = JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("invalid JSON: {e}")),
            );
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let session_header = header_value(&headers, SESSION_HEADER);

    let is_batch = value.is_array();
    let messages: Vec<Value> = if is_batch {
        value.as_array().cloned().unwrap_or_default()
    } else {
        vec![value]
    };

    if messages.is_empty() {
        let response = JsonRpcResponse::failure(
            Value::Null,
            JsonRpcError::invalid_request("empty batch"),
        );
        return (StatusCode::BAD_REQUEST, Json(response)).into_response();
    }

    // SSE upgrade is only considered for single-message bodies.
    if !is_batch && accepts_event_stream(&headers) && wants_sse_upgrade(&messages[0]) {
        return sse_post(state, session_header, messages.into_iter().next().unwrap()).await;
    }

    let mut responses: Vec<JsonRpcResponse> = Vec::new();
    let mut requests = Vec::new();
    let mut new_session: Option<String> = None;
    let mut saw_request = false;

    for message in &messages {
        match rpc::classify(message) {
            RpcMessage::Request { id, method, .. } if method == "initialize" => {
                saw_request = true;
                if session_header.is_some() {
                    responses.push(JsonRpcResponse::failure(
                        id,
                        JsonRpcError::invalid_request("session already initialized"),
                    ));
                } else {
                    let session_id = state.sessions.create();
                    responses.push(JsonRpcResponse::success(id, rpc::initialize_result(&state)));
                    new_session = Some(session_id);
                }
            }
            RpcMessage::Request { id, method, params } => {
                saw_request = true;
                match &session_header {
                    Some(session_id) if state.sessions.touch(session_id) => {
                        requests.push((id, method, params));
                    }
                    Some(_) => responses.push(JsonRpcResponse::failure(
                        id,
                        JsonRpcError::invalid_request("unknown session"),
                    )),
                    None => responses.push(JsonRpcResponse::failure(
                        id,
                        JsonRpcError::invalid_request("Mcp-Session-Id header required"),
                    )),
                }
            }
            RpcMessage::Notification { method } => {
                tracing::debug!(method = %method, "notification accepted");
            }
            RpcMessage::Response => {
                tracing::debug!("client response accepted");
            }
            RpcMessage::Malformed => {
                responses.push(JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::invalid_request("malformed message"),
                ));
            }
        }
    }

    // Batch elements run independently and concurrently.
    let dispatched = futures::future::join_all(
        requests
            .into_iter()
            .map(|(id, method, params)| {
                let state = state.clone();
                async move { rpc::dispatch_request(&state, id, &method, params).await }
            }),
    )
    .await;
    responses.extend(dispatched);

    let mut response_headers = HeaderMap::new();
    if let Some(session_id) = &new_session
        && let Ok(value) = session_id.parse()
    {
        response_headers.insert(SESSION_HEADER, value);
    }

    if responses.is_empty() {
        // Only notifications/responses, or requests that all got filtered.
        let status = if saw_request {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::ACCEPTED
        };
        return (status, response_headers).into_response();
    }

    if is_batch {
        (StatusCode::OK, response_headers, Json(responses)).into_response()
    } else {
        let response = responses.into_iter().next().unwrap();
        let status = rpc::status_for_response(&response);
        (status, response_headers, Json(response)).into_response()
    }
}

/// Whether a single message qualifies for the SSE upgrade: `initialize`,
/// or a request carrying `params.options.onprogress`.
fn wants_sse_upgrade(message: &Value) -> bool {
    match rpc::classify(message) {
        RpcMessage::Request { method, params, .. } => {
            method == "initialize"
                || params
                    .get("options")
                    .and_then(|o| o.get("onprogress"))
                    .is_some_and(|v| !v.is_null())
        }
        _ => false,
    }
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    header_value(headers, header::ACCEPT.as_str())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Process a single message and answer over a freshly attached SSE
/// stream: the JSON-RPC response arrives as a `response` event, then the
/// stream stays attached as the session's sink.
async fn sse_post(state: AppState, session_header: Option<String>, message: Value) -> Response {
    let (session_id, response, new_session) = match rpc::classify(&message) {
        RpcMessage::Request { id, method, .. } if method == "initialize" => {
            if session_header.is_some() {
                let response = JsonRpcResponse::failure(
                    id,
                    JsonRpcError::invalid_request("session already initialized"),
                );
                return (StatusCode::BAD_REQUEST, Json(response)).into_response();
            }
            let session_id = state.sessions.create();
            let response = JsonRpcResponse::success(id, rpc::initialize_result(&state));
            (session_id, response, true)
        }
        RpcMessage::Request { id, method, params } => {
            let Some(session_id) = session_header else {
                let response = JsonRpcResponse::failure(
                    id,
                    JsonRpcError::invalid_request("Mcp-Session-Id header required"),
                );
                return (StatusCode::BAD_REQUEST, Json(response)).into_response();
            };
            if !state.sessions.touch(&session_id) {
                let response = JsonRpcResponse::failure(
                    id,
                    JsonRpcError::invalid_request("unknown session"),
                );
                return (StatusCode::BAD_REQUEST, Json(response)).into_response();
            }
            let response = rpc::dispatch_request(&state, id, &method, params).await;
            (session_id, response, false)
        }
        _ => {
            let response = JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::invalid_request("SSE upgrade requires a request"),
            );
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let response_value = match serde_json::to_value(&response) {
        Ok(value) => value,
        Err(e) => {
            return crate::error::ServerError::Serialization(e).into_response();
        }
    };

    // Buffer the response first so the attach below replays it as the
    // stream's first event, then keep the stream as the session sink.
    let Some(event_id) = state.sessions.enqueue(&session_id, "response", &response_value) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some((rx, epoch)) = state.sessions.attach_sink(&session_id, Some(event_id - 1)) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut response_headers = HeaderMap::new();
    if new_session && let Ok(value) = session_id.parse() {
        response_headers.insert(SESSION_HEADER, value);
    }

    let sse = sse_response(&state, session_id, epoch, rx, None);
    (response_headers, sse).into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// GET /mcp (SSE stream)
// ─────────────────────────────────────────────────────────────────────────────

/// GET handler: open the session's SSE stream, replaying buffered events
/// past `Last-Event-ID`.
pub async fn get_mcp(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !accepts_event_stream(&headers) {
        return (StatusCode::BAD_REQUEST, "Accept: text/event-stream required").into_response();
    }

    let Some(session_id) = header_value(&headers, SESSION_HEADER) else {
        return (StatusCode::BAD_REQUEST, "Mcp-Session-Id header required").into_response();
    };

    if !state.sessions.touch(&session_id) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let last_event_id = header_value(&headers, LAST_EVENT_ID_HEADER)
        .and_then(|raw| raw.trim().parse::<u64>().ok());

    let Some((rx, epoch)) = state.sessions.attach_sink(&session_id, last_event_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    // A snapshot of everything the host currently knows, sent before any
    // buffered replay. Not buffered itself, so it carries no event id.
    let initial_state = Event::default().event("initialState").data(
        serde_json::json!({
            "tools": state.host.get_tools(),
            "resources": state.host.get_resources(),
            "resourceTemplates": state.host.get_resource_templates(),
            "prompts": state.host.get_prompts(),
            "roots": state.host.get_current_roots(),
            "servers": state.host.connected_server_ids(),
        })
        .to_string(),
    );

    sse_response(&state, session_id, epoch, rx, Some(initial_state)).into_response()
}

/// Detaches the session sink when the SSE stream is dropped.
struct SinkGuard {
    state: AppState,
    session_id: String,
    epoch: u64,
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        self.state.sessions.detach_sink(&self.session_id, self.epoch);
    }
}

fn sse_response(
    state: &AppState,
    session_id: String,
    epoch: u64,
    mut rx: mpsc::UnboundedReceiver<BufferedEvent>,
    initial: Option<Event>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let guard = SinkGuard {
        state: state.clone(),
        session_id,
        epoch,
    };
    let heartbeat = state.config.heartbeat_interval;

    let stream = async_stream::stream! {
        let _guard = guard;

        if let Some(event) = initial {
            yield Ok(event);
        }

        while let Some(event) = rx.recv().await {
            yield Ok(Event::default()
                .id(event.id.to_string())
                .event(event.event)
                .data(event.data));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat))
}

// ─────────────────────────────────────────────────────────────────────────────
// DELETE /mcp
// ─────────────────────────────────────────────────────────────────────────────

/// DELETE handler: destroy the session named by the header.
pub async fn delete_mcp(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session_id) = header_value(&headers, SESSION_HEADER) else {
        return (StatusCode::BAD_REQUEST, "Mcp-Session-Id header required").into_response();
    };

    if state.sessions.destroy(&session_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sampling return leg
// ─────────────────────────────────────────────────────────────────────────────

/// Body of POST `/mcp/sampling_response`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingResponseBody {
    /// The broker-assigned request id being answered.
    pub request_id: String,
    /// The generation result.
    pub result: CreateMessageResult,
}

/// POST `/mcp/sampling_response` — deliver a sampling result.
pub async fn post_sampling_response(
    State(state): State<AppState>,
    Json(body): Json<SamplingResponseBody>,
) -> Response {
    let accepted = state
        .host
        .sampling()
        .complete(&body.request_id, Ok(body.result));
    Json(serde_json::json!({"accepted": accepted})).into_response()
}

/// Body of POST `/mcp/sampling_error`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingErrorBody {
    /// The broker-assigned request id being failed.
    pub request_id: String,
    /// The error to relay to the originating server.
    pub error: JsonRpcError,
}

/// POST `/mcp/sampling_error` — deliver a sampling failure.
pub async fn post_sampling_error(
    State(state): State<AppState>,
    Json(body): Json<SamplingErrorBody>,
) -> Response {
    let accepted = state
        .host
        .sampling()
        .complete(&body.request_id, Err(body.error));
    Json(serde_json::json!({"accepted": accepted})).into_response()
}
