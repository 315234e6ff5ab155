//! Read-only views and the roots endpoint.
//!
//! These predate the JSON-RPC surface and stay around for dashboards and
//! curl: `/status`, `/servers`, `/capabilities/*`, `/suggest/*`, and
//! `/config/roots`.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_mcp::{MCP_PROTOCOL_VERSION, Root, ServerCapabilities};

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// GET /status - liveness and shape of the host.
pub async fn get_status(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "servers": {
            "configured": state.host.configured_server_ids().len(),
            "connected": state.host.connected_server_ids().len(),
        },
        "sessions": state.sessions.len(),
    }))
}

/// One row of the `/servers` view.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerView {
    /// Server id.
    pub id: String,
    /// Whether the server is currently connected.
    pub connected: bool,
    /// Declared capabilities, when connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<ServerCapabilities>,
}

/// GET /servers - configured servers and their connection state.
pub async fn get_servers(State(state): State<AppState>) -> Json<Vec<ServerView>> {
    let views = state
        .host
        .configured_server_ids()
        .into_iter()
        .map(|id| {
            let connected = state.host.is_connected(&id);
            let capabilities = state.host.server_capabilities(&id);
            ServerView {
                id,
                connected,
                capabilities,
            }
        })
        .collect();
    Json(views)
}

/// GET /capabilities/tools
pub async fn get_tools(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({"tools": state.host.get_tools()}))
}

/// GET /capabilities/resources
pub async fn get_resources(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({"resources": state.host.get_resources()}))
}

/// GET /capabilities/templates
pub async fn get_templates(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({"resourceTemplates": state.host.get_resource_templates()}))
}

/// GET /capabilities/prompts
pub async fn get_prompts(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({"prompts": state.host.get_prompts()}))
}

/// Query for `/suggest/resource`.
#[derive(Debug, Deserialize)]
pub struct SuggestResourceQuery {
    /// The URI to resolve.
    pub uri: String,
}

/// GET /suggest/resource?uri=…
pub async fn suggest_resource(
    State(state): State<AppState>,
    Query(query): Query<SuggestResourceQuery>,
) -> Json<Value> {
    Json(serde_json::json!({"suggestions": state.host.suggest_server_for_uri(&query.uri)}))
}

/// Query for `/suggest/tool` and `/suggest/prompt`.
#[derive(Debug, Deserialize)]
pub struct SuggestNameQuery {
    /// The name to resolve.
    pub name: String,
}

/// GET /suggest/tool?name=…
pub async fn suggest_tool(
    State(state): State<AppState>,
    Query(query): Query<SuggestNameQuery>,
) -> Json<Value> {
    Json(serde_json::json!({"suggestions": state.host.suggest_server_for_tool(&query.name)}))
}

/// GET /suggest/prompt?name=…
pub async fn suggest_prompt(
    State(state): State<AppState>,
    Query(query): Query<SuggestNameQuery>,
) -> Json<Value> {
    Json(serde_json::json!({"suggestions": state.host.suggest_server_for_prompt(&query.name)}))
}

/// GET /config/roots - the current workspace roots.
pub async fn get_roots(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({"roots": state.host.get_current_roots()}))
}

/// Body of POST /config/roots: either `{"roots": [...]}` or a bare array.
fn parse_roots(body: Value) -> std::result::Result<Vec<Root>, String> {
    let array = match body {
        Value::Array(array) => array,
        Value::Object(mut obj) => match obj.remove("roots") {
            Some(Value::Array(array)) => array,
            _ => return Err("expected a roots array".to_string()),
        },
        _ => return Err("expected a roots array".to_string()),
    };

    array
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            serde_json::from_value::<Root>(entry)
                .map_err(|e| format!("root #{idx} is invalid: {e}"))
        })
        .collect()
}

/// POST /config/roots - replace the workspace roots.
pub async fn post_roots(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let roots = parse_roots(body).map_err(ServerError::BadRequest)?;

    state.host.set_roots(roots).await.map_err(|e| match &e {
        switchboard_host::HostError::InvalidRoots { reason } => {
            ServerError::BadRequest(reason.clone())
        }
        _ => ServerError::Host(e),
    })?;

    Ok(Json(serde_json::json!({"roots": state.host.get_current_roots()})))
}
