//! JSON-RPC message classification and method dispatch.
//!
//! The POST handler in `routes::mcp` feeds each body element through
//! [`classify`]; requests land in [`dispatch_request`], which translates
//! the recognized methods into host calls and shapes JSON-RPC responses.

use serde_json::Value;

use switchboard_mcp::{
    CallToolParams, GetPromptParams, JsonRpcError, JsonRpcResponse, MCP_PROTOCOL_VERSION,
    ReadResourceParams, RequestOptions,
};

use crate::state::AppState;

/// One classified JSON-RPC body element.
#[derive(Debug)]
pub enum RpcMessage {
    /// A request: string method and a non-null id.
    Request {
        /// Request id, echoed into the response.
        id: Value,
        /// Method name.
        method: String,
        /// Parameters (Null when absent).
        params: Value,
    },
    /// A notification: string method, no id.
    Notification {
        /// Method name.
        method: String,
    },
    /// A response: id plus result or error.
    Response,
    /// None of the above.
    Malformed,
}

/// Classify one body element.
pub fn classify(value: &Value) -> RpcMessage {
    let Some(obj) = value.as_object() else {
        return RpcMessage::Malformed;
    };

    let method = obj.get("method").and_then(Value::as_str);
    let id = obj.get("id");
    let has_payload = obj.contains_key("result") || obj.contains_key("error");

    match (method, id) {
        (Some(method), Some(id)) if !id.is_null() => RpcMessage::Request {
            id: id.clone(),
            method: method.to_string(),
            params: obj.get("params").cloned().unwrap_or(Value::Null),
        },
        (Some(method), _) => RpcMessage::Notification {
            method: method.to_string(),
        },
        (None, Some(_)) if has_payload => RpcMessage::Response,
        _ => RpcMessage::Malformed,
    }
}

/// The initialize result for a freshly created session.
pub fn initialize_result(state: &AppState) -> Value {
    serde_json::json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": state.host.host_capabilities(),
        "serverInfo": state.host.host_info(),
    })
}

/// Dispatch one recognized request method to the host.
pub async fn dispatch_request(
    state: &AppState,
    id: Value,
    method: &str,
    params: Value,
) -> JsonRpcResponse {
    match method {
        "tools/list" => {
            let tools = state.host.get_tools();
            respond(id, serde_json::to_value(tools))
        }
        "resources/list" => {
            let resources = state.host.get_resources();
            respond(id, serde_json::to_value(resources))
        }
        "resources/templates/list" => {
            let templates = state.host.get_resource_templates();
            respond(id, serde_json::to_value(templates))
        }
        "prompts/list" => {
            let prompts = state.host.get_prompts();
            respond(id, serde_json::to_value(prompts))
        }
        _ => match parse_server_method(method) {
            Some(ServerMethod::CallTool { server_id, name }) => {
                let result = state
                    .host
                    .call_tool(
                        &server_id,
                        CallToolParams {
                            name,
                            arguments: nullable(params),
                        },
                        RequestOptions::default(),
                    )
                    .await;
                match result {
                    Ok(value) => respond(id, serde_json::to_value(value)),
                    Err(e) => JsonRpcResponse::failure(id, e.jsonrpc_error()),
                }
            }
            Some(ServerMethod::ReadResource { server_id }) => {
                let params: ReadResourceParams = match serde_json::from_value(params) {
                    Ok(params) => params,
                    Err(e) => {
                        return JsonRpcResponse::failure(
                            id,
                            JsonRpcError::new(
                                JsonRpcError::INVALID_PARAMS,
                                format!("invalid params: {e}"),
                            ),
                        );
                    }
                };
                match state
                    .host
                    .read_resource(&server_id, params, RequestOptions::default())
                    .await
                {
                    Ok(value) => respond(id, serde_json::to_value(value)),
                    Err(e) => JsonRpcResponse::failure(id, e.jsonrpc_error()),
                }
            }
            Some(ServerMethod::GetPrompt { server_id }) => {
                let params: GetPromptParams = match serde_json::from_value(params) {
                    Ok(params) => params,
                    Err(e) => {
                        return JsonRpcResponse::failure(
                            id,
                            JsonRpcError::new(
                                JsonRpcError::INVALID_PARAMS,
                                format!("invalid params: {e}"),
                            ),
                        );
                    }
                };
                match state
                    .host
                    .get_prompt(&server_id, params, RequestOptions::default())
                    .await
                {
                    Ok(value) => respond(id, serde_json::to_value(value)),
                    Err(e) => JsonRpcResponse::failure(id, e.jsonrpc_error()),
                }
            }
            None => JsonRpcResponse::failure(id, JsonRpcError::method_not_found(method)),
        },
    }
}

/// HTTP status for a single-request response.
///
/// Successes are 200. Method-not-found and invalid-params map to 400,
/// as do the invalid-request errors from session gating; everything else
/// is a 500.
pub fn status_for_response(response: &JsonRpcResponse) -> axum::http::StatusCode {
    use axum::http::StatusCode;

    match &response.error {
        None => StatusCode::OK,
        Some(error) => match error.code {
            JsonRpcError::METHOD_NOT_FOUND
            | JsonRpcError::INVALID_PARAMS
            | JsonRpcError::INVALID_REQUEST
            | JsonRpcError::PARSE_ERROR => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

enum ServerMethod {
    CallTool { server_id: String, name: String },
    ReadResource { server_id: String },
    GetPrompt { server_id: String },
}

/// Parse the `servers/{serverId}/...` method family.
fn parse_server_method(method: &str) -> Option<ServerMethod> {
    let rest = method.strip_prefix("servers/")?;
    let (server_id, tail) = rest.split_once('/')?;
    if server_id.is_empty() {
        return None;
    }

    if let Some(tool_tail) = tail.strip_prefix("tools/") {
        let name = tool_tail.strip_suffix("/call")?;
        if name.is_empty() || name.contains('/') {
            return None;
        }
        return Some(ServerMethod::CallTool {
            server_id: server_id.to_string(),
            name: name.to_string(),
        });
    }

    match tail {
        "resource/read" => Some(ServerMethod::ReadResource {
            server_id: server_id.to_string(),
        }),
        "prompt/get" => Some(ServerMethod::GetPrompt {
            server_id: server_id.to_string(),
        }),
        _ => None,
    }
}

fn respond(id: Value, result: serde_json::Result<Value>) -> JsonRpcResponse {
    match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::failure(id, JsonRpcError::internal(e.to_string())),
    }
}

fn nullable(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_request() {
        let msg = classify(&serde_json::json!({"jsonrpc": "2.0", "id": "1", "method": "tools/list"}));
        assert!(matches!(msg, RpcMessage::Request { .. }));

        let msg = classify(&serde_json::json!({"jsonrpc": "2.0", "id": 7, "method": "x", "params": {}}));
        match msg {
            RpcMessage::Request { id, method, params } => {
                assert_eq!(id, serde_json::json!(7));
                assert_eq!(method, "x");
                assert_eq!(params, serde_json::json!({}));
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_notification() {
        let msg = classify(&serde_json::json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
        assert!(matches!(msg, RpcMessage::Notification { .. }));

        // A null id is treated as id-less.
        let msg = classify(&serde_json::json!({"jsonrpc": "2.0", "id": null, "method": "x"}));
        assert!(matches!(msg, RpcMessage::Notification { .. }));
    }

    #[test]
    fn test_classify_response_and_malformed() {
        let msg = classify(&serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
        assert!(matches!(msg, RpcMessage::Response));

        let msg = classify(&serde_json::json!({"jsonrpc": "2.0", "id": 1, "error": {"code": 1, "message": "x"}}));
        assert!(matches!(msg, RpcMessage::Response));

        assert!(matches!(
            classify(&serde_json::json!({"jsonrpc": "2.0", "id": 1})),
            RpcMessage::Malformed
        ));
        assert!(matches!(classify(&serde_json::json!("nope")), RpcMessage::Malformed));
        assert!(matches!(classify(&serde_json::json!(42)), RpcMessage::Malformed));
    }

    #[test]
    fn test_parse_server_methods() {
        match parse_server_method("servers/files/tools/read_file/call") {
            Some(ServerMethod::CallTool { server_id, name }) => {
                assert_eq!(server_id, "files");
                assert_eq!(name, "read_file");
            }
            _ => panic!("expected call-tool method"),
        }

        assert!(matches!(
            parse_server_method("servers/files/resource/read"),
            Some(ServerMethod::ReadResource { .. })
        ));
        assert!(matches!(
            parse_server_method("servers/files/prompt/get"),
            Some(ServerMethod::GetPrompt { .. })
        ));

        assert!(parse_server_method("servers//tools/x/call").is_none());
        assert!(parse_server_method("servers/files/tools//call").is_none());
        assert!(parse_server_method("servers/files/other").is_none());
        assert!(parse_server_method("tools/list").is_none());
    }

    #[test]
    fn test_status_mapping() {
        use axum::http::StatusCode;

        let ok = JsonRpcResponse::success(serde_json::json!(1), serde_json::json!([]));
        assert_eq!(status_for_response(&ok), StatusCode::OK);

        let not_found = JsonRpcResponse::failure(
            serde_json::json!(1),
            JsonRpcError::method_not_found("nope"),
        );
        assert_eq!(status_for_response(&not_found), StatusCode::BAD_REQUEST);

        let internal =
            JsonRpcResponse::failure(serde_json::json!(1), JsonRpcError::internal("boom"));
        assert_eq!(
            status_for_response(&internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
