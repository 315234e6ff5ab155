//! Integration tests for the HTTP bridge.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;

use switchboard_host::{HostConfig, McpHost};
use switchboard_mcp::ServerConfig;
use switchboard_mcp::mock::{MockConnection, MockConnector};
use switchboard_server::{BridgeConfig, Server};

async fn app_with_servers(servers: Vec<(&str, MockConnection)>) -> Router {
    app_with_config(servers, BridgeConfig::default()).await
}

async fn app_with_config(
    servers: Vec<(&str, MockConnection)>,
    config: BridgeConfig,
) -> Router {
    let connector = Arc::new(MockConnector::new());
    let mut server_configs = Vec::new();
    for (id, connection) in servers {
        connector.register(connection);
        server_configs.push(ServerConfig::stdio(id, "unused"));
    }

    let host = McpHost::new(HostConfig::with_servers(server_configs), connector);
    host.start().await;

    Server::new(host, config).router()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_mcp(body: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("Content-Type", "application/json");
    if let Some(session) = session {
        builder = builder.header("Mcp-Session-Id", session);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn initialize(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(post_mcp(
            r#"{"jsonrpc":"2.0","id":"1","method":"initialize"}"#,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response
        .headers()
        .get("Mcp-Session-Id")
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Initialize + listing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_initialize_then_list_tools() {
    let app =
        app_with_servers(vec![("files", MockConnection::new("files").with_tool("read_file"))])
            .await;

    let response = app
        .clone()
        .oneshot(post_mcp(
            r#"{"jsonrpc":"2.0","id":"1","method":"initialize"}"#,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get("Mcp-Session-Id")
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string();
    // Session ids are UUIDs.
    assert!(uuid::Uuid::parse_str(&session_id).is_ok());

    let body = body_json(response).await;
    assert_eq!(body["id"], "1");
    assert_eq!(body["result"]["protocolVersion"], "2025-03-26");
    assert!(body["result"]["serverInfo"]["name"].is_string());

    let response = app
        .clone()
        .oneshot(post_mcp(
            r#"{"jsonrpc":"2.0","id":"2","method":"tools/list"}"#,
            Some(&session_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let tools = body["result"].as_array().expect("tools array");
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "read_file");
    assert_eq!(tools[0]["serverId"], "files");
}

#[tokio::test]
async fn test_initialize_with_existing_session_rejected() {
    let app = app_with_servers(vec![]).await;
    let session_id = initialize(&app).await;

    let response = app
        .clone()
        .oneshot(post_mcp(
            r#"{"jsonrpc":"2.0","id":"1","method":"initialize"}"#,
            Some(&session_id),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn test_request_without_session_rejected() {
    let app = app_with_servers(vec![]).await;

    let response = app
        .clone()
        .oneshot(post_mcp(
            r#"{"jsonrpc":"2.0","id":"1","method":"tools/list"}"#,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn test_request_with_unknown_session_rejected() {
    let app = app_with_servers(vec![]).await;

    let response = app
        .clone()
        .oneshot(post_mcp(
            r#"{"jsonrpc":"2.0","id":"1","method":"tools/list"}"#,
            Some("not-a-session"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn test_method_not_found() {
    let app = app_with_servers(vec![]).await;
    let session_id = initialize(&app).await;

    let response = app
        .clone()
        .oneshot(post_mcp(
            r#"{"jsonrpc":"2.0","id":"1","method":"no/such/method"}"#,
            Some(&session_id),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn test_invalid_json_is_parse_error() {
    let app = app_with_servers(vec![]).await;

    let response = app
        .clone()
        .oneshot(post_mcp("{not json", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32700);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool calls through the JSON-RPC surface
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_call_tool_via_server_method() {
    let app =
        app_with_servers(vec![("files", MockConnection::new("files").with_tool("read_file"))])
            .await;
    let session_id = initialize(&app).await;

    let response = app
        .clone()
        .oneshot(post_mcp(
            r#"{"jsonrpc":"2.0","id":"9","method":"servers/files/tools/read_file/call","params":{"path":"/etc/hosts"}}"#,
            Some(&session_id),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], "9");
    assert_eq!(body["result"]["content"][0]["text"], "called read_file");
}

#[tokio::test]
async fn test_call_tool_on_unknown_server_is_internal_error() {
    let app = app_with_servers(vec![]).await;
    let session_id = initialize(&app).await;

    let response = app
        .clone()
        .oneshot(post_mcp(
            r#"{"jsonrpc":"2.0","id":"9","method":"servers/ghost/tools/x/call","params":{}}"#,
            Some(&session_id),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32603);
    assert_eq!(body["error"]["data"]["code"], "SERVER_NOT_FOUND");
}

#[tokio::test]
async fn test_read_resource_requires_uri_param() {
    let app = app_with_servers(vec![("files", MockConnection::new("files"))]).await;
    let session_id = initialize(&app).await;

    let response = app
        .clone()
        .oneshot(post_mcp(
            r#"{"jsonrpc":"2.0","id":"9","method":"servers/files/resource/read","params":{}}"#,
            Some(&session_id),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32602);
}

// ─────────────────────────────────────────────────────────────────────────────
// Batches
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_batch_with_requests_and_notifications() {
    let app = app_with_servers(vec![("files", MockConnection::new("files").with_tool("t"))]).await;
    let session_id = initialize(&app).await;

    let batch = r#"[
        {"jsonrpc":"2.0","id":"1","method":"tools/list"},
        {"jsonrpc":"2.0","method":"notifications/whatever"},
        {"jsonrpc":"2.0","id":"2","method":"resources/list"}
    ]"#;

    let response = app
        .clone()
        .oneshot(post_mcp(batch, Some(&session_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let responses = body.as_array().expect("batch array");
    assert_eq!(responses.len(), 2);
    let mut ids: Vec<&str> = responses
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test]
async fn test_batch_of_only_notifications_is_accepted() {
    let app = app_with_servers(vec![]).await;
    let session_id = initialize(&app).await;

    let batch = r#"[
        {"jsonrpc":"2.0","method":"notifications/a"},
        {"jsonrpc":"2.0","method":"notifications/b"}
    ]"#;

    let response = app
        .clone()
        .oneshot(post_mcp(batch, Some(&session_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_empty_batch_rejected() {
    let app = app_with_servers(vec![]).await;
    let response = app.clone().oneshot(post_mcp("[]", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ─────────────────────────────────────────────────────────────────────────────
// Session lifecycle over HTTP
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_session() {
    let app = app_with_servers(vec![]).await;
    let session_id = initialize(&app).await;

    let delete = |sid: &str| {
        Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .header("Mcp-Session-Id", sid)
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(delete(&session_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Deleting again finds nothing.
    let response = app.clone().oneshot(delete(&session_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The id no longer works for requests.
    let response = app
        .clone()
        .oneshot(post_mcp(
            r#"{"jsonrpc":"2.0","id":"1","method":"tools/list"}"#,
            Some(&session_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nor for the SSE stream.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/mcp")
                .header("Mcp-Session-Id", &session_id)
                .header("Accept", "text/event-stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_without_header_is_bad_request() {
    let app = app_with_servers(vec![]).await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/mcp")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE stream
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_mcp_requires_event_stream_accept() {
    let app = app_with_servers(vec![]).await;
    let session_id = initialize(&app).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/mcp")
                .header("Mcp-Session-Id", &session_id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_mcp_opens_stream_with_initial_state() {
    let app = app_with_servers(vec![("files", MockConnection::new("files").with_tool("t"))]).await;
    let session_id = initialize(&app).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/mcp")
                .header("Mcp-Session-Id", &session_id)
                .header("Accept", "text/event-stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    // The first frame is the initialState snapshot.
    use futures::StreamExt;
    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    let text = String::from_utf8(first.to_vec()).unwrap();
    assert!(text.contains("event: initialState"));
    assert!(text.contains("\"tools\""));
}

// ─────────────────────────────────────────────────────────────────────────────
// Authentication
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_auth_required_rejects_missing_and_wrong_keys() {
    let config = BridgeConfig::default().with_api_keys(vec!["secret-key".to_string()]);
    let app = app_with_config(vec![], config).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/status")
                .header("X-API-Key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/status")
                .header("X-API-Key", "secret-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ─────────────────────────────────────────────────────────────────────────────
// Views
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_status_and_servers_views() {
    let app = app_with_servers(vec![("files", MockConnection::new("files"))]).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["servers"]["connected"], 1);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/servers").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body[0]["id"], "files");
    assert_eq!(body[0]["connected"], true);
}

#[tokio::test]
async fn test_suggest_views() {
    let app = app_with_servers(vec![(
        "files",
        MockConnection::new("files")
            .with_resource("file:///readme.md", "readme")
            .with_tool("read_file"),
    )])
    .await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/suggest/resource?uri=file:///readme.md")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["suggestions"][0]["matchType"], "exact");
    assert_eq!(body["suggestions"][0]["confidence"], 1.0);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/suggest/tool?name=read_file")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["suggestions"][0]["serverId"], "files");
}

// ─────────────────────────────────────────────────────────────────────────────
// Roots
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_roots_round_trip() {
    let app = app_with_servers(vec![]).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/config/roots")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"roots":[{"uri":"file:///workspace","name":"workspace"}]}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/config/roots")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["roots"][0]["uri"], "file:///workspace");
}

#[tokio::test]
async fn test_roots_validation_failure_is_bad_request() {
    let app = app_with_servers(vec![]).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/config/roots")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"roots":[{"uri":"file:///x"}]}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ─────────────────────────────────────────────────────────────────────────────
// Sampling return leg over HTTP
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sampling_response_unknown_id_discarded() {
    let app = app_with_servers(vec![]).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp/sampling_response")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"requestId":"nope","result":{"role":"assistant","content":{"type":"text","text":"hi"}}}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["accepted"], false);
}

#[tokio::test]
async fn test_sampling_error_unknown_id_discarded() {
    let app = app_with_servers(vec![]).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp/sampling_error")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"requestId":"nope","error":{"code":-1,"message":"denied"}}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["accepted"], false);
}
