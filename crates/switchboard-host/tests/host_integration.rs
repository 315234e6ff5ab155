//! Integration tests for the host engine against mock connections.

use std::sync::Arc;
use std::time::Duration;

use switchboard_host::{ErrorCode, HostConfig, HostEvent, McpHost};
use switchboard_mcp::mock::{MockConnection, MockConnector};
use switchboard_mcp::{
    CallToolParams, Connector, HostCapabilities, JsonRpcError, ListChangedKind, RequestOptions,
    Root, ServerConfig, ToolInfo,
};

fn server(id: &str) -> ServerConfig {
    ServerConfig::stdio(id, "unused-command")
}

fn sampling_capabilities() -> HostCapabilities {
    HostCapabilities {
        sampling: Some(serde_json::json!({})),
        ..Default::default()
    }
}

async fn drain_capability_updates(rx: &mut tokio::sync::broadcast::Receiver<HostEvent>) {
    while let Ok(event) =
        tokio::time::timeout(Duration::from_millis(200), rx.recv()).await
    {
        if matches!(event, Ok(HostEvent::CapabilitiesUpdated)) {
            return;
        }
    }
}

#[tokio::test]
async fn test_start_aggregates_all_servers() {
    let connector = Arc::new(MockConnector::new());
    connector.register(
        MockConnection::new("a")
            .with_tool("search")
            .with_resource("file:///a.txt", "a")
            .with_prompt("summarize"),
    );
    connector.register(
        MockConnection::new("b")
            .with_tool("search")
            .with_tool("fetch")
            .with_template("items", "mock://items/{id}"),
    );

    let host = McpHost::new(
        HostConfig::with_servers(vec![server("a"), server("b")]),
        connector,
    );
    host.start().await;

    // Union is the disjoint union of both listings.
    assert_eq!(host.get_tools().len(), 3);
    assert_eq!(host.get_resources().len(), 1);
    assert_eq!(host.get_resource_templates().len(), 1);
    assert_eq!(host.get_prompts().len(), 1);
    assert_eq!(host.connected_server_ids(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_start_is_idempotent_and_survives_failures() {
    let connector = Arc::new(MockConnector::new());
    connector.register(MockConnection::new("good").with_tool("works"));
    connector.fail_connect("bad", "refused to start");

    let host = McpHost::new(
        HostConfig::with_servers(vec![server("good"), server("bad")]),
        connector,
    );

    // Never fails, even with a broken server in the set.
    host.start().await;
    host.start().await;

    assert!(host.is_connected("good"));
    assert!(!host.is_connected("bad"));
    assert_eq!(host.get_tools().len(), 1);
}

#[tokio::test]
async fn test_duplicate_server_id_keeps_first() {
    let connector = Arc::new(MockConnector::new());
    connector.register(MockConnection::new("dup").with_tool("from-first"));

    let mut first = server("dup");
    first = first.with_name("first");
    let second = server("dup").with_name("second");

    let host = McpHost::new(HostConfig::with_servers(vec![first, second]), connector);
    host.start().await;

    assert_eq!(host.configured_server_ids(), vec!["dup"]);
    assert_eq!(host.get_tools().len(), 1);
}

#[tokio::test]
async fn test_disconnect_removes_exactly_its_entries() {
    let connector = Arc::new(MockConnector::new());
    connector.register(
        MockConnection::new("a")
            .with_tool("a-tool")
            .with_resource("file:///a.txt", "a"),
    );
    connector.register(
        MockConnection::new("b")
            .with_tool("b-tool")
            .with_resource("file:///b.txt", "b"),
    );

    let host = McpHost::new(
        HostConfig::with_servers(vec![server("a"), server("b")]),
        Arc::clone(&connector) as Arc<dyn Connector>,
    );
    host.start().await;
    assert_eq!(host.get_tools().len(), 2);

    let mut events = host.events();

    // Simulate server "a" dropping the connection.
    let observer = connector.observer("a").unwrap();
    observer.connection_closed("a", Some(switchboard_mcp::McpError::ConnectionClosed(None)));

    // serverDisconnected precedes the capabilitiesUpdated it causes.
    match events.recv().await.unwrap() {
        HostEvent::ServerDisconnected { server_id, error } => {
            assert_eq!(server_id, "a");
            assert!(error.is_some());
        }
        other => panic!("expected ServerDisconnected, got {other:?}"),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        HostEvent::CapabilitiesUpdated
    ));

    let tools = host.get_tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].server_id, "b");
    assert_eq!(host.get_resources().len(), 1);
    assert!(!host.is_connected("a"));
    assert!(host.is_connected("b"));
}

#[tokio::test]
async fn test_list_changed_triggers_refresh() {
    let connector = Arc::new(MockConnector::new());
    let connection = connector.register(MockConnection::new("a").with_tool("old"));

    let host = McpHost::new(HostConfig::with_servers(vec![server("a")]), Arc::clone(&connector) as Arc<dyn Connector>);
    host.start().await;
    assert_eq!(host.get_tools()[0].name, "old");

    connection.set_tools(vec![ToolInfo {
        name: "new".to_string(),
        description: None,
        input_schema: None,
        annotations: None,
    }]);

    let mut events = host.events();
    let observer = connector.observer("a").unwrap();
    observer.list_changed("a", ListChangedKind::Tools);
    drain_capability_updates(&mut events).await;

    let tools = host.get_tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "new");
}

#[tokio::test]
async fn test_call_tool_unknown_server() {
    let host = McpHost::new(HostConfig::default(), Arc::new(MockConnector::new()));
    host.start().await;

    let err = host
        .call_tool(
            "ghost",
            CallToolParams {
                name: "x".to_string(),
                arguments: None,
            },
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ServerNotFound);
}

#[tokio::test]
async fn test_protocol_error_propagates_verbatim() {
    let connector = Arc::new(MockConnector::new());
    let connection = connector.register(MockConnection::new("a").with_tool("boom"));
    connection.fail_tool_calls(JsonRpcError::new(-32602, "bad arguments"));

    let host = McpHost::new(HostConfig::with_servers(vec![server("a")]), connector);
    host.start().await;

    let err = host
        .call_tool(
            "a",
            CallToolParams {
                name: "boom".to_string(),
                arguments: None,
            },
            RequestOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Protocol);
    assert_eq!(err.jsonrpc_error().code, -32602);
    assert_eq!(err.jsonrpc_error().message, "bad arguments");
}

#[tokio::test]
async fn test_subscription_failure_is_wrapped() {
    let connector = Arc::new(MockConnector::new());
    let connection = connector.register(MockConnection::new("a"));
    connection.fail_subscriptions();

    let host = McpHost::new(HostConfig::with_servers(vec![server("a")]), connector);
    host.start().await;

    let err = host
        .subscribe_resource("a", "file:///x.txt")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SubscriptionFailed);
    assert_eq!(err.server_id(), Some("a"));
}

#[tokio::test]
async fn test_set_roots_notifies_only_interested_servers() {
    let connector = Arc::new(MockConnector::new());
    let wants = connector.register(MockConnection::new("wants").with_roots_list_changed());
    let ignores = connector.register(MockConnection::new("ignores"));

    let host = McpHost::new(
        HostConfig::with_servers(vec![server("wants"), server("ignores")]),
        connector,
    );
    host.start().await;

    host.set_roots(vec![Root {
        uri: "file:///workspace".to_string(),
        name: "workspace".to_string(),
    }])
    .await
    .unwrap();

    assert_eq!(wants.roots_notification_count(), 1);
    assert_eq!(ignores.roots_notification_count(), 0);
}

#[tokio::test]
async fn test_set_roots_atomic_even_when_notifications_fail() {
    let connector = Arc::new(MockConnector::new());
    let failing = connector.register(MockConnection::new("failing").with_roots_list_changed());
    failing.fail_roots_notifications();

    let host = McpHost::new(HostConfig::with_servers(vec![server("failing")]), connector);
    host.start().await;

    let roots = vec![Root {
        uri: "file:///workspace".to_string(),
        name: "workspace".to_string(),
    }];
    let err = host.set_roots(roots.clone()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Aggregate);

    // The new list is still in place.
    assert_eq!(host.get_current_roots(), roots);
}

#[tokio::test]
async fn test_set_roots_validation() {
    let host = McpHost::new(HostConfig::default(), Arc::new(MockConnector::new()));

    let err = host
        .set_roots(vec![Root {
            uri: String::new(),
            name: "bad".to_string(),
        }])
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::RootsUpdateFailed);
    assert!(host.get_current_roots().is_empty());
}

#[tokio::test]
async fn test_new_connection_receives_existing_roots() {
    let connector = Arc::new(MockConnector::new());
    let connection = connector.register(MockConnection::new("late").with_roots_list_changed());

    let host = McpHost::new(HostConfig::with_servers(vec![server("late")]), connector);

    // Roots set before start: the connect path must announce them.
    host.set_roots(vec![Root {
        uri: "file:///workspace".to_string(),
        name: "workspace".to_string(),
    }])
    .await
    .unwrap();
    host.start().await;

    assert_eq!(connection.roots_notification_count(), 1);
}

#[tokio::test]
async fn test_sampling_without_capability_is_refused() {
    let connector = Arc::new(MockConnector::new());
    connector.register(MockConnection::new("a"));

    // Host does not declare sampling.
    let host = McpHost::new(HostConfig::with_servers(vec![server("a")]), Arc::clone(&connector) as Arc<dyn Connector>);
    host.start().await;

    let observer = connector.observer("a").unwrap();
    let err = observer
        .sampling_request("a", serde_json::json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code, JsonRpcError::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_sampling_with_local_handler() {
    let connector = Arc::new(MockConnector::new());
    connector.register(MockConnection::new("a"));

    let mut config = HostConfig::with_servers(vec![server("a")]);
    config.host_capabilities = sampling_capabilities();

    let host = McpHost::new(config, Arc::clone(&connector) as Arc<dyn Connector>);
    host.set_sampling_handler(|server_id, _params| async move {
        Ok(switchboard_host::SamplingReply {
            content: serde_json::Value::String(format!("handled for {server_id}")),
            model: Some("local".to_string()),
            stop_reason: None,
            usage: None,
        })
    });
    host.start().await;

    let observer = connector.observer("a").unwrap();
    let result = observer
        .sampling_request("a", serde_json::json!({"messages": []}))
        .await
        .unwrap();
    assert_eq!(result.role, "assistant");
    assert_eq!(result.content["text"], "handled for a");
}

#[tokio::test]
async fn test_sampling_without_sink_or_handler_fails() {
    let connector = Arc::new(MockConnector::new());
    connector.register(MockConnection::new("a"));

    let mut config = HostConfig::with_servers(vec![server("a")]);
    config.host_capabilities = sampling_capabilities();

    let host = McpHost::new(config, Arc::clone(&connector) as Arc<dyn Connector>);
    host.start().await;

    let observer = connector.observer("a").unwrap();
    let err = observer
        .sampling_request("a", serde_json::json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code, JsonRpcError::INTERNAL_ERROR);
    assert!(err.message.contains("no active client"));
}

#[tokio::test]
async fn test_stop_clears_state_and_closes_connections() {
    let connector = Arc::new(MockConnector::new());
    let connection = connector.register(MockConnection::new("a").with_tool("x"));

    let host = McpHost::new(HostConfig::with_servers(vec![server("a")]), connector);
    host.start().await;
    assert_eq!(host.get_tools().len(), 1);

    host.stop().await;
    host.stop().await;

    assert!(connection.is_closed());
    assert!(host.get_tools().is_empty());
    assert!(host.connected_server_ids().is_empty());
}

#[tokio::test]
async fn test_suggestions_track_aggregated_state() {
    let connector = Arc::new(MockConnector::new());
    connector.register(
        MockConnection::new("files")
            .with_tool("read_file")
            .with_resource("file:///readme.md", "readme")
            .with_template("dynamic", "file:///dynamic/{id}.txt")
            .with_prompt("review"),
    );

    let host = McpHost::new(HostConfig::with_servers(vec![server("files")]), connector);
    host.start().await;

    let exact = host.suggest_server_for_uri("file:///readme.md");
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].confidence, 1.0);

    let template = host.suggest_server_for_uri("file:///dynamic/42.txt");
    assert_eq!(template.len(), 1);
    assert_eq!(template[0].confidence, 0.8);

    let scheme = host.suggest_server_for_uri("file:///elsewhere.txt");
    assert_eq!(scheme.len(), 1);
    assert_eq!(scheme[0].confidence, 0.5);

    assert_eq!(host.suggest_server_for_tool("read_file").len(), 1);
    assert_eq!(host.suggest_server_for_prompt("review").len(), 1);
    assert!(host.suggest_server_for_uri("ftp://nowhere/x").is_empty());
}
