//! Streamable-HTTP-backed [`ServerConnection`] implementation.
//!
//! Each request is POSTed to the configured endpoint and the response body
//! is the JSON-RPC response. The server's `Mcp-Session-Id` from the
//! initialize exchange is echoed on every subsequent request. This client
//! does not hold a server-push stream open, so servers behind it cannot
//! originate sampling requests or notifications.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::client::{ConnectParams, ServerConnection};
use crate::config::RequestOptions;
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, InitializeParams,
    InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, PromptInfo,
    ReadResourceParams, ReadResourceResult, ResourceInfo, ResourceTemplateInfo,
    ServerCapabilities, ServerInfo,
};

/// Header carrying the server-assigned session id.
const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Default per-request timeout when the caller does not set one.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A connection to an MCP server reached over streamable HTTP.
pub struct HttpConnection {
    server_id: String,
    url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
    next_id: AtomicU64,
    session_id: Mutex<Option<String>>,
    capabilities: ServerCapabilities,
    server_info: ServerInfo,
}

impl HttpConnection {
    /// Connect and run the initialize handshake.
    pub async fn connect(
        server_id: &str,
        url: &str,
        headers: &HashMap<String, String>,
        params: ConnectParams,
    ) -> Result<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| McpError::transport(format!("invalid URL '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(McpError::transport(format!(
                "unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {e}")))?;

        let mut connection = Self {
            server_id: server_id.to_string(),
            url: url.to_string(),
            headers: headers.clone(),
            client,
            next_id: AtomicU64::new(1),
            session_id: Mutex::new(None),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: server_id.to_string(),
                version: String::new(),
            },
        };

        let init_params = InitializeParams {
            protocol_version: params.protocol_version,
            capabilities: params.capabilities,
            client_info: params.host_info,
        };
        let result = connection
            .request(
                "initialize",
                Some(serde_json::to_value(&init_params)?),
                RequestOptions::default(),
            )
            .await?;
        let init: InitializeResult = serde_json::from_value(result)?;

        connection
            .notify("notifications/initialized", None)
            .await?;

        tracing::info!(
            server = %server_id,
            url = %connection.url,
            name = %init.server_info.name,
            protocol = %init.protocol_version,
            "MCP server initialized over HTTP"
        );

        connection.capabilities = init.capabilities;
        connection.server_info = init.server_info;
        Ok(connection)
    }

    async fn post(&self, body: String, timeout: Duration) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .post(&self.url)
            .timeout(timeout)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(body);

        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(session) = self.session_id.lock().await.as_deref() {
            req = req.header(SESSION_HEADER, session);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                McpError::Timeout
            } else {
                McpError::transport(format!("HTTP request failed: {e}"))
            }
        })?;

        if !response.status().is_success() {
            return Err(McpError::transport(format!(
                "HTTP error {} from {}",
                response.status(),
                self.url
            )));
        }

        // Adopt the session id the server hands out on initialize.
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut slot = self.session_id.lock().await;
            if slot.as_deref() != Some(session) {
                *slot = Some(session.to_string());
            }
        }

        Ok(response)
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let body = serde_json::to_string(&request)?;
        let timeout = options.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let exchange = async {
            let response = self.post(body, timeout).await?;
            let text = response
                .text()
                .await
                .map_err(|e| McpError::transport(format!("failed to read response body: {e}")))?;
            let parsed: JsonRpcResponse = serde_json::from_str(&text)?;
            parsed.into_result().map_err(McpError::server_error)
        };

        match options.cancellation {
            Some(token) => {
                tokio::select! {
                    result = exchange => result,
                    _ = token.cancelled() => Err(McpError::Cancelled),
                }
            }
            None => exchange.await,
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        let body = serde_json::to_string(&notification)?;
        // Response body for a notification carries nothing useful.
        let _ = self.post(body, DEFAULT_REQUEST_TIMEOUT).await?;
        Ok(())
    }
}

#[async_trait]
impl ServerConnection for HttpConnection {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    fn capabilities(&self) -> ServerCapabilities {
        self.capabilities.clone()
    }

    async fn list_tools(&self) -> Result<Vec<crate::protocol::ToolInfo>> {
        let result = self
            .request("tools/list", None, RequestOptions::default())
            .await?;
        let list: ListToolsResult = serde_json::from_value(result)?;
        Ok(list.tools)
    }

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>> {
        let result = self
            .request("resources/list", None, RequestOptions::default())
            .await?;
        let list: ListResourcesResult = serde_json::from_value(result)?;
        Ok(list.resources)
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateInfo>> {
        let result = self
            .request("resources/templates/list", None, RequestOptions::default())
            .await?;
        let list: ListResourceTemplatesResult = serde_json::from_value(result)?;
        Ok(list.resource_templates)
    }

    async fn list_prompts(&self) -> Result<Vec<PromptInfo>> {
        let result = self
            .request("prompts/list", None, RequestOptions::default())
            .await?;
        let list: ListPromptsResult = serde_json::from_value(result)?;
        Ok(list.prompts)
    }

    async fn call_tool(
        &self,
        params: CallToolParams,
        options: RequestOptions,
    ) -> Result<CallToolResult> {
        let result = self
            .request("tools/call", Some(serde_json::to_value(&params)?), options)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn read_resource(
        &self,
        params: ReadResourceParams,
        options: RequestOptions,
    ) -> Result<ReadResourceResult> {
        let result = self
            .request("resources/read", Some(serde_json::to_value(&params)?), options)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn get_prompt(
        &self,
        params: GetPromptParams,
        options: RequestOptions,
    ) -> Result<GetPromptResult> {
        let result = self
            .request("prompts/get", Some(serde_json::to_value(&params)?), options)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn subscribe_resource(&self, uri: &str) -> Result<()> {
        self.request(
            "resources/subscribe",
            Some(serde_json::json!({"uri": uri})),
            RequestOptions::default(),
        )
        .await?;
        Ok(())
    }

    async fn unsubscribe_resource(&self, uri: &str) -> Result<()> {
        self.request(
            "resources/unsubscribe",
            Some(serde_json::json!({"uri": uri})),
            RequestOptions::default(),
        )
        .await?;
        Ok(())
    }

    async fn notify_roots_changed(&self) -> Result<()> {
        self.notify("notifications/roots/list_changed", None).await
    }

    async fn close(&self) -> Result<()> {
        // Best-effort: tell the server to drop the session.
        if self.session_id.lock().await.is_some() {
            let mut req = self.client.delete(&self.url);
            for (key, value) in &self.headers {
                req = req.header(key, value);
            }
            if let Some(session) = self.session_id.lock().await.as_deref() {
                req = req.header(SESSION_HEADER, session);
            }
            let _ = req.send().await;
        }
        Ok(())
    }
}
