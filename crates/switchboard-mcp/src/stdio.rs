//! Stdio-backed [`ServerConnection`] implementation.
//!
//! Spawns the configured server process and speaks framed JSON-RPC over its
//! stdio pipes. A background read loop correlates responses with pending
//! requests and hands server-initiated traffic (sampling requests, ping,
//! notifications) to the registered [`ConnectionObserver`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::time::Instant;

use crate::client::{
    ConnectParams, ConnectionObserver, Connector, ListChangedKind, ServerConnection,
};
use crate::config::{RequestOptions, ServerConfig, TransportConfig};
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    LoggingMessage, PromptInfo, ProgressUpdate, ReadResourceParams, ReadResourceResult,
    ResourceInfo, ResourceTemplateInfo, ServerCapabilities, ServerInfo, ToolInfo,
};
use crate::transport;

type PendingSender = oneshot::Sender<std::result::Result<Value, JsonRpcError>>;

/// Shared state between the connection handle and its read loop.
struct Inner {
    server_id: String,
    stdin: Mutex<ChildStdin>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingSender>>,
    /// Progress signals per in-flight request, keyed by the request id used
    /// as the progress token. The watch value counts received updates.
    progress: Mutex<HashMap<u64, (watch::Sender<u64>, crate::config::ProgressCallback)>>,
    observer: Arc<dyn ConnectionObserver>,
    /// Set when `close()` was requested locally.
    closing: AtomicBool,
}

impl Inner {
    async fn send(&self, message: &Value) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        transport::write_frame(&mut *stdin, message).await
    }

    async fn fail_pending(&self, reason: &str) {
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(JsonRpcError::internal(reason.to_string())));
        }
        self.progress.lock().await.clear();
    }
}

/// A connection to an MCP server reached over stdio.
pub struct StdioConnection {
    inner: Arc<Inner>,
    capabilities: ServerCapabilities,
    server_info: ServerInfo,
    child: Mutex<Child>,
}

impl StdioConnection {
    /// Spawn the server process, run the initialize handshake, and return a
    /// live connection.
    pub async fn connect(
        server_id: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: Option<&PathBuf>,
        params: ConnectParams,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<Self> {
        let cwd = transport::resolve_cwd(cwd.map(|p| p.as_path()));
        let child_env = transport::build_child_env(env, &cwd);
        let process = transport::spawn_stdio(command, args, &child_env, &cwd)?;

        let inner = Arc::new(Inner {
            server_id: server_id.to_string(),
            stdin: Mutex::new(process.stdin),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            progress: Mutex::new(HashMap::new()),
            observer,
            closing: AtomicBool::new(false),
        });

        tokio::spawn(read_loop(Arc::clone(&inner), process.stdout));

        let init_params = InitializeParams {
            protocol_version: params.protocol_version,
            capabilities: params.capabilities,
            client_info: params.host_info,
        };

        let connection = Self {
            inner,
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: server_id.to_string(),
                version: String::new(),
            },
            child: Mutex::new(process.child),
        };

        let result = connection
            .request(
                "initialize",
                Some(serde_json::to_value(&init_params)?),
                RequestOptions::with_timeout(Duration::from_secs(30)),
            )
            .await?;
        let init: InitializeResult = serde_json::from_value(result)?;

        connection
            .inner
            .send(&serde_json::to_value(JsonRpcNotification::new(
                "notifications/initialized",
                None,
            ))?)
            .await?;

        tracing::info!(
            server = %server_id,
            name = %init.server_info.name,
            version = %init.server_info.version,
            protocol = %init.protocol_version,
            "MCP server initialized"
        );

        Ok(Self {
            capabilities: init.capabilities,
            server_info: init.server_info,
            ..connection
        })
    }

    /// Server identity from the handshake.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        // Thread the request id through as the progress token so incoming
        // progress notifications can be matched back to this call.
        let params = match (&options.on_progress, params) {
            (Some(_), Some(Value::Object(mut map))) => {
                map.insert(
                    "_meta".to_string(),
                    serde_json::json!({"progressToken": id}),
                );
                Some(Value::Object(map))
            }
            (Some(_), None) => Some(serde_json::json!({"_meta": {"progressToken": id}})),
            (_, params) => params,
        };

        let mut progress_rx = None;
        if let Some(callback) = options.on_progress.clone() {
            let (ptx, prx) = watch::channel(0u64);
            progress_rx = Some(prx);
            self.inner.progress.lock().await.insert(id, (ptx, callback));
        }
        self.inner.pending.lock().await.insert(id, tx);

        let request = JsonRpcRequest::new(id, method, params);
        if let Err(e) = self.inner.send(&serde_json::to_value(&request)?).await {
            self.remove_in_flight(id).await;
            return Err(e);
        }

        let outcome = await_response(rx, &options, progress_rx).await;
        if !matches!(outcome, Ok(_)) {
            self.remove_in_flight(id).await;
        } else {
            self.inner.progress.lock().await.remove(&id);
        }

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(McpError::server_error(err)),
            Err(e) => Err(e),
        }
    }

    async fn remove_in_flight(&self, id: u64) {
        self.inner.pending.lock().await.remove(&id);
        self.inner.progress.lock().await.remove(&id);
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.inner
            .send(&serde_json::to_value(JsonRpcNotification::new(method, params))?)
            .await
    }
}

/// Wait for the response, honoring timeout, progress-reset, hard cap, and
/// cancellation.
async fn await_response(
    mut rx: oneshot::Receiver<std::result::Result<Value, JsonRpcError>>,
    options: &RequestOptions,
    mut progress_rx: Option<watch::Receiver<u64>>,
) -> Result<std::result::Result<Value, JsonRpcError>> {
    let started = Instant::now();
    let mut deadline = options.timeout.map(|t| started + t);
    let hard_deadline = options.max_total_timeout.map(|t| started + t);
    let cancellation = options.cancellation.clone();

    loop {
        let effective = match (deadline, hard_deadline) {
            (Some(soft), Some(hard)) => Some(soft.min(hard)),
            (Some(soft), None) => Some(soft),
            (None, hard) => hard,
        };

        tokio::select! {
            result = &mut rx => {
                return result.map_err(|_| McpError::ConnectionClosed(None));
            }
            _ = async {
                match &cancellation {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            } => {
                return Err(McpError::Cancelled);
            }
            changed = async {
                match &mut progress_rx {
                    Some(prx) => prx.changed().await.is_ok(),
                    None => std::future::pending().await,
                }
            }, if options.reset_timeout_on_progress && options.timeout.is_some() => {
                if changed && let Some(t) = options.timeout {
                    deadline = Some(Instant::now() + t);
                }
            }
            _ = async {
                match effective {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                return Err(McpError::Timeout);
            }
        }
    }
}

/// Background task: read frames until EOF, dispatching as they arrive.
async fn read_loop(inner: Arc<Inner>, mut stdout: BufReader<ChildStdout>) {
    let reason = loop {
        match transport::read_frame(&mut stdout).await {
            Ok(Some(message)) => dispatch(&inner, message).await,
            Ok(None) => break None,
            Err(e) => break Some(e),
        }
    };

    let closing = inner.closing.load(Ordering::SeqCst);
    inner
        .fail_pending(&format!(
            "connection to '{}' closed",
            inner.server_id
        ))
        .await;

    if closing {
        tracing::debug!(server = %inner.server_id, "stdio read loop finished after local close");
        inner.observer.connection_closed(&inner.server_id, None);
    } else {
        tracing::warn!(server = %inner.server_id, "MCP server closed the connection");
        inner.observer.connection_closed(
            &inner.server_id,
            Some(reason.unwrap_or(McpError::ConnectionClosed(Some(
                "server process exited".to_string(),
            )))),
        );
    }
}

async fn dispatch(inner: &Arc<Inner>, message: Value) {
    let has_method = message.get("method").and_then(Value::as_str).is_some();
    let has_id = message.get("id").is_some();

    match (has_method, has_id) {
        (true, true) => dispatch_server_request(inner, message).await,
        (true, false) => dispatch_notification(inner, message).await,
        (false, true) => dispatch_response(inner, message).await,
        (false, false) => {
            inner.observer.connection_error(
                &inner.server_id,
                McpError::protocol("frame is neither request, notification, nor response"),
            );
        }
    }
}

async fn dispatch_response(inner: &Arc<Inner>, message: Value) {
    let response: JsonRpcResponse = match serde_json::from_value(message) {
        Ok(r) => r,
        Err(e) => {
            inner
                .observer
                .connection_error(&inner.server_id, McpError::Json(e));
            return;
        }
    };

    let Some(id) = response.id.as_u64() else {
        inner.observer.connection_error(
            &inner.server_id,
            McpError::protocol("response id is not one we issued"),
        );
        return;
    };

    if let Some(tx) = inner.pending.lock().await.remove(&id) {
        let _ = tx.send(response.into_result());
    } else {
        tracing::debug!(server = %inner.server_id, id, "response for unknown request id");
    }
}

async fn dispatch_server_request(inner: &Arc<Inner>, message: Value) {
    let id = message.get("id").cloned().unwrap_or(Value::Null);
    let method = message
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = message.get("params").cloned().unwrap_or(Value::Null);

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let response = match method.as_str() {
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "sampling/createMessage" => {
                match inner.observer.sampling_request(&inner.server_id, params).await {
                    Ok(result) => match serde_json::to_value(&result) {
                        Ok(value) => JsonRpcResponse::success(id, value),
                        Err(e) => JsonRpcResponse::failure(id, JsonRpcError::internal(e.to_string())),
                    },
                    Err(err) => JsonRpcResponse::failure(id, err),
                }
            }
            other => JsonRpcResponse::failure(id, JsonRpcError::method_not_found(other)),
        };

        if let Ok(value) = serde_json::to_value(&response)
            && let Err(e) = inner.send(&value).await
        {
            tracing::warn!(server = %inner.server_id, error = %e, "failed to send response to server request");
        }
    });
}

async fn dispatch_notification(inner: &Arc<Inner>, message: Value) {
    let method = message
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let params = message.get("params").cloned().unwrap_or(Value::Null);

    match method {
        "notifications/tools/list_changed" => {
            inner
                .observer
                .list_changed(&inner.server_id, ListChangedKind::Tools);
        }
        "notifications/resources/list_changed" => {
            inner
                .observer
                .list_changed(&inner.server_id, ListChangedKind::Resources);
        }
        "notifications/prompts/list_changed" => {
            inner
                .observer
                .list_changed(&inner.server_id, ListChangedKind::Prompts);
        }
        "notifications/resources/updated" => {
            if let Some(uri) = params.get("uri").and_then(Value::as_str) {
                inner.observer.resource_updated(&inner.server_id, uri);
            }
        }
        "notifications/message" => match serde_json::from_value::<LoggingMessage>(params) {
            Ok(log) => inner.observer.log_message(&inner.server_id, log),
            Err(e) => inner
                .observer
                .connection_error(&inner.server_id, McpError::Json(e)),
        },
        "notifications/progress" => {
            let token = params.get("progressToken").and_then(Value::as_u64);
            let update = ProgressUpdate {
                progress: params
                    .get("progress")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
                total: params.get("total").and_then(Value::as_f64),
                message: params
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            };
            if let Some(token) = token
                && let Some((signal, callback)) = inner.progress.lock().await.get(&token)
            {
                signal.send_modify(|count| *count += 1);
                callback(update);
            }
        }
        other => {
            tracing::debug!(server = %inner.server_id, method = %other, "ignoring notification");
        }
    }
}

#[async_trait]
impl ServerConnection for StdioConnection {
    fn server_id(&self) -> &str {
        &self.inner.server_id
    }

    fn capabilities(&self) -> ServerCapabilities {
        self.capabilities.clone()
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
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
        self.inner.closing.store(true, Ordering::SeqCst);
        self.inner
            .fail_pending(&format!("connection to '{}' closing", self.inner.server_id))
            .await;

        let mut child = self.child.lock().await;
        let _ = child.kill().await;
        let _ = child.wait().await;

        tracing::info!(server = %self.inner.server_id, "stdio connection closed");
        Ok(())
    }
}

/// Default connector: stdio and streamable-HTTP are implemented, the other
/// transport kinds fail fast instead of hanging.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioConnector;

impl StdioConnector {
    /// Create a new connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for StdioConnector {
    async fn connect(
        &self,
        config: &ServerConfig,
        params: ConnectParams,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<Arc<dyn ServerConnection>> {
        match &config.transport {
            TransportConfig::Stdio {
                command,
                args,
                env,
                cwd,
            } => {
                let connection = StdioConnection::connect(
                    &config.id,
                    command,
                    args,
                    env,
                    cwd.as_ref(),
                    params,
                    observer,
                )
                .await?;
                Ok(Arc::new(connection))
            }
            TransportConfig::StreamableHttp { url, headers } => {
                let connection =
                    crate::http::HttpConnection::connect(&config.id, url, headers, params).await?;
                Ok(Arc::new(connection))
            }
            other => Err(McpError::unsupported_transport(other.kind())),
        }
    }
}
