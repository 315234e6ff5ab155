//! The host engine.
//!
//! Owns every live server connection, drives connect/disconnect, keeps the
//! aggregated capability index current, and routes invocations to the
//! right server. All shared state lives behind short-lived locks; nothing
//! is held across an await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use async_trait::async_trait;
use serde_json::Value;

use switchboard_mcp::{
    CallToolParams, CallToolResult, ConnectParams, ConnectionObserver, Connector,
    CreateMessageResult, GetPromptParams, GetPromptResult, JsonRpcError, ListChangedKind,
    LoggingMessage, MCP_PROTOCOL_VERSION, McpError, ReadResourceParams, ReadResourceResult,
    RequestOptions, Root, ServerCapabilities, ServerConfig, ServerConnection,
};

use crate::aggregate::{
    AggregatedPrompt, AggregatedResource, AggregatedResourceTemplate, AggregatedTool,
    CapabilityIndex,
};
use crate::config::HostConfig;
use crate::error::{HostError, Result, wrap_operation_error};
use crate::events::EventBus;
use crate::resolver::{self, Suggestion};
use crate::sampling::SamplingBroker;

/// The multi-connection MCP host engine.
pub struct HostEngine {
    config: HostConfig,
    connector: Arc<dyn Connector>,
    clients: RwLock<HashMap<String, Arc<dyn ServerConnection>>>,
    index: RwLock<CapabilityIndex>,
    roots: RwLock<Arc<Vec<Root>>>,
    events: EventBus,
    sampling: Arc<SamplingBroker>,
    started: AtomicBool,
}

impl HostEngine {
    /// Create an engine from configuration. Duplicate server ids are
    /// dropped here, keeping the first occurrence.
    pub fn new(mut config: HostConfig, connector: Arc<dyn Connector>) -> Arc<Self> {
        config.dedupe_servers();

        let events = EventBus::new();
        let sampling = Arc::new(SamplingBroker::new(events.clone()));

        Arc::new(Self {
            config,
            connector,
            clients: RwLock::new(HashMap::new()),
            index: RwLock::new(CapabilityIndex::default()),
            roots: RwLock::new(Arc::new(Vec::new())),
            events,
            sampling,
            started: AtomicBool::new(false),
        })
    }

    /// The event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The sampling broker.
    pub fn sampling(&self) -> &Arc<SamplingBroker> {
        &self.sampling
    }

    /// The configuration this engine was built from (deduped).
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Connect every configured server in parallel.
    ///
    /// Idempotent. Never fails: per-server failures surface as
    /// `ServerError` events. Emits one `CapabilitiesUpdated` after all
    /// attempts settle.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("host already started");
            return;
        }

        let servers = self.config.servers.clone();
        tracing::info!(server_count = servers.len(), "starting MCP host");

        let attempts = servers
            .iter()
            .map(|config| self.connect_server(config, false));
        futures::future::join_all(attempts).await;

        tracing::info!(
            connected = self.clients.read().unwrap().len(),
            total = self.config.servers.len(),
            "MCP host start complete"
        );
        self.events.capabilities_updated();
    }

    /// Close every live connection and clear aggregated state.
    ///
    /// Idempotent. Per-client close errors are logged, never propagated.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }

        let clients: Vec<(String, Arc<dyn ServerConnection>)> =
            self.clients.write().unwrap().drain().collect();

        for (server_id, connection) in clients {
            if let Err(e) = connection.close().await {
                tracing::warn!(server = %server_id, error = %e, "error closing connection");
            }
        }

        self.index.write().unwrap().clear();
        self.events.capabilities_updated();
        tracing::info!("MCP host stopped");
    }

    /// Attempt one server connection; failures become events.
    async fn connect_server(self: &Arc<Self>, config: &ServerConfig, notify: bool) {
        if let Err(e) = self.try_connect(config, notify).await {
            tracing::error!(server = %config.id, error = %e, "failed to connect to MCP server");
            self.events.server_error(&config.id, &e.to_string());
            self.events.server_disconnected(&config.id, Some(e.to_string()));
        }
    }

    async fn try_connect(self: &Arc<Self>, config: &ServerConfig, notify: bool) -> Result<()> {
        let observer: Arc<dyn ConnectionObserver> = Arc::new(EngineObserver {
            engine: Arc::downgrade(self),
        });
        let params = ConnectParams {
            host_info: self.config.host_info.clone(),
            capabilities: self.config.host_capabilities.clone(),
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        };

        let connection = self
            .connector
            .connect(config, params, observer)
            .await
            .map_err(|e| match e {
                McpError::UnsupportedTransport(kind) => HostError::invalid_transport(
                    &config.id,
                    format!("transport '{kind}' is not available"),
                ),
                other => HostError::ConnectionFailed {
                    server_id: config.id.clone(),
                    source: other,
                },
            })?;

        self.clients
            .write()
            .unwrap()
            .insert(config.id.clone(), Arc::clone(&connection));

        tracing::info!(server = %config.id, "MCP server connected");
        self.events.server_connected(&config.id);

        self.refresh_capabilities(&config.id, notify).await;

        // Announce existing roots to servers that care. A failure here is
        // not a connection failure.
        let have_roots = !self.roots.read().unwrap().is_empty();
        if have_roots
            && connection.capabilities().wants_roots_notifications()
            && let Err(e) = connection.notify_roots_changed().await
        {
            tracing::warn!(server = %config.id, error = %e, "initial roots notification failed");
        }

        Ok(())
    }

    /// Re-list a server's capabilities and swap its aggregated entries.
    ///
    /// Listings run concurrently, each gated on the corresponding
    /// capability bit. A failed listing logs and contributes nothing; the
    /// others still land.
    pub async fn refresh_capabilities(&self, server_id: &str, notify: bool) {
        let Some(connection) = self.connection(server_id) else {
            self.index.write().unwrap().remove_server(server_id);
            if notify {
                self.events.capabilities_updated();
            }
            return;
        };

        let caps = connection.capabilities();

        let tools = async {
            if !caps.has_tools() {
                return Vec::new();
            }
            match connection.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    tracing::warn!(server = %server_id, error = %e, "tools/list failed");
                    Vec::new()
                }
            }
        };
        let resources = async {
            if !caps.has_resources() {
                return Vec::new();
            }
            match connection.list_resources().await {
                Ok(resources) => resources,
                Err(e) => {
                    tracing::warn!(server = %server_id, error = %e, "resources/list failed");
                    Vec::new()
                }
            }
        };
        let templates = async {
            if !caps.has_resource_templates() {
                return Vec::new();
            }
            match connection.list_resource_templates().await {
                Ok(templates) => templates,
                Err(e) => {
                    tracing::warn!(server = %server_id, error = %e, "resources/templates/list failed");
                    Vec::new()
                }
            }
        };
        let prompts = async {
            if !caps.has_prompts() {
                return Vec::new();
            }
            match connection.list_prompts().await {
                Ok(prompts) => prompts,
                Err(e) => {
                    tracing::warn!(server = %server_id, error = %e, "prompts/list failed");
                    Vec::new()
                }
            }
        };

        let (tools, resources, templates, prompts) =
            tokio::join!(tools, resources, templates, prompts);

        tracing::debug!(
            server = %server_id,
            tools = tools.len(),
            resources = resources.len(),
            templates = templates.len(),
            prompts = prompts.len(),
            "capabilities refreshed"
        );

        self.index
            .write()
            .unwrap()
            .replace_server(server_id, tools, resources, templates, prompts);

        if notify {
            self.events.capabilities_updated();
        }
    }

    /// Handle a connection going away, however it happened.
    fn handle_close(&self, server_id: &str, reason: Option<String>) {
        let removed = self.clients.write().unwrap().remove(server_id).is_some();
        if !removed {
            // Already removed by stop() or a racing close.
            return;
        }

        self.index.write().unwrap().remove_server(server_id);
        tracing::info!(server = %server_id, reason = ?reason, "MCP server disconnected");
        self.events.server_disconnected(server_id, reason);
        self.events.capabilities_updated();
    }

    fn connection(&self, server_id: &str) -> Option<Arc<dyn ServerConnection>> {
        self.clients.read().unwrap().get(server_id).cloned()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Routed operations
    // ─────────────────────────────────────────────────────────────────────

    /// Call a tool on a specific server.
    pub async fn call_tool(
        &self,
        server_id: &str,
        params: CallToolParams,
        options: RequestOptions,
    ) -> Result<CallToolResult> {
        let connection = self
            .connection(server_id)
            .ok_or_else(|| HostError::server_not_found(server_id))?;

        connection.call_tool(params, options).await.map_err(|e| {
            wrap_operation_error(server_id, e, |server_id, source| HostError::ToolCallFailed {
                server_id,
                source,
            })
        })
    }

    /// Read a resource from a specific server.
    pub async fn read_resource(
        &self,
        server_id: &str,
        params: ReadResourceParams,
        options: RequestOptions,
    ) -> Result<ReadResourceResult> {
        let connection = self
            .connection(server_id)
            .ok_or_else(|| HostError::server_not_found(server_id))?;

        connection.read_resource(params, options).await.map_err(|e| {
            wrap_operation_error(server_id, e, |server_id, source| {
                HostError::ResourceReadFailed { server_id, source }
            })
        })
    }

    /// Fetch a prompt from a specific server.
    pub async fn get_prompt(
        &self,
        server_id: &str,
        params: GetPromptParams,
        options: RequestOptions,
    ) -> Result<GetPromptResult> {
        let connection = self
            .connection(server_id)
            .ok_or_else(|| HostError::server_not_found(server_id))?;

        connection.get_prompt(params, options).await.map_err(|e| {
            wrap_operation_error(server_id, e, |server_id, source| HostError::PromptGetFailed {
                server_id,
                source,
            })
        })
    }

    /// Subscribe to update notifications for a resource.
    pub async fn subscribe_resource(&self, server_id: &str, uri: &str) -> Result<()> {
        let connection = self
            .connection(server_id)
            .ok_or_else(|| HostError::server_not_found(server_id))?;

        connection
            .subscribe_resource(uri)
            .await
            .map_err(|e| HostError::SubscriptionFailed {
                server_id: server_id.to_string(),
                uri: uri.to_string(),
                source: e,
            })
    }

    /// Cancel a resource subscription.
    pub async fn unsubscribe_resource(&self, server_id: &str, uri: &str) -> Result<()> {
        let connection = self
            .connection(server_id)
            .ok_or_else(|| HostError::server_not_found(server_id))?;

        connection
            .unsubscribe_resource(uri)
            .await
            .map_err(|e| HostError::SubscriptionFailed {
                server_id: server_id.to_string(),
                uri: uri.to_string(),
                source: e,
            })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Roots
    // ─────────────────────────────────────────────────────────────────────

    /// Atomically replace the workspace roots and notify interested
    /// servers.
    ///
    /// The new list is visible to readers before any notification goes
    /// out, and stays in place even if some notifications fail; those
    /// failures come back as one aggregate error.
    pub async fn set_roots(&self, roots: Vec<Root>) -> Result<()> {
        *self.roots.write().unwrap() = Arc::new(roots);

        let clients: Vec<(String, Arc<dyn ServerConnection>)> = self
            .clients
            .read()
            .unwrap()
            .iter()
            .map(|(id, c)| (id.clone(), Arc::clone(c)))
            .collect();

        let notifications = clients.into_iter().filter_map(|(server_id, connection)| {
            if !connection.capabilities().wants_roots_notifications() {
                return None;
            }
            Some(async move {
                connection
                    .notify_roots_changed()
                    .await
                    .map_err(|e| HostError::RootsUpdateFailed {
                        server_id: server_id.clone(),
                        source: e,
                    })
            })
        });

        let failures: Vec<HostError> = futures::future::join_all(notifications)
            .await
            .into_iter()
            .filter_map(|r| r.err())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            for failure in &failures {
                tracing::warn!(error = %failure, "roots notification failed");
            }
            Err(HostError::Aggregate(failures))
        }
    }

    /// Snapshot of the current roots.
    pub fn current_roots(&self) -> Vec<Root> {
        self.roots.read().unwrap().as_ref().clone()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Snapshots & suggestions
    // ─────────────────────────────────────────────────────────────────────

    /// Snapshot of all aggregated tools.
    pub fn tools(&self) -> Vec<AggregatedTool> {
        self.index.read().unwrap().tools()
    }

    /// Snapshot of all aggregated resources.
    pub fn resources(&self) -> Vec<AggregatedResource> {
        self.index.read().unwrap().resources()
    }

    /// Snapshot of all aggregated resource templates.
    pub fn resource_templates(&self) -> Vec<AggregatedResourceTemplate> {
        self.index.read().unwrap().templates()
    }

    /// Snapshot of all aggregated prompts.
    pub fn prompts(&self) -> Vec<AggregatedPrompt> {
        self.index.read().unwrap().prompts()
    }

    /// Ids of all configured servers.
    pub fn configured_server_ids(&self) -> Vec<String> {
        self.config.servers.iter().map(|s| s.id.clone()).collect()
    }

    /// Ids of currently connected servers.
    pub fn connected_server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.clients.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether a server is currently connected.
    pub fn is_connected(&self, server_id: &str) -> bool {
        self.clients.read().unwrap().contains_key(server_id)
    }

    /// Declared capabilities of a connected server.
    pub fn server_capabilities(&self, server_id: &str) -> Option<ServerCapabilities> {
        self.connection(server_id).map(|c| c.capabilities())
    }

    /// Suggest servers for a resource URI.
    pub fn suggest_server_for_uri(&self, uri: &str) -> Vec<Suggestion> {
        let index = self.index.read().unwrap();
        resolver::resolve_resource_server(&index.resources(), &index.templates(), uri)
    }

    /// Suggest servers for a tool name.
    pub fn suggest_server_for_tool(&self, name: &str) -> Vec<Suggestion> {
        resolver::resolve_tool_server(&self.tools(), name)
    }

    /// Suggest servers for a prompt name.
    pub fn suggest_server_for_prompt(&self, name: &str) -> Vec<Suggestion> {
        resolver::resolve_prompt_server(&self.prompts(), name)
    }
}

/// Observer wiring one connection's server-initiated traffic back into the
/// engine. Holds a weak reference; a dropped engine silences callbacks.
struct EngineObserver {
    engine: Weak<HostEngine>,
}

#[async_trait]
impl ConnectionObserver for EngineObserver {
    fn list_changed(&self, server_id: &str, kind: ListChangedKind) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        tracing::debug!(server = %server_id, ?kind, "list-changed notification");
        let server_id = server_id.to_string();
        tokio::spawn(async move {
            engine.refresh_capabilities(&server_id, true).await;
        });
    }

    fn resource_updated(&self, server_id: &str, uri: &str) {
        if let Some(engine) = self.engine.upgrade() {
            engine.events.resource_updated(server_id, uri);
        }
    }

    fn log_message(&self, server_id: &str, message: LoggingMessage) {
        if let Some(engine) = self.engine.upgrade() {
            engine
                .events
                .server_log(server_id, &message.level, message.data);
        }
    }

    async fn sampling_request(
        &self,
        server_id: &str,
        params: Value,
    ) -> std::result::Result<CreateMessageResult, JsonRpcError> {
        let Some(engine) = self.engine.upgrade() else {
            return Err(JsonRpcError::internal("host is shutting down"));
        };

        if !engine.config.host_capabilities.supports_sampling() {
            return Err(JsonRpcError::method_not_found("sampling/createMessage"));
        }

        engine.sampling.relay(server_id, params).await
    }

    fn connection_closed(&self, server_id: &str, reason: Option<McpError>) {
        if let Some(engine) = self.engine.upgrade() {
            engine.handle_close(server_id, reason.map(|e| e.to_string()));
        }
    }

    fn connection_error(&self, server_id: &str, error: McpError) {
        if let Some(engine) = self.engine.upgrade() {
            tracing::warn!(server = %server_id, error = %error, "server connection error");
            engine.events.server_error(server_id, &error.to_string());
        }
    }
}
