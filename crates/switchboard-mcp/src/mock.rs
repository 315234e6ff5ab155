//! Scriptable in-process connection for tests.
//!
//! [`MockConnection`] plays the role of a live MCP server: listings are
//! preloaded, invocations are recorded, and the [`MockConnector`] captures
//! the observer each connection was wired with so tests can drive
//! server-initiated traffic (list-changed notifications, resource updates,
//! sampling requests, disconnects) by hand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{
    ConnectParams, ConnectionObserver, Connector, ServerConnection,
};
use crate::config::{RequestOptions, ServerConfig};
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, JsonRpcError, PromptInfo,
    PromptsCapability, ReadResourceParams, ReadResourceResult, ResourceInfo,
    ResourceTemplateInfo, ResourcesCapability, RootsCapability, ServerCapabilities, ToolContent,
    ToolInfo, ToolsCapability,
};

/// A fake server connection with scripted listings and recorded calls.
pub struct MockConnection {
    server_id: String,
    capabilities: Mutex<ServerCapabilities>,
    tools: Mutex<Vec<ToolInfo>>,
    resources: Mutex<Vec<ResourceInfo>>,
    templates: Mutex<Vec<ResourceTemplateInfo>>,
    prompts: Mutex<Vec<PromptInfo>>,
    tool_failure: Mutex<Option<JsonRpcError>>,
    subscribe_fails: AtomicBool,
    subscriptions: Mutex<Vec<String>>,
    roots_notifications: AtomicUsize,
    roots_notify_fails: AtomicBool,
    closed: AtomicBool,
}

impl MockConnection {
    /// Create a mock with full default capabilities and empty listings.
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            capabilities: Mutex::new(ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(true),
                }),
                resources: Some(ResourcesCapability {
                    subscribe: Some(true),
                    list_changed: Some(true),
                    templates: None,
                }),
                prompts: Some(PromptsCapability {
                    list_changed: Some(true),
                }),
                ..Default::default()
            }),
            tools: Mutex::new(Vec::new()),
            resources: Mutex::new(Vec::new()),
            templates: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            tool_failure: Mutex::new(None),
            subscribe_fails: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
            roots_notifications: AtomicUsize::new(0),
            roots_notify_fails: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Add a tool to the listing.
    pub fn with_tool(self, name: impl Into<String>) -> Self {
        self.tools.lock().unwrap().push(ToolInfo {
            name: name.into(),
            description: None,
            input_schema: Some(serde_json::json!({"type": "object"})),
            annotations: None,
        });
        self
    }

    /// Add a concrete resource to the listing.
    pub fn with_resource(self, uri: impl Into<String>, name: impl Into<String>) -> Self {
        self.resources.lock().unwrap().push(ResourceInfo {
            uri: uri.into(),
            name: name.into(),
            mime_type: None,
            size: None,
        });
        self
    }

    /// Add a resource template to the listing and set the templates bit.
    pub fn with_template(self, name: impl Into<String>, uri_template: impl Into<String>) -> Self {
        self.templates.lock().unwrap().push(ResourceTemplateInfo {
            name: name.into(),
            uri_template: uri_template.into(),
            description: None,
            mime_type: None,
        });
        if let Some(resources) = self.capabilities.lock().unwrap().resources.as_mut() {
            resources.templates = Some(true);
        }
        self
    }

    /// Add a prompt to the listing.
    pub fn with_prompt(self, name: impl Into<String>) -> Self {
        self.prompts.lock().unwrap().push(PromptInfo {
            name: name.into(),
            description: None,
            arguments: None,
        });
        self
    }

    /// Declare that the server wants roots-changed notifications.
    pub fn with_roots_list_changed(self) -> Self {
        self.capabilities.lock().unwrap().roots = Some(RootsCapability {
            list_changed: Some(true),
        });
        self
    }

    /// Replace the declared capabilities wholesale.
    pub fn with_capabilities(self, capabilities: ServerCapabilities) -> Self {
        *self.capabilities.lock().unwrap() = capabilities;
        self
    }

    /// Make the next tool calls fail with the given error.
    pub fn fail_tool_calls(&self, error: JsonRpcError) {
        *self.tool_failure.lock().unwrap() = Some(error);
    }

    /// Make subscribe/unsubscribe fail.
    pub fn fail_subscriptions(&self) {
        self.subscribe_fails.store(true, Ordering::SeqCst);
    }

    /// Make roots notifications fail.
    pub fn fail_roots_notifications(&self) {
        self.roots_notify_fails.store(true, Ordering::SeqCst);
    }

    /// Replace the tool listing (for list-changed refresh tests).
    pub fn set_tools(&self, tools: Vec<ToolInfo>) {
        *self.tools.lock().unwrap() = tools;
    }

    /// URIs subscribed so far.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// How many roots-changed notifications were delivered.
    pub fn roots_notification_count(&self) -> usize {
        self.roots_notifications.load(Ordering::SeqCst)
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerConnection for MockConnection {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    fn capabilities(&self) -> ServerCapabilities {
        self.capabilities.lock().unwrap().clone()
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        Ok(self.tools.lock().unwrap().clone())
    }

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>> {
        Ok(self.resources.lock().unwrap().clone())
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateInfo>> {
        Ok(self.templates.lock().unwrap().clone())
    }

    async fn list_prompts(&self) -> Result<Vec<PromptInfo>> {
        Ok(self.prompts.lock().unwrap().clone())
    }

    async fn call_tool(
        &self,
        params: CallToolParams,
        _options: RequestOptions,
    ) -> Result<CallToolResult> {
        if let Some(error) = self.tool_failure.lock().unwrap().clone() {
            return Err(McpError::server_error(error));
        }
        Ok(CallToolResult {
            content: vec![ToolContent::Text {
                text: format!("called {}", params.name),
            }],
            is_error: None,
        })
    }

    async fn read_resource(
        &self,
        params: ReadResourceParams,
        _options: RequestOptions,
    ) -> Result<ReadResourceResult> {
        Ok(ReadResourceResult {
            contents: vec![serde_json::json!({"uri": params.uri, "text": "mock contents"})],
        })
    }

    async fn get_prompt(
        &self,
        params: GetPromptParams,
        _options: RequestOptions,
    ) -> Result<GetPromptResult> {
        Ok(GetPromptResult {
            description: None,
            messages: vec![serde_json::json!({
                "role": "user",
                "content": {"type": "text", "text": format!("prompt {}", params.name)}
            })],
        })
    }

    async fn subscribe_resource(&self, uri: &str) -> Result<()> {
        if self.subscribe_fails.load(Ordering::SeqCst) {
            return Err(McpError::transport("subscribe refused"));
        }
        self.subscriptions.lock().unwrap().push(uri.to_string());
        Ok(())
    }

    async fn unsubscribe_resource(&self, uri: &str) -> Result<()> {
        if self.subscribe_fails.load(Ordering::SeqCst) {
            return Err(McpError::transport("unsubscribe refused"));
        }
        self.subscriptions.lock().unwrap().retain(|u| u != uri);
        Ok(())
    }

    async fn notify_roots_changed(&self) -> Result<()> {
        if self.roots_notify_fails.load(Ordering::SeqCst) {
            return Err(McpError::transport("roots notification refused"));
        }
        self.roots_notifications.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector that hands out pre-registered mock connections and records the
/// observer wired to each one.
#[derive(Default)]
pub struct MockConnector {
    connections: Mutex<HashMap<String, Arc<MockConnection>>>,
    observers: Mutex<HashMap<String, Arc<dyn ConnectionObserver>>>,
    failing: Mutex<HashMap<String, String>>,
}

impl MockConnector {
    /// Create an empty connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mock connection for a server id.
    pub fn register(&self, connection: MockConnection) -> Arc<MockConnection> {
        let arc = Arc::new(connection);
        self.connections
            .lock()
            .unwrap()
            .insert(arc.server_id().to_string(), Arc::clone(&arc));
        arc
    }

    /// Make connect attempts for a server id fail.
    pub fn fail_connect(&self, server_id: impl Into<String>, reason: impl Into<String>) {
        self.failing
            .lock()
            .unwrap()
            .insert(server_id.into(), reason.into());
    }

    /// The observer captured when `server_id` connected. Tests use this to
    /// simulate server-initiated traffic.
    pub fn observer(&self, server_id: &str) -> Option<Arc<dyn ConnectionObserver>> {
        self.observers.lock().unwrap().get(server_id).cloned()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        config: &ServerConfig,
        _params: ConnectParams,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<Arc<dyn ServerConnection>> {
        if let Some(reason) = self.failing.lock().unwrap().get(&config.id) {
            return Err(McpError::transport(reason.clone()));
        }

        let connection = self
            .connections
            .lock()
            .unwrap()
            .get(&config.id)
            .cloned()
            .ok_or_else(|| McpError::transport(format!("no mock registered for '{}'", config.id)))?;

        self.observers
            .lock()
            .unwrap()
            .insert(config.id.clone(), observer);

        Ok(connection)
    }
}
