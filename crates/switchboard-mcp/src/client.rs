//! The connection contract consumed by the host.
//!
//! A [`ServerConnection`] is a live MCP endpoint for one server. The host
//! never touches transports directly: a [`Connector`] turns a
//! [`ServerConfig`](crate::ServerConfig) into a connection, wiring every
//! server-initiated message to the [`ConnectionObserver`] the host supplies
//! *before* the connection goes live.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{RequestOptions, ServerConfig};
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, CreateMessageResult, GetPromptParams, GetPromptResult,
    HostCapabilities, HostInfo, JsonRpcError, LoggingMessage, PromptInfo, ReadResourceParams,
    ReadResourceResult, ResourceInfo, ResourceTemplateInfo, ServerCapabilities, ToolInfo,
};

/// Host-side parameters for establishing a connection.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Host identity sent during initialize.
    pub host_info: HostInfo,
    /// Host capabilities sent during initialize.
    pub capabilities: HostCapabilities,
    /// Protocol version to negotiate.
    pub protocol_version: String,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            host_info: HostInfo::default(),
            capabilities: HostCapabilities::default(),
            protocol_version: crate::protocol::MCP_PROTOCOL_VERSION.to_string(),
        }
    }
}

/// Which listing a `*/list_changed` notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListChangedKind {
    /// `notifications/tools/list_changed`
    Tools,
    /// `notifications/resources/list_changed`
    Resources,
    /// `notifications/prompts/list_changed`
    Prompts,
}

/// Callbacks a connection invokes for server-initiated traffic.
///
/// Registered before the transport connects, so nothing the server sends
/// during or immediately after the handshake can be lost. Notification
/// callbacks must not block; long work belongs in a spawned task.
#[async_trait]
pub trait ConnectionObserver: Send + Sync {
    /// A `*/list_changed` notification arrived.
    fn list_changed(&self, server_id: &str, kind: ListChangedKind);

    /// A `notifications/resources/updated` notification arrived.
    fn resource_updated(&self, server_id: &str, uri: &str);

    /// A `notifications/message` log entry arrived.
    fn log_message(&self, server_id: &str, message: LoggingMessage);

    /// A `sampling/createMessage` request arrived. The returned value (or
    /// error) is sent back to the server as the JSON-RPC response.
    async fn sampling_request(
        &self,
        server_id: &str,
        params: Value,
    ) -> std::result::Result<CreateMessageResult, JsonRpcError>;

    /// The connection closed. `reason` is set when the closure was not a
    /// clean local shutdown.
    fn connection_closed(&self, server_id: &str, reason: Option<McpError>);

    /// The connection hit a non-fatal error (e.g. an undecodable frame).
    fn connection_error(&self, server_id: &str, error: McpError);
}

/// A live MCP endpoint for one server.
#[async_trait]
pub trait ServerConnection: Send + Sync {
    /// The server id this connection belongs to.
    fn server_id(&self) -> &str;

    /// Capabilities the server declared during initialize.
    fn capabilities(&self) -> ServerCapabilities;

    /// List the server's tools.
    async fn list_tools(&self) -> Result<Vec<ToolInfo>>;

    /// List the server's concrete resources.
    async fn list_resources(&self) -> Result<Vec<ResourceInfo>>;

    /// List the server's resource templates.
    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateInfo>>;

    /// List the server's prompts.
    async fn list_prompts(&self) -> Result<Vec<PromptInfo>>;

    /// Invoke a tool.
    async fn call_tool(
        &self,
        params: CallToolParams,
        options: RequestOptions,
    ) -> Result<CallToolResult>;

    /// Read a resource.
    async fn read_resource(
        &self,
        params: ReadResourceParams,
        options: RequestOptions,
    ) -> Result<ReadResourceResult>;

    /// Render a prompt.
    async fn get_prompt(
        &self,
        params: GetPromptParams,
        options: RequestOptions,
    ) -> Result<GetPromptResult>;

    /// Subscribe to update notifications for a resource.
    async fn subscribe_resource(&self, uri: &str) -> Result<()>;

    /// Cancel a resource subscription.
    async fn unsubscribe_resource(&self, uri: &str) -> Result<()>;

    /// Notify the server that the workspace roots changed.
    async fn notify_roots_changed(&self) -> Result<()>;

    /// Close the connection. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Builds live connections from configuration.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the configured server, registering `observer` for all
    /// server-initiated traffic before the handshake completes.
    async fn connect(
        &self,
        config: &ServerConfig,
        params: ConnectParams,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<Arc<dyn ServerConnection>>;
}
