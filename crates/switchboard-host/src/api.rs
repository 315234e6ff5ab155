//! Public host API.
//!
//! [`McpHost`] is the stable surface applications embed: a thin wrapper
//! over the engine that validates inputs, returns snapshots, and offers a
//! closure-based way to install a sampling handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use switchboard_mcp::{
    CallToolParams, CallToolResult, Connector, GetPromptParams, GetPromptResult, JsonRpcError,
    ReadResourceParams, ReadResourceResult, RequestOptions, Root, ServerCapabilities,
};

use crate::aggregate::{
    AggregatedPrompt, AggregatedResource, AggregatedResourceTemplate, AggregatedTool,
};
use crate::config::HostConfig;
use crate::error::{HostError, Result};
use crate::events::HostEvent;
use crate::host::HostEngine;
use crate::resolver::Suggestion;
use crate::sampling::{SamplingBroker, SamplingHandler, SamplingReply};

/// The embeddable MCP host.
#[derive(Clone)]
pub struct McpHost {
    engine: Arc<HostEngine>,
}

impl McpHost {
    /// Build a host from configuration and a connector.
    pub fn new(config: HostConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            engine: HostEngine::new(config, connector),
        }
    }

    /// Connect all configured servers. Idempotent, never fails.
    pub async fn start(&self) {
        self.engine.start().await;
    }

    /// Disconnect everything and clear aggregated state. Idempotent.
    pub async fn stop(&self) {
        self.engine.stop().await;
    }

    /// Subscribe to host events.
    pub fn events(&self) -> broadcast::Receiver<HostEvent> {
        self.engine.events().subscribe()
    }

    /// The sampling broker (for bridges that carry the return leg).
    pub fn sampling(&self) -> Arc<SamplingBroker> {
        Arc::clone(self.engine.sampling())
    }

    /// Set the deadline for relayed sampling requests.
    pub fn set_sampling_timeout(&self, timeout: Duration) {
        self.engine.sampling().set_timeout(timeout);
    }

    /// Install a simplified in-process sampling handler.
    ///
    /// The closure returns the simplified `{content, model?, stop_reason?,
    /// usage?}` shape; it is adapted into a full `CreateMessageResult`.
    /// Handler errors become JSON-RPC internal errors.
    pub fn set_sampling_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<SamplingReply, String>> + Send + 'static,
    {
        struct FnHandler<F> {
            inner: F,
        }

        #[async_trait]
        impl<F> SamplingHandler for FnHandler<F>
        where
            F: Fn(
                    String,
                    Value,
                ) -> Pin<
                    Box<
                        dyn Future<Output = std::result::Result<SamplingReply, String>>
                            + Send,
                    >,
                > + Send
                + Sync,
        {
            async fn handle(
                &self,
                server_id: &str,
                params: Value,
            ) -> std::result::Result<SamplingReply, JsonRpcError> {
                (self.inner)(server_id.to_string(), params)
                    .await
                    .map_err(JsonRpcError::internal)
            }
        }

        let boxed = move |server_id: String, params: Value| -> Pin<
            Box<dyn Future<Output = std::result::Result<SamplingReply, String>> + Send>,
        > { Box::pin(handler(server_id, params)) };

        self.engine
            .sampling()
            .set_handler(Arc::new(FnHandler { inner: boxed }));
    }

    /// Remove the in-process sampling handler.
    pub fn clear_sampling_handler(&self) {
        self.engine.sampling().clear_handler();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Snapshots
    // ─────────────────────────────────────────────────────────────────────

    /// All aggregated tools.
    pub fn get_tools(&self) -> Vec<AggregatedTool> {
        self.engine.tools()
    }

    /// All aggregated resources.
    pub fn get_resources(&self) -> Vec<AggregatedResource> {
        self.engine.resources()
    }

    /// All aggregated resource templates.
    pub fn get_resource_templates(&self) -> Vec<AggregatedResourceTemplate> {
        self.engine.resource_templates()
    }

    /// All aggregated prompts.
    pub fn get_prompts(&self) -> Vec<AggregatedPrompt> {
        self.engine.prompts()
    }

    /// The current workspace roots.
    pub fn get_current_roots(&self) -> Vec<Root> {
        self.engine.current_roots()
    }

    /// Ids of all configured servers.
    pub fn configured_server_ids(&self) -> Vec<String> {
        self.engine.configured_server_ids()
    }

    /// Ids of currently connected servers.
    pub fn connected_server_ids(&self) -> Vec<String> {
        self.engine.connected_server_ids()
    }

    /// Whether a server is currently connected.
    pub fn is_connected(&self, server_id: &str) -> bool {
        self.engine.is_connected(server_id)
    }

    /// Declared capabilities of a connected server.
    pub fn server_capabilities(&self, server_id: &str) -> Option<ServerCapabilities> {
        self.engine.server_capabilities(server_id)
    }

    /// The host identity announced to servers.
    pub fn host_info(&self) -> switchboard_mcp::HostInfo {
        self.engine.config().host_info.clone()
    }

    /// The capabilities announced to servers.
    pub fn host_capabilities(&self) -> switchboard_mcp::HostCapabilities {
        self.engine.config().host_capabilities.clone()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────

    /// Call a tool on a specific server.
    pub async fn call_tool(
        &self,
        server_id: &str,
        params: CallToolParams,
        options: RequestOptions,
    ) -> Result<CallToolResult> {
        self.engine.call_tool(server_id, params, options).await
    }

    /// Read a resource from a specific server.
    pub async fn read_resource(
        &self,
        server_id: &str,
        params: ReadResourceParams,
        options: RequestOptions,
    ) -> Result<ReadResourceResult> {
        self.engine.read_resource(server_id, params, options).await
    }

    /// Fetch a prompt from a specific server.
    pub async fn get_prompt(
        &self,
        server_id: &str,
        params: GetPromptParams,
        options: RequestOptions,
    ) -> Result<GetPromptResult> {
        self.engine.get_prompt(server_id, params, options).await
    }

    /// Subscribe to update notifications for a resource.
    pub async fn subscribe_resource(&self, server_id: &str, uri: &str) -> Result<()> {
        self.engine.subscribe_resource(server_id, uri).await
    }

    /// Cancel a resource subscription.
    pub async fn unsubscribe_resource(&self, server_id: &str, uri: &str) -> Result<()> {
        self.engine.unsubscribe_resource(server_id, uri).await
    }

    /// Replace the workspace roots after validating them.
    ///
    /// Every root needs a non-empty `uri` and `name`; validation failures
    /// reject the whole update before anything is replaced.
    pub async fn set_roots(&self, roots: Vec<Root>) -> Result<()> {
        for (idx, root) in roots.iter().enumerate() {
            if root.uri.is_empty() || root.name.is_empty() {
                return Err(HostError::InvalidRoots {
                    reason: format!("root #{idx} needs non-empty uri and name"),
                });
            }
        }
        self.engine.set_roots(roots).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Suggestions
    // ─────────────────────────────────────────────────────────────────────

    /// Suggest servers for a resource URI.
    pub fn suggest_server_for_uri(&self, uri: &str) -> Vec<Suggestion> {
        self.engine.suggest_server_for_uri(uri)
    }

    /// Suggest servers for a tool name.
    pub fn suggest_server_for_tool(&self, name: &str) -> Vec<Suggestion> {
        self.engine.suggest_server_for_tool(name)
    }

    /// Suggest servers for a prompt name.
    pub fn suggest_server_for_prompt(&self, name: &str) -> Vec<Suggestion> {
        self.engine.suggest_server_for_prompt(name)
    }
}
