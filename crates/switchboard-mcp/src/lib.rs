//! MCP protocol layer for Switchboard.
//!
//! This crate provides the per-server connection contract the host engine
//! builds on, plus the concrete transports:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Connector                                                  │
//! │  - turns a ServerConfig into a live ServerConnection        │
//! │  - wires server-initiated traffic to a ConnectionObserver   │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!            ┌──────────────┴──────────────┐
//!            ▼                             ▼
//! ┌─────────────────────────┐  ┌─────────────────────────┐
//! │  StdioConnection        │  │  HttpConnection         │
//! │  - spawned child proc   │  │  - streamable HTTP POST │
//! │  - Content-Length frame │  │  - Mcp-Session-Id echo  │
//! │  - sampling + notifs    │  │  - request/response only│
//! └─────────────────────────┘  └─────────────────────────┘
//! ```
//!
//! The protocol flow per connection is:
//! 1. Host sends `initialize` with its info and capabilities
//! 2. Server responds with its capabilities
//! 3. Host sends `notifications/initialized`
//! 4. Listings, invocations, and subscriptions are available;
//!    the server may push notifications and `sampling/createMessage`
//!    requests at any time.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod stdio;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export main types
pub use client::{
    ConnectParams, ConnectionObserver, Connector, ListChangedKind, ServerConnection,
};
pub use config::{ProgressCallback, RequestOptions, ServerConfig, TransportConfig};
pub use error::{McpError, Result};
pub use http::HttpConnection;
pub use protocol::{
    CallToolParams, CallToolResult, CreateMessageResult, GetPromptParams, GetPromptResult,
    HostCapabilities, HostInfo, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, LoggingMessage,
    MCP_PROTOCOL_VERSION, ProgressUpdate, PromptArgument, PromptInfo, PromptsCapability,
    ReadResourceParams, ReadResourceResult, ResourceInfo, ResourceTemplateInfo,
    ResourcesCapability, Root, RootsCapability, ServerCapabilities, ServerInfo, ToolContent,
    ToolInfo, ToolsCapability,
};
pub use stdio::{StdioConnection, StdioConnector};
