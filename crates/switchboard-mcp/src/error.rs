//! Error types for MCP connections.

use thiserror::Error;

use crate::protocol::JsonRpcError;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP connection operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to spawn the MCP server process.
    #[error("failed to spawn MCP server: {0}")]
    SpawnFailed(String),

    /// Failed to communicate with the MCP server.
    #[error("transport error: {0}")]
    Transport(String),

    /// The configured transport kind has no client implementation.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// JSON-RPC protocol violation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server returned a JSON-RPC error response.
    #[error("server error {}: {}", .0.code, .0.message)]
    ServerError(JsonRpcError),

    /// Connection not initialized.
    #[error("connection not initialized")]
    NotInitialized,

    /// Connection closed.
    #[error("connection closed{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    ConnectionClosed(Option<String>),

    /// Timed out waiting for a response.
    #[error("timeout waiting for response")]
    Timeout,

    /// The request was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,
}

impl McpError {
    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an unsupported-transport error.
    pub fn unsupported_transport(kind: impl Into<String>) -> Self {
        Self::UnsupportedTransport(kind.into())
    }

    /// Wrap a JSON-RPC error response from the server.
    pub fn server_error(error: JsonRpcError) -> Self {
        Self::ServerError(error)
    }

    /// The JSON-RPC error carried by this error, if it is a server error.
    pub fn as_jsonrpc(&self) -> Option<&JsonRpcError> {
        match self {
            Self::ServerError(err) => Some(err),
            _ => None,
        }
    }
}
