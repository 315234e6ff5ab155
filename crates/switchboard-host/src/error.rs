//! Error taxonomy for host operations.
//!
//! Two layers surface here: JSON-RPC errors coming back from a server are
//! propagated verbatim as [`HostError::Protocol`]; everything else is
//! wrapped into a host error kind that carries the server id and the
//! original failure as its source.

use thiserror::Error;

use switchboard_mcp::{JsonRpcError, McpError};

/// Result type for host operations.
pub type Result<T> = std::result::Result<T, HostError>;

/// Stable machine-readable error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    RootsUpdateFailed,
    ServerNotFound,
    InvalidTransport,
    ConnectionFailed,
    SubscriptionFailed,
    ToolCallFailed,
    ResourceReadFailed,
    PromptGetFailed,
    Protocol,
    Aggregate,
}

impl ErrorCode {
    /// The wire-stable name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RootsUpdateFailed => "ROOTS_UPDATE_FAILED",
            Self::ServerNotFound => "SERVER_NOT_FOUND",
            Self::InvalidTransport => "INVALID_TRANSPORT",
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::SubscriptionFailed => "SUBSCRIPTION_FAILED",
            Self::ToolCallFailed => "TOOL_CALL_FAILED",
            Self::ResourceReadFailed => "RESOURCE_READ_FAILED",
            Self::PromptGetFailed => "PROMPT_GET_FAILED",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::Aggregate => "AGGREGATE_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for host operations.
#[derive(Debug, Error)]
pub enum HostError {
    /// The server id is unknown or not currently connected.
    #[error("server '{server_id}' not found")]
    ServerNotFound {
        /// The offending server id.
        server_id: String,
    },

    /// The configured transport cannot be constructed.
    #[error("invalid transport for server '{server_id}': {reason}")]
    InvalidTransport {
        /// The offending server id.
        server_id: String,
        /// Why the transport is unusable.
        reason: String,
    },

    /// Connecting to a server failed.
    #[error("connection to server '{server_id}' failed")]
    ConnectionFailed {
        /// The offending server id.
        server_id: String,
        /// The underlying failure.
        #[source]
        source: McpError,
    },

    /// A resource subscribe/unsubscribe failed.
    #[error("subscription for '{uri}' on server '{server_id}' failed")]
    SubscriptionFailed {
        /// The offending server id.
        server_id: String,
        /// The resource URI involved.
        uri: String,
        /// The underlying failure.
        #[source]
        source: McpError,
    },

    /// A tool invocation failed below the protocol level.
    #[error("tool call on server '{server_id}' failed")]
    ToolCallFailed {
        /// The offending server id.
        server_id: String,
        /// The underlying failure.
        #[source]
        source: McpError,
    },

    /// A resource read failed below the protocol level.
    #[error("resource read on server '{server_id}' failed")]
    ResourceReadFailed {
        /// The offending server id.
        server_id: String,
        /// The underlying failure.
        #[source]
        source: McpError,
    },

    /// A prompt fetch failed below the protocol level.
    #[error("prompt get on server '{server_id}' failed")]
    PromptGetFailed {
        /// The offending server id.
        server_id: String,
        /// The underlying failure.
        #[source]
        source: McpError,
    },

    /// The proposed roots list failed validation.
    #[error("invalid roots: {reason}")]
    InvalidRoots {
        /// What was wrong with the input.
        reason: String,
    },

    /// Notifying a server about a roots change failed.
    #[error("roots update for server '{server_id}' failed")]
    RootsUpdateFailed {
        /// The offending server id.
        server_id: String,
        /// The underlying failure.
        #[source]
        source: McpError,
    },

    /// A JSON-RPC error from a server, preserved verbatim.
    #[error("server '{server_id}' returned error {}: {}", .error.code, .error.message)]
    Protocol {
        /// The originating server id.
        server_id: String,
        /// The JSON-RPC error object.
        error: JsonRpcError,
    },

    /// Several per-server failures from one fan-out operation.
    #[error("{} server(s) failed", .0.len())]
    Aggregate(Vec<HostError>),
}

impl HostError {
    /// Create a server-not-found error.
    pub fn server_not_found(server_id: impl Into<String>) -> Self {
        Self::ServerNotFound {
            server_id: server_id.into(),
        }
    }

    /// Create an invalid-transport error.
    pub fn invalid_transport(server_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTransport {
            server_id: server_id.into(),
            reason: reason.into(),
        }
    }

    /// The stable kind of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ServerNotFound { .. } => ErrorCode::ServerNotFound,
            Self::InvalidTransport { .. } => ErrorCode::InvalidTransport,
            Self::ConnectionFailed { .. } => ErrorCode::ConnectionFailed,
            Self::SubscriptionFailed { .. } => ErrorCode::SubscriptionFailed,
            Self::ToolCallFailed { .. } => ErrorCode::ToolCallFailed,
            Self::ResourceReadFailed { .. } => ErrorCode::ResourceReadFailed,
            Self::PromptGetFailed { .. } => ErrorCode::PromptGetFailed,
            Self::InvalidRoots { .. } | Self::RootsUpdateFailed { .. } => {
                ErrorCode::RootsUpdateFailed
            }
            Self::Protocol { .. } => ErrorCode::Protocol,
            Self::Aggregate(_) => ErrorCode::Aggregate,
        }
    }

    /// The server this error is attributed to, if any.
    pub fn server_id(&self) -> Option<&str> {
        match self {
            Self::ServerNotFound { server_id }
            | Self::InvalidTransport { server_id, .. }
            | Self::ConnectionFailed { server_id, .. }
            | Self::SubscriptionFailed { server_id, .. }
            | Self::ToolCallFailed { server_id, .. }
            | Self::ResourceReadFailed { server_id, .. }
            | Self::PromptGetFailed { server_id, .. }
            | Self::RootsUpdateFailed { server_id, .. }
            | Self::Protocol { server_id, .. } => Some(server_id),
            Self::InvalidRoots { .. } | Self::Aggregate(_) => None,
        }
    }

    /// The JSON-RPC error to put on the wire for this failure.
    ///
    /// Protocol errors pass through verbatim; host errors become an
    /// internal error carrying the kind as data.
    pub fn jsonrpc_error(&self) -> JsonRpcError {
        match self {
            Self::Protocol { error, .. } => error.clone(),
            other => JsonRpcError::internal(other.to_string())
                .with_data(serde_json::json!({"code": other.code().as_str()})),
        }
    }
}

/// Wrap an MCP-level failure from a single-server operation, preserving
/// protocol errors verbatim.
pub(crate) fn wrap_operation_error(
    server_id: &str,
    error: McpError,
    wrap: impl FnOnce(String, McpError) -> HostError,
) -> HostError {
    match error {
        McpError::ServerError(rpc) => HostError::Protocol {
            server_id: server_id.to_string(),
            error: rpc,
        },
        other => wrap(server_id.to_string(), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = HostError::server_not_found("files");
        assert_eq!(err.code().as_str(), "SERVER_NOT_FOUND");
        assert_eq!(err.server_id(), Some("files"));

        let err = HostError::invalid_transport("remote", "sse not supported");
        assert_eq!(err.code(), ErrorCode::InvalidTransport);
        assert!(err.to_string().contains("sse not supported"));
    }

    #[test]
    fn test_protocol_error_passes_through() {
        let rpc = JsonRpcError::new(-32601, "no such method");
        let err = wrap_operation_error("files", McpError::server_error(rpc), |server_id, source| {
            HostError::ToolCallFailed { server_id, source }
        });
        assert_eq!(err.code(), ErrorCode::Protocol);
        assert_eq!(err.jsonrpc_error().code, -32601);
    }

    #[test]
    fn test_transport_error_is_wrapped_with_cause() {
        let err = wrap_operation_error(
            "files",
            McpError::transport("pipe broke"),
            |server_id, source| HostError::ToolCallFailed { server_id, source },
        );
        assert_eq!(err.code(), ErrorCode::ToolCallFailed);

        let source = std::error::Error::source(&err).expect("cause preserved");
        assert!(source.to_string().contains("pipe broke"));
    }

    #[test]
    fn test_aggregate_display() {
        let err = HostError::Aggregate(vec![
            HostError::server_not_found("a"),
            HostError::server_not_found("b"),
        ]);
        assert!(err.to_string().contains("2 server(s) failed"));
        assert!(err.server_id().is_none());
    }

    #[test]
    fn test_jsonrpc_mapping_for_host_errors() {
        let err = HostError::server_not_found("gone");
        let rpc = err.jsonrpc_error();
        assert_eq!(rpc.code, JsonRpcError::INTERNAL_ERROR);
        assert_eq!(
            rpc.data.unwrap()["code"],
            serde_json::json!("SERVER_NOT_FOUND")
        );
    }
}
