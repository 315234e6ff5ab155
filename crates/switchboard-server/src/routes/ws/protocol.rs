//! WebSocket protocol types for bridge clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_mcp::{CreateMessageResult, JsonRpcError};

/// Messages from client to bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Subscribe to a broadcast topic.
    Subscribe {
        /// Topic in wire form (`resources`, `resource:<uri>`, `server:<id>`).
        topic: String,
    },
    /// Unsubscribe from a broadcast topic.
    Unsubscribe {
        /// Topic in wire form.
        topic: String,
    },
    /// Answer a relayed sampling request.
    SamplingResponse {
        /// The broker-assigned request id.
        request_id: String,
        /// The generation result.
        result: CreateMessageResult,
    },
    /// Fail a relayed sampling request.
    SamplingError {
        /// The broker-assigned request id.
        request_id: String,
        /// The error to relay.
        error: JsonRpcError,
    },
    /// Application-level keepalive.
    Ping,
}

/// Messages from bridge to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First message after connect.
    Connection {
        /// Assigned connection id.
        connection_id: String,
    },
    /// A broadcast host event.
    Event {
        /// Event name (mirrors the SSE event names).
        event: String,
        /// Event payload.
        data: Value,
    },
    /// A sampling request to execute.
    SamplingRequest {
        /// The broker-assigned request id.
        request_id: String,
        /// The originating server.
        server_id: String,
        /// Raw `createMessage` parameters.
        params: Value,
    },
    /// An error for the client.
    Error {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
    },
    /// Answer to a client ping.
    Pong,
}

impl ServerMessage {
    /// Build a broadcast event message.
    pub fn event(event: &str, data: Value) -> Self {
        Self::Event {
            event: event.to_string(),
            data,
        }
    }

    /// Build an error message.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
