//! Multi-server MCP host engine for Switchboard.
//!
//! One [`McpHost`] owns any number of MCP server connections, aggregates
//! what they expose under server-qualified keys, routes invocations, and
//! brokers server-initiated sampling requests out to whoever can run an
//! LLM.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpHost (public API)                                       │
//! │  - snapshots, validation, sampling handler install          │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  HostEngine                                                 │
//! │  - connect fan-out, capability refresh, disconnect cleanup  │
//! │  - CapabilityIndex keyed by (server_id, name|uri)           │
//! │  - EventBus (typed broadcast)                               │
//! │  - SamplingBroker (ranked sinks, one-shot completions)      │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//!              switchboard_mcp::ServerConnection
//! ```

pub mod aggregate;
pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod resolver;
pub mod sampling;

// Re-export main types
pub use aggregate::{
    AggregatedPrompt, AggregatedResource, AggregatedResourceTemplate, AggregatedTool,
};
pub use api::McpHost;
pub use config::HostConfig;
pub use error::{ErrorCode, HostError, Result};
pub use events::{EventBus, HostEvent};
pub use host::HostEngine;
pub use resolver::{
    MatchType, Suggestion, resolve_prompt_server, resolve_resource_server, resolve_tool_server,
};
pub use sampling::{
    DEFAULT_SAMPLING_TIMEOUT, SamplingBroker, SamplingEnvelope, SamplingHandler, SamplingReply,
    SamplingSink, SinkKind,
};
