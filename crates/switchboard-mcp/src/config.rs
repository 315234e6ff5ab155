//! Per-server connection configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one MCP server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique id for this server. Aggregated capabilities are keyed by it.
    pub id: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Transport to reach the server over.
    #[serde(flatten)]
    pub transport: TransportConfig,
}

impl ServerConfig {
    /// Create a stdio server config.
    pub fn stdio(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            transport: TransportConfig::Stdio {
                command: command.into(),
                args: Vec::new(),
                env: HashMap::new(),
                cwd: None,
            },
        }
    }

    /// Create a streamable-HTTP server config.
    pub fn streamable_http(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            transport: TransportConfig::StreamableHttp {
                url: url.into(),
                headers: HashMap::new(),
            },
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append an argument (stdio only; no-op otherwise).
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        if let TransportConfig::Stdio { args, .. } = &mut self.transport {
            args.push(arg.into());
        }
        self
    }

    /// Set an environment variable (stdio only; no-op otherwise).
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let TransportConfig::Stdio { env, .. } = &mut self.transport {
            env.insert(key.into(), value.into());
        }
        self
    }

    /// Set the working directory (stdio only; no-op otherwise).
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        if let TransportConfig::Stdio { cwd: slot, .. } = &mut self.transport {
            *slot = Some(cwd.into());
        }
        self
    }

    /// Set a header (URL transports only; no-op otherwise).
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self.transport {
            TransportConfig::Sse { headers, .. }
            | TransportConfig::Websocket { headers, .. }
            | TransportConfig::StreamableHttp { headers, .. } => {
                headers.insert(key.into(), value.into());
            }
            TransportConfig::Stdio { .. } => {}
        }
        self
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Transport-specific connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "kebab-case")]
pub enum TransportConfig {
    /// Spawn a child process and speak MCP over its stdio pipes.
    Stdio {
        /// Command to execute.
        command: String,
        /// Arguments to pass.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables for the child.
        #[serde(default)]
        env: HashMap<String, String>,
        /// Working directory. Defaults to the host process cwd.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
    },
    /// Legacy HTTP+SSE transport.
    Sse {
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    /// WebSocket transport.
    Websocket {
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    /// Streamable HTTP transport.
    StreamableHttp {
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl TransportConfig {
    /// Stable kind name, matching the config file tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::Sse { .. } => "sse",
            Self::Websocket { .. } => "websocket",
            Self::StreamableHttp { .. } => "streamable-http",
        }
    }
}

/// Per-request behavior knobs for outbound MCP calls.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Overall timeout for the request.
    pub timeout: Option<Duration>,
    /// Whether a progress notification resets the timeout window.
    pub reset_timeout_on_progress: bool,
    /// Hard cap on total elapsed time when the timeout is being reset.
    pub max_total_timeout: Option<Duration>,
    /// Callback invoked on progress notifications for this request.
    pub on_progress: Option<ProgressCallback>,
    /// External cancellation signal.
    pub cancellation: Option<tokio_util::sync::CancellationToken>,
}

/// Progress callback for a single request.
pub type ProgressCallback = std::sync::Arc<dyn Fn(crate::protocol::ProgressUpdate) + Send + Sync>;

impl RequestOptions {
    /// Options with just a timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Default::default()
        }
    }
}
