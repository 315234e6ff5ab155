//! HTTP, SSE, and WebSocket bridge for the Switchboard MCP host.
//!
//! The bridge exposes the host over a session-based JSON-RPC endpoint
//! (`POST/GET/DELETE /mcp`), read-only views, a roots endpoint, and a
//! WebSocket channel. Sampling requests from servers reach clients
//! through whichever sink is live (WebSocket peers outrank SSE
//! sessions); the answers come back over the WebSocket or the dedicated
//! `sampling_response`/`sampling_error` POSTs.
//!
//! # Example
//!
//! ```ignore
//! use switchboard_host::{HostConfig, McpHost};
//! use switchboard_mcp::StdioConnector;
//! use switchboard_server::{BridgeConfig, Server};
//!
//! let host = McpHost::new(config, Arc::new(StdioConnector::new()));
//! host.start().await;
//!
//! let server = Server::new(host, BridgeConfig::from_env());
//! server.run().await?;
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod routes;
pub mod rpc;
pub mod session;
pub mod state;

pub use auth::{API_KEY_HEADER, AuthError, auth_middleware};
pub use config::BridgeConfig;
pub use error::{Result, ServerError};
pub use session::{SessionManager, Topic};
pub use state::AppState;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use switchboard_host::McpHost;

/// The Switchboard HTTP/SSE/WebSocket bridge.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a bridge over the given host.
    pub fn new(host: McpHost, config: BridgeConfig) -> Self {
        Self {
            state: AppState::new(host, config),
        }
    }

    /// Create a bridge from pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// The application state (for tests and embedding).
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let path = self.state.config.endpoint_path.clone();

        Router::new()
            // MCP endpoint
            .route(
                &path,
                post(routes::post_mcp)
                    .get(routes::get_mcp)
                    .delete(routes::delete_mcp),
            )
            .route(
                &format!("{path}/sampling_response"),
                post(routes::post_sampling_response),
            )
            .route(
                &format!("{path}/sampling_error"),
                post(routes::post_sampling_error),
            )
            // WebSocket (key may come via query parameter)
            .route("/ws", get(routes::ws_handler))
            // Read-only views
            .route("/status", get(routes::get_status))
            .route("/servers", get(routes::get_servers))
            .route("/capabilities/tools", get(routes::get_tools))
            .route("/capabilities/resources", get(routes::get_resources))
            .route("/capabilities/templates", get(routes::get_templates))
            .route("/capabilities/prompts", get(routes::get_prompts))
            .route("/suggest/resource", get(routes::suggest_resource))
            .route("/suggest/tool", get(routes::suggest_tool))
            .route("/suggest/prompt", get(routes::suggest_prompt))
            // Roots
            .route(
                "/config/roots",
                get(routes::get_roots).post(routes::post_roots),
            )
            // API-key auth across the whole surface
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth::auth_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run until ctrl-c, then tear down gracefully.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind {addr}: {e}")))?;
        self.run_on_listener(listener, lifecycle::shutdown_signal())
            .await
    }

    /// Run on an existing listener until `shutdown` resolves.
    ///
    /// Teardown destroys sessions, drops WebSocket peers, and stops the
    /// host, bounded by the configured grace period.
    pub async fn run_on_listener(
        self,
        listener: TcpListener,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let state = self.state.clone();
        let router = self.router();

        if let Ok(addr) = listener.local_addr() {
            info!(
                addr = %addr,
                endpoint = %state.config.endpoint_path,
                "starting bridge"
            );
        }

        let pump = lifecycle::spawn_event_pump(state.clone());
        let sweeper = lifecycle::spawn_session_sweeper(state.clone());

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        pump.abort();
        sweeper.abort();

        let grace = state.config.shutdown_grace;
        if tokio::time::timeout(grace, lifecycle::teardown(&state))
            .await
            .is_err()
        {
            tracing::error!(
                grace_secs = grace.as_secs(),
                "teardown exceeded the grace period, abandoning it"
            );
        }

        served.map_err(|e| ServerError::Internal(format!("Server error: {e}")))?;
        info!("bridge stopped");
        Ok(())
    }
}
