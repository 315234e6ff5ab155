//! Application state shared across handlers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use switchboard_host::McpHost;

use crate::config::BridgeConfig;
use crate::routes::ws::ServerMessage;
use crate::session::{SessionManager, Topic};

/// A connected WebSocket peer, tracked for event fan-out.
pub struct WsPeer {
    /// Outbound message channel into the socket task.
    pub sender: mpsc::UnboundedSender<ServerMessage>,
    /// Topics this peer subscribed to.
    pub subscriptions: HashSet<Topic>,
}

/// Registry of connected WebSocket peers.
pub type WsPeerRegistry = Arc<Mutex<HashMap<String, WsPeer>>>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The MCP host.
    pub host: McpHost,

    /// Bridge configuration.
    pub config: Arc<BridgeConfig>,

    /// Session registry.
    pub sessions: SessionManager,

    /// Connected WebSocket peers.
    pub ws_peers: WsPeerRegistry,
}

impl AppState {
    /// Create the application state, wiring the session registry and the
    /// configured sampling timeout into the host's broker.
    pub fn new(host: McpHost, config: BridgeConfig) -> Self {
        host.set_sampling_timeout(config.sampling_timeout);
        let sessions = SessionManager::new(config.session_ttl, host.sampling());

        Self {
            host,
            config: Arc::new(config),
            sessions,
            ws_peers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Send a broadcast event to every connected WebSocket peer.
    pub fn ws_broadcast(&self, event: &str, data: &serde_json::Value) {
        let mut peers = self.ws_peers.lock().unwrap();
        peers.retain(|_, peer| {
            peer.sender
                .send(ServerMessage::event(event, data.clone()))
                .is_ok()
        });
    }

    /// Send a filtered event to WebSocket peers whose subscriptions match.
    pub fn ws_broadcast_matching(
        &self,
        event: &str,
        data: &serde_json::Value,
        predicate: impl Fn(&HashSet<Topic>) -> bool,
    ) {
        let mut peers = self.ws_peers.lock().unwrap();
        peers.retain(|_, peer| {
            if !predicate(&peer.subscriptions) {
                return true;
            }
            peer.sender
                .send(ServerMessage::event(event, data.clone()))
                .is_ok()
        });
    }
}
