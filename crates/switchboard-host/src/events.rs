//! Typed host event broadcasting.
//!
//! One broadcast channel carries a typed [`HostEvent`] enum; the bus
//! exposes one emit method per event kind so call sites cannot construct
//! mismatched payloads. Listeners that fall behind lose old events rather
//! than blocking emitters.

use serde_json::Value;
use tokio::sync::broadcast;

/// Capacity of the event channel. Slow subscribers past this lag see
/// `RecvError::Lagged` and continue from the oldest retained event.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// An event emitted by the host engine.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// A server connection was established.
    ServerConnected {
        /// The connected server.
        server_id: String,
    },
    /// A server connection went away.
    ServerDisconnected {
        /// The disconnected server.
        server_id: String,
        /// Closure description, when the disconnect was not clean.
        error: Option<String>,
    },
    /// A server-level error that did not take the connection down.
    ServerError {
        /// The offending server.
        server_id: String,
        /// Error description.
        error: String,
    },
    /// The aggregated capability maps changed.
    CapabilitiesUpdated,
    /// A subscribed resource changed on its server.
    ResourceUpdated {
        /// The owning server.
        server_id: String,
        /// The resource URI.
        uri: String,
    },
    /// A server emitted a log message.
    Log {
        /// The originating server.
        server_id: String,
        /// Composite level, `server-<level>`.
        level: String,
        /// Log payload.
        data: Value,
    },
    /// A sampling request was accepted by the broker.
    SamplingRequested {
        /// The originating server.
        server_id: String,
        /// Broker-assigned request id.
        request_id: String,
    },
}

/// Broadcast bus for host events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HostEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new bus.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all host events.
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: HostEvent) {
        // A send error only means nobody is listening.
        let _ = self.tx.send(event);
    }

    /// Emit `ServerConnected`.
    pub fn server_connected(&self, server_id: &str) {
        self.emit(HostEvent::ServerConnected {
            server_id: server_id.to_string(),
        });
    }

    /// Emit `ServerDisconnected`.
    pub fn server_disconnected(&self, server_id: &str, error: Option<String>) {
        self.emit(HostEvent::ServerDisconnected {
            server_id: server_id.to_string(),
            error,
        });
    }

    /// Emit `ServerError`.
    pub fn server_error(&self, server_id: &str, error: &str) {
        self.emit(HostEvent::ServerError {
            server_id: server_id.to_string(),
            error: error.to_string(),
        });
    }

    /// Emit `CapabilitiesUpdated`.
    pub fn capabilities_updated(&self) {
        self.emit(HostEvent::CapabilitiesUpdated);
    }

    /// Emit `ResourceUpdated`.
    pub fn resource_updated(&self, server_id: &str, uri: &str) {
        self.emit(HostEvent::ResourceUpdated {
            server_id: server_id.to_string(),
            uri: uri.to_string(),
        });
    }

    /// Emit `Log` with the composite `server-<level>` level.
    pub fn server_log(&self, server_id: &str, level: &str, data: Value) {
        self.emit(HostEvent::Log {
            server_id: server_id.to_string(),
            level: format!("server-{level}"),
            data,
        });
    }

    /// Emit `SamplingRequested`.
    pub fn sampling_requested(&self, server_id: &str, request_id: &str) {
        self.emit(HostEvent::SamplingRequested {
            server_id: server_id.to_string(),
            request_id: request_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_typed_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.server_connected("files");
        bus.capabilities_updated();

        match rx.recv().await.unwrap() {
            HostEvent::ServerConnected { server_id } => assert_eq!(server_id, "files"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            HostEvent::CapabilitiesUpdated
        ));
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.server_error("files", "boom");
    }

    #[tokio::test]
    async fn test_log_level_is_composite() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.server_log("files", "warning", serde_json::json!("disk almost full"));

        match rx.recv().await.unwrap() {
            HostEvent::Log { level, .. } => assert_eq!(level, "server-warning"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
