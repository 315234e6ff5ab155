//! WebSocket connection lifecycle.
//!
//! Each accepted socket gets a connection id, a greeting, a place in the
//! peer registry (for event fan-out), and a broker sink registration (for
//! sampling delivery). The socket task multiplexes outbound messages,
//! inbound client messages, and a periodic ping.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use switchboard_host::{SamplingEnvelope, SamplingSink, SinkKind};

use super::protocol::{ClientMessage, ServerMessage};
use crate::session::Topic;
use crate::state::{AppState, WsPeer};

/// Broker sink backed by a WebSocket peer's outbound channel.
struct WsSamplingSink {
    connection_id: String,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl SamplingSink for WsSamplingSink {
    fn sink_id(&self) -> &str {
        &self.connection_id
    }

    fn kind(&self) -> SinkKind {
        SinkKind::WebSocket
    }

    fn try_deliver(&self, envelope: &SamplingEnvelope) -> bool {
        self.sender
            .send(ServerMessage::SamplingRequest {
                request_id: envelope.request_id.clone(),
                server_id: envelope.server_id.clone(),
                params: envelope.params.clone(),
            })
            .is_ok()
    }
}

/// Drive one accepted WebSocket until it closes.
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

    state.ws_peers.lock().unwrap().insert(
        connection_id.clone(),
        WsPeer {
            sender: outbound_tx.clone(),
            subscriptions: HashSet::new(),
        },
    );

    let broker = state.host.sampling();
    broker.register_sink(Arc::new(WsSamplingSink {
        connection_id: connection_id.clone(),
        sender: outbound_tx.clone(),
    }));

    let _ = outbound_tx.send(ServerMessage::Connection {
        connection_id: connection_id.clone(),
    });

    tracing::debug!(connection = %connection_id, "WebSocket connection established");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut ping = tokio::time::interval(state.config.ws_ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.tick().await; // immediate first tick

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else { break };
                let Ok(json) = serde_json::to_string(&message) else { continue };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&text, &connection_id, &state, &outbound_tx);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {
                        let _ = outbound_tx.send(ServerMessage::error(
                            "invalid_message",
                            "binary frames are not supported",
                        ));
                    }
                    Some(Err(e)) => {
                        tracing::warn!(connection = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.ws_peers.lock().unwrap().remove(&connection_id);
    // Dropping the peer also fails any sampling still parked on it.
    broker.unregister_sink(&connection_id);

    tracing::debug!(connection = %connection_id, "WebSocket connection closed");
}

fn handle_text(
    text: &str,
    connection_id: &str,
    state: &AppState,
    outbound: &mpsc::UnboundedSender<ServerMessage>,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            let _ = outbound.send(ServerMessage::error(
                "parse_error",
                format!("invalid message: {e}"),
            ));
            return;
        }
    };

    match message {
        ClientMessage::Subscribe { topic } => {
            let Some(topic) = Topic::parse(&topic) else {
                let _ = outbound.send(ServerMessage::error("invalid_topic", topic));
                return;
            };
            if let Some(peer) = state.ws_peers.lock().unwrap().get_mut(connection_id) {
                peer.subscriptions.insert(topic);
            }
        }
        ClientMessage::Unsubscribe { topic } => {
            let Some(topic) = Topic::parse(&topic) else {
                let _ = outbound.send(ServerMessage::error("invalid_topic", topic));
                return;
            };
            if let Some(peer) = state.ws_peers.lock().unwrap().get_mut(connection_id) {
                peer.subscriptions.remove(&topic);
            }
        }
        ClientMessage::SamplingResponse { request_id, result } => {
            // Unknown ids are logged by the broker and dropped.
            state.host.sampling().complete(&request_id, Ok(result));
        }
        ClientMessage::SamplingError { request_id, error } => {
            state.host.sampling().complete(&request_id, Err(error));
        }
        ClientMessage::Ping => {
            let _ = outbound.send(ServerMessage::Pong);
        }
    }
}
