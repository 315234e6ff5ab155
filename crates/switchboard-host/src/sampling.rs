//! Sampling broker: the return path for server-initiated generation.
//!
//! When a server sends `sampling/createMessage`, the connection's observer
//! hands the request to the broker. The broker either answers in-process
//! (when a local handler is installed) or forwards the request to an
//! external sink (a WebSocket peer or an SSE session) and parks a one-shot
//! completion until the answer, an error, a timeout, or the sink's death
//! resolves it. A pending completion fires exactly once, ever: every path
//! must first remove it from the pending map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use switchboard_mcp::{CreateMessageResult, JsonRpcError};

use crate::events::EventBus;

/// Default deadline for a relayed sampling request.
pub const DEFAULT_SAMPLING_TIMEOUT: Duration = Duration::from_secs(300);

/// What kind of channel a sink is. WebSocket peers outrank SSE sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SinkKind {
    /// A connected WebSocket peer.
    WebSocket,
    /// A session with a writable SSE stream.
    Sse,
}

/// A sampling request on its way to an external sink.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingEnvelope {
    /// Broker-assigned request id, echoed back in the response.
    pub request_id: String,
    /// The server that originated the request.
    pub server_id: String,
    /// The raw `createMessage` parameters.
    pub params: Value,
}

/// An outbound channel able to carry sampling requests to a client.
pub trait SamplingSink: Send + Sync {
    /// Stable identifier (connection id or session id).
    fn sink_id(&self) -> &str;

    /// Ranking class of this sink.
    fn kind(&self) -> SinkKind;

    /// Attempt delivery. Returning `false` means the sink is unusable and
    /// the broker should try the next candidate.
    fn try_deliver(&self, envelope: &SamplingEnvelope) -> bool;
}

/// Simplified handler return shape, adapted into [`CreateMessageResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingReply {
    /// Generated content: either a plain string or a full content block.
    pub content: Value,
    /// Model that produced the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Why generation stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Token usage, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

impl SamplingReply {
    /// Adapt into the full MCP result shape.
    pub fn into_result(self) -> CreateMessageResult {
        let content = match self.content {
            Value::String(text) => serde_json::json!({"type": "text", "text": text}),
            other => other,
        };
        CreateMessageResult {
            role: "assistant".to_string(),
            content,
            model: self.model,
            stop_reason: self.stop_reason,
        }
    }
}

/// An in-process sampling handler.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    /// Handle one sampling request.
    async fn handle(
        &self,
        server_id: &str,
        params: Value,
    ) -> std::result::Result<SamplingReply, JsonRpcError>;
}

struct PendingRequest {
    server_id: String,
    sink_id: String,
    tx: oneshot::Sender<std::result::Result<CreateMessageResult, JsonRpcError>>,
}

/// Relays server-originated sampling requests to whoever can answer them.
pub struct SamplingBroker {
    timeout: Mutex<Duration>,
    sinks: Mutex<Vec<Arc<dyn SamplingSink>>>,
    pending: Mutex<HashMap<String, PendingRequest>>,
    handler: Mutex<Option<Arc<dyn SamplingHandler>>>,
    events: EventBus,
}

impl SamplingBroker {
    /// Create a broker publishing on the given event bus.
    pub fn new(events: EventBus) -> Self {
        Self {
            timeout: Mutex::new(DEFAULT_SAMPLING_TIMEOUT),
            sinks: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            handler: Mutex::new(None),
            events,
        }
    }

    /// Change the per-request deadline.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock().unwrap() = timeout;
    }

    /// The current per-request deadline.
    pub fn timeout(&self) -> Duration {
        *self.timeout.lock().unwrap()
    }

    /// Install an in-process handler. Takes priority over sinks.
    pub fn set_handler(&self, handler: Arc<dyn SamplingHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    /// Remove the in-process handler.
    pub fn clear_handler(&self) {
        *self.handler.lock().unwrap() = None;
    }

    /// Register an external sink.
    pub fn register_sink(&self, sink: Arc<dyn SamplingSink>) {
        let mut sinks = self.sinks.lock().unwrap();
        sinks.retain(|s| s.sink_id() != sink.sink_id());
        sinks.push(sink);
    }

    /// Remove a sink and fail every pending request routed through it.
    pub fn unregister_sink(&self, sink_id: &str) {
        self.sinks.lock().unwrap().retain(|s| s.sink_id() != sink_id);
        self.fail_sink(sink_id, "sampling channel closed before a response arrived");
    }

    /// Fail all pending requests tied to a sink without touching the
    /// registry (used when a session dies out from under its sink).
    pub fn fail_sink(&self, sink_id: &str, reason: &str) {
        let drained: Vec<PendingRequest> = {
            let mut pending = self.pending.lock().unwrap();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, p)| p.sink_id == sink_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id))
                .collect()
        };

        for request in drained {
            tracing::warn!(
                server = %request.server_id,
                sink = %sink_id,
                "failing pending sampling request: {reason}"
            );
            let _ = request.tx.send(Err(JsonRpcError::internal(reason.to_string())));
        }
    }

    /// Number of requests still waiting for completion.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Deliver a completion from the outside. Returns `false` for unknown
    /// request ids, which are logged and discarded.
    pub fn complete(
        &self,
        request_id: &str,
        outcome: std::result::Result<CreateMessageResult, JsonRpcError>,
    ) -> bool {
        let Some(request) = self.pending.lock().unwrap().remove(request_id) else {
            tracing::warn!(request_id = %request_id, "sampling completion for unknown request id");
            return false;
        };
        let _ = request.tx.send(outcome);
        true
    }

    /// Relay a server-originated sampling request and wait for its answer.
    pub async fn relay(
        &self,
        server_id: &str,
        params: Value,
    ) -> std::result::Result<CreateMessageResult, JsonRpcError> {
        // An in-process handler short-circuits the sink machinery.
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            return handler.handle(server_id, params).await.map(SamplingReply::into_result);
        }

        let request_id = Uuid::new_v4().to_string();
        let envelope = SamplingEnvelope {
            request_id: request_id.clone(),
            server_id: server_id.to_string(),
            params,
        };

        let (tx, rx) = oneshot::channel();
        let Some(sink_id) = self.dispatch(&envelope, tx) else {
            return Err(JsonRpcError::internal(
                "no active client to handle sampling request",
            ));
        };

        tracing::debug!(
            server = %server_id,
            request_id = %request_id,
            sink = %sink_id,
            "sampling request dispatched"
        );
        self.events.sampling_requested(server_id, &request_id);

        let timeout = self.timeout();
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_closed)) => Err(JsonRpcError::internal(
                "sampling completion dropped without firing",
            )),
            Err(_elapsed) => {
                // The entry may already be gone if a completion raced the
                // deadline; in that case the oneshot held the result and we
                // still honor the timeout consistently.
                self.pending.lock().unwrap().remove(&request_id);
                Err(JsonRpcError::request_timeout(format!(
                    "no sampling response within {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    /// Park the completion and hand the envelope to the best-ranked sink.
    /// Returns the sink id that accepted delivery.
    fn dispatch(
        &self,
        envelope: &SamplingEnvelope,
        tx: oneshot::Sender<std::result::Result<CreateMessageResult, JsonRpcError>>,
    ) -> Option<String> {
        let candidates: Vec<Arc<dyn SamplingSink>> = {
            let sinks = self.sinks.lock().unwrap();
            let mut ordered: Vec<Arc<dyn SamplingSink>> = sinks.clone();
            // Stable sort keeps first-registered-first within each kind.
            ordered.sort_by_key(|s| s.kind());
            ordered
        };

        let mut tx = Some(tx);
        for sink in candidates {
            let sink_id = sink.sink_id().to_string();
            {
                let mut pending = self.pending.lock().unwrap();
                pending.insert(
                    envelope.request_id.clone(),
                    PendingRequest {
                        server_id: envelope.server_id.clone(),
                        sink_id: sink_id.clone(),
                        tx: tx.take().expect("sender reused"),
                    },
                );
            }

            if sink.try_deliver(envelope) {
                return Some(sink_id);
            }

            // Delivery refused: reclaim the sender and try the next sink.
            let reclaimed = self.pending.lock().unwrap().remove(&envelope.request_id);
            match reclaimed {
                Some(request) => tx = Some(request.tx),
                None => return Some(sink_id),
            }
        }

        None
    }
}
