//! In-memory session registry for the HTTP bridge.
//!
//! A session is created by `initialize` and identified by the
//! `Mcp-Session-Id` header from then on. Each session buffers its most
//! recent events (for `Last-Event-ID` replay), may hold one live SSE sink,
//! and tracks topic subscriptions. Sessions idle past the TTL are swept
//! once a minute.
//!
//! Session ids are random UUIDs; a destroyed id is never handed out again.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use switchboard_host::{SamplingBroker, SamplingEnvelope, SamplingSink, SinkKind};

/// Maximum number of buffered events per session.
pub const EVENT_BUFFER_CAPACITY: usize = 100;

/// A broadcast subscription topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Catch-all for resource updates.
    AllResources,
    /// One specific resource.
    Resource(String),
    /// Everything from one server.
    Server(String),
}

impl Topic {
    /// Parse the wire form: `resources`, `resource:<uri>`, `server:<id>`.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "resources" {
            return Some(Self::AllResources);
        }
        if let Some(uri) = raw.strip_prefix("resource:") {
            return Some(Self::Resource(uri.to_string()));
        }
        if let Some(server_id) = raw.strip_prefix("server:") {
            return Some(Self::Server(server_id.to_string()));
        }
        None
    }

    /// Whether a set of subscriptions wants a resource-update event.
    pub fn matches_resource(subscriptions: &HashSet<Topic>, server_id: &str, uri: &str) -> bool {
        subscriptions.iter().any(|topic| match topic {
            Topic::AllResources => true,
            Topic::Resource(u) => u == uri,
            Topic::Server(s) => s == server_id,
        })
    }

    /// Whether a set of subscriptions wants a server log event.
    pub fn matches_server(subscriptions: &HashSet<Topic>, server_id: &str) -> bool {
        subscriptions
            .iter()
            .any(|topic| matches!(topic, Topic::Server(s) if s == server_id))
    }
}

/// One buffered (or in-flight) SSE event.
#[derive(Debug, Clone)]
pub struct BufferedEvent {
    /// Session-monotonic event id.
    pub id: u64,
    /// Event name.
    pub event: String,
    /// JSON-encoded payload.
    pub data: String,
}

struct ActiveSink {
    epoch: u64,
    sender: mpsc::UnboundedSender<BufferedEvent>,
    sink_id: String,
}

struct SessionState {
    last_activity: Instant,
    next_event_id: u64,
    buffer: VecDeque<BufferedEvent>,
    sink: Option<ActiveSink>,
    subscriptions: HashSet<Topic>,
    sink_epochs: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            last_activity: Instant::now(),
            next_event_id: 1,
            buffer: VecDeque::with_capacity(EVENT_BUFFER_CAPACITY),
            sink: None,
            subscriptions: HashSet::new(),
            sink_epochs: 0,
        }
    }
}

/// Handle to the session registry. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    sessions: Mutex<HashMap<String, SessionState>>,
    ttl: Duration,
    broker: Arc<SamplingBroker>,
}

impl SessionManager {
    /// Create a registry with the given idle TTL.
    pub fn new(ttl: Duration, broker: Arc<SamplingBroker>) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                ttl,
                broker,
            }),
        }
    }

    /// Create a fresh session and return its id.
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.inner
            .sessions
            .lock()
            .unwrap()
            .insert(id.clone(), SessionState::new());
        tracing::debug!(session = %id, "session created");
        id
    }

    /// Whether the session exists; refreshes its activity clock.
    pub fn touch(&self, session_id: &str) -> bool {
        let mut sessions = self.inner.sessions.lock().unwrap();
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.sessions.lock().unwrap().len()
    }

    /// Whether no sessions exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue an event for one session.
    ///
    /// Assigns the next monotonic id, appends to the replay buffer
    /// (evicting the oldest beyond capacity), and pushes to the live sink
    /// if there is one. A dead sink is dropped without rolling back the
    /// event id; the gap is recoverable via `Last-Event-ID` replay.
    ///
    /// Returns the assigned event id, or `None` for an unknown session.
    pub fn enqueue(&self, session_id: &str, event: &str, data: &Value) -> Option<u64> {
        let mut dead_sink: Option<String> = None;
        let assigned = {
            let mut sessions = self.inner.sessions.lock().unwrap();
            let session = sessions.get_mut(session_id)?;

            let id = session.next_event_id;
            session.next_event_id += 1;

            let buffered = BufferedEvent {
                id,
                event: event.to_string(),
                data: data.to_string(),
            };

            if session.buffer.len() == EVENT_BUFFER_CAPACITY {
                session.buffer.pop_front();
            }
            session.buffer.push_back(buffered.clone());

            if let Some(sink) = &session.sink
                && sink.sender.send(buffered).is_err()
            {
                dead_sink = Some(sink.sink_id.clone());
                session.sink = None;
            }

            Some(id)
        };

        if let Some(sink_id) = dead_sink {
            tracing::debug!(session = %session_id, "SSE sink dead, dropping it");
            self.inner
                .broker
                .unregister_sink(&sink_id);
        }

        assigned
    }

    /// Attach an SSE sink, replacing any previous one.
    ///
    /// Buffered events with id greater than `last_event_id` are replayed
    /// into the new channel before it goes live. Returns the receiver to
    /// drive the SSE response and the epoch for a later [`detach_sink`].
    ///
    /// [`detach_sink`]: SessionManager::detach_sink
    pub fn attach_sink(
        &self,
        session_id: &str,
        last_event_id: Option<u64>,
    ) -> Option<(mpsc::UnboundedReceiver<BufferedEvent>, u64)> {
        let (old_sink, result) = {
            let mut sessions = self.inner.sessions.lock().unwrap();
            let session = sessions.get_mut(session_id)?;
            session.last_activity = Instant::now();

            let (tx, rx) = mpsc::unbounded_channel();

            if let Some(last) = last_event_id {
                for event in session.buffer.iter().filter(|e| e.id > last) {
                    let _ = tx.send(event.clone());
                }
            }

            session.sink_epochs += 1;
            let epoch = session.sink_epochs;
            let sink_id = format!("sse:{session_id}:{epoch}");
            let old_sink = session.sink.replace(ActiveSink {
                epoch,
                sender: tx,
                sink_id: sink_id.clone(),
            });

            (old_sink, Some((rx, epoch, sink_id)))
        };

        let (rx, epoch, sink_id) = result?;

        // The replaced sink's pending sampling dies with it.
        if let Some(old) = old_sink {
            self.inner.broker.unregister_sink(&old.sink_id);
        }

        self.inner.broker.register_sink(Arc::new(SessionSamplingSink {
            manager: self.clone(),
            session_id: session_id.to_string(),
            sink_id,
        }));

        Some((rx, epoch))
    }

    /// Drop the SSE sink attached at `epoch`, if it is still the current
    /// one. A stale epoch (the sink was already replaced) is a no-op.
    pub fn detach_sink(&self, session_id: &str, epoch: u64) {
        let removed = {
            let mut sessions = self.inner.sessions.lock().unwrap();
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };
            match &session.sink {
                Some(sink) if sink.epoch == epoch => session.sink.take(),
                _ => None,
            }
        };

        if let Some(sink) = removed {
            tracing::debug!(session = %session_id, "SSE sink detached");
            self.inner.broker.unregister_sink(&sink.sink_id);
        }
    }

    /// Whether the session currently has a live SSE sink.
    pub fn has_sink(&self, session_id: &str) -> bool {
        self.inner
            .sessions
            .lock()
            .unwrap()
            .get(session_id)
            .is_some_and(|s| s.sink.is_some())
    }

    /// Add a subscription topic.
    pub fn subscribe(&self, session_id: &str, topic: Topic) -> bool {
        let mut sessions = self.inner.sessions.lock().unwrap();
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.subscriptions.insert(topic);
                true
            }
            None => false,
        }
    }

    /// Remove a subscription topic.
    pub fn unsubscribe(&self, session_id: &str, topic: &Topic) -> bool {
        let mut sessions = self.inner.sessions.lock().unwrap();
        match sessions.get_mut(session_id) {
            Some(session) => session.subscriptions.remove(topic),
            None => false,
        }
    }

    /// Destroy a session: close its sink, fail its pending sampling,
    /// remove it. Returns whether anything was removed.
    pub fn destroy(&self, session_id: &str) -> bool {
        let removed = self.inner.sessions.lock().unwrap().remove(session_id);
        let Some(session) = removed else {
            return false;
        };

        if let Some(sink) = session.sink {
            self.inner.broker.unregister_sink(&sink.sink_id);
        }
        tracing::debug!(session = %session_id, "session destroyed");
        true
    }

    /// Destroy every session (shutdown path).
    pub fn destroy_all(&self) {
        let ids: Vec<String> = self.inner.sessions.lock().unwrap().keys().cloned().collect();
        for id in ids {
            self.destroy(&id);
        }
    }

    /// Destroy sessions idle past the TTL. Returns how many died.
    pub fn sweep(&self) -> usize {
        let expired: Vec<String> = {
            let sessions = self.inner.sessions.lock().unwrap();
            sessions
                .iter()
                .filter(|(_, s)| s.last_activity.elapsed() > self.inner.ttl)
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in &expired {
            tracing::info!(session = %id, "session expired");
            self.destroy(id);
        }
        expired.len()
    }

    /// Push an event to every session.
    pub fn broadcast(&self, event: &str, data: &Value) {
        for session_id in self.session_ids() {
            self.enqueue(&session_id, event, data);
        }
    }

    /// Push a resource-update event to sessions whose subscriptions match.
    pub fn broadcast_resource_updated(&self, server_id: &str, uri: &str, data: &Value) {
        for session_id in self.sessions_matching(|subs| Topic::matches_resource(subs, server_id, uri))
        {
            self.enqueue(&session_id, "resourceUpdated", data);
        }
    }

    /// Push a log event to sessions subscribed to the server.
    pub fn broadcast_log(&self, server_id: &str, data: &Value) {
        for session_id in self.sessions_matching(|subs| Topic::matches_server(subs, server_id)) {
            self.enqueue(&session_id, "log", data);
        }
    }

    fn session_ids(&self) -> Vec<String> {
        self.inner.sessions.lock().unwrap().keys().cloned().collect()
    }

    fn sessions_matching(&self, predicate: impl Fn(&HashSet<Topic>) -> bool) -> Vec<String> {
        self.inner
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| predicate(&s.subscriptions))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Broker sink that funnels sampling requests into a session's event
/// stream.
struct SessionSamplingSink {
    manager: SessionManager,
    session_id: String,
    sink_id: String,
}

impl SamplingSink for SessionSamplingSink {
    fn sink_id(&self) -> &str {
        &self.sink_id
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Sse
    }

    fn try_deliver(&self, envelope: &SamplingEnvelope) -> bool {
        if !self.manager.has_sink(&self.session_id) {
            return false;
        }
        let data = match serde_json::to_value(envelope) {
            Ok(data) => data,
            Err(_) => return false,
        };
        self.manager
            .enqueue(&self.session_id, "sampling_request", &data)
            .is_some()
    }
}
