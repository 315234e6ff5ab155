//! Background tasks and orderly shutdown.
//!
//! Two long-lived tasks run next to the HTTP server: the event pump fans
//! host events out to SSE sessions and WebSocket peers, and the sweeper
//! reclaims idle sessions. Shutdown stops both, destroys all sessions
//! (failing their pending sampling), stops the host, and gives the whole
//! teardown a bounded grace period.

use serde_json::Value;
use tokio::task::JoinHandle;

use switchboard_host::HostEvent;

use crate::session::Topic;
use crate::state::AppState;

/// Spawn the host-event fan-out pump.
pub fn spawn_event_pump(state: AppState) -> JoinHandle<()> {
    let mut events = state.host.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => fan_out(&state, event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event pump lagged, dropping events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Route one host event to the sinks that should see it.
///
/// Connect/disconnect/capability updates broadcast unconditionally;
/// resource updates and logs honor subscriptions.
fn fan_out(state: &AppState, event: HostEvent) {
    match event {
        HostEvent::ServerConnected { server_id } => {
            let data = serde_json::json!({"serverId": server_id});
            state.sessions.broadcast("serverConnected", &data);
            state.ws_broadcast("serverConnected", &data);
        }
        HostEvent::ServerDisconnected { server_id, error } => {
            let data = serde_json::json!({"serverId": server_id, "error": error});
            state.sessions.broadcast("serverDisconnected", &data);
            state.ws_broadcast("serverDisconnected", &data);
        }
        HostEvent::CapabilitiesUpdated => {
            let data = serde_json::json!({});
            state.sessions.broadcast("capabilitiesUpdated", &data);
            state.ws_broadcast("capabilitiesUpdated", &data);
        }
        HostEvent::ResourceUpdated { server_id, uri } => {
            let data = serde_json::json!({"serverId": server_id, "uri": uri});
            state.sessions.broadcast_resource_updated(&server_id, &uri, &data);
            state.ws_broadcast_matching("resourceUpdated", &data, |subs| {
                Topic::matches_resource(subs, &server_id, &uri)
            });
        }
        HostEvent::Log {
            server_id,
            level,
            data,
        } => {
            let payload: Value =
                serde_json::json!({"serverId": server_id, "level": level, "data": data});
            state.sessions.broadcast_log(&server_id, &payload);
            state.ws_broadcast_matching("log", &payload, |subs| {
                Topic::matches_server(subs, &server_id)
            });
        }
        // Errors are logged where they happen; sampling requests travel
        // through their sink, not the broadcast path.
        HostEvent::ServerError { .. } | HostEvent::SamplingRequested { .. } => {}
    }
}

/// Spawn the periodic idle-session sweeper.
pub fn spawn_session_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await; // the immediate first tick

        loop {
            interval.tick().await;
            let swept = state.sessions.sweep();
            if swept > 0 {
                tracing::info!(swept, "idle sessions reclaimed");
            }
        }
    })
}

/// Tear the bridge down: sessions first (their sinks and pending sampling
/// die here), then WebSocket peers, then the host itself.
pub async fn teardown(state: &AppState) {
    state.sessions.destroy_all();
    state.ws_peers.lock().unwrap().clear();
    state.host.stop().await;
}

/// Resolves on ctrl-c.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
