//! Host configuration.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use switchboard_mcp::{HostCapabilities, HostInfo, ServerConfig};

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// Identity announced to every server.
    #[serde(default)]
    pub host_info: HostInfo,
    /// Capabilities announced to every server.
    #[serde(default)]
    pub host_capabilities: HostCapabilities,
    /// Servers to connect to.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

impl HostConfig {
    /// Create a config with the given servers and default identity.
    pub fn with_servers(servers: Vec<ServerConfig>) -> Self {
        Self {
            servers,
            ..Default::default()
        }
    }

    /// Load from a JSON file.
    ///
    /// A missing or unparseable file falls back to the defaults with a
    /// warning; a broken config should not keep the host from starting.
    pub fn load_or_default(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "config file unreadable, using defaults"
                );
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "config file unparseable, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Drop duplicate server ids, keeping the first occurrence of each.
    pub fn dedupe_servers(&mut self) {
        let mut seen = HashSet::new();
        self.servers.retain(|server| {
            if seen.insert(server.id.clone()) {
                true
            } else {
                tracing::warn!(
                    server = %server.id,
                    "duplicate server id in configuration, keeping the first"
                );
                false
            }
        });
    }
}
