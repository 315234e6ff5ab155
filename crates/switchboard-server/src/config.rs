//! Bridge configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Default MCP endpoint path.
pub const DEFAULT_ENDPOINT_PATH: &str = "/mcp";

/// Default API port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default session idle TTL (1 hour).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Default sweep cadence for idle sessions.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default sampling relay timeout (30 seconds).
pub const DEFAULT_SAMPLING_TIMEOUT: Duration = Duration::from_secs(30);

/// Default SSE heartbeat cadence.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Default WebSocket ping cadence.
pub const DEFAULT_WS_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default grace period before shutdown is forced.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Path of the MCP endpoint.
    pub endpoint_path: String,

    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// How long a session may idle before the sweeper reclaims it.
    pub session_ttl: Duration,

    /// How often the session sweeper runs.
    pub sweep_interval: Duration,

    /// Deadline for relayed sampling requests.
    pub sampling_timeout: Duration,

    /// Accepted API keys. Empty means no keys are configured.
    pub api_keys: Vec<String>,

    /// Whether requests must authenticate. Defaults to true iff any keys
    /// are configured.
    pub auth_required: bool,

    /// SSE heartbeat cadence.
    pub heartbeat_interval: Duration,

    /// WebSocket ping cadence.
    pub ws_ping_interval: Duration,

    /// Grace period before shutdown is forced.
    pub shutdown_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            bind_address: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            session_ttl: DEFAULT_SESSION_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sampling_timeout: DEFAULT_SAMPLING_TIMEOUT,
            api_keys: Vec::new(),
            auth_required: false,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            ws_ping_interval: DEFAULT_WS_PING_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl BridgeConfig {
    /// Build a config from the `SWITCHBOARD_*` environment variables,
    /// falling back to the documented defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("SWITCHBOARD_MCP_PATH")
            && !path.is_empty()
        {
            config.endpoint_path = path;
        }
        if let Some(port) = env_parse::<u16>("SWITCHBOARD_PORT") {
            config.bind_address = SocketAddr::from(([127, 0, 0, 1], port));
        }
        if let Some(ms) = env_parse::<u64>("SWITCHBOARD_SESSION_TTL_MS") {
            config.session_ttl = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("SWITCHBOARD_SAMPLING_TIMEOUT_MS") {
            config.sampling_timeout = Duration::from_millis(ms);
        }
        if let Ok(keys) = std::env::var("SWITCHBOARD_API_KEYS") {
            config.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        config.auth_required = match env_parse::<bool>("SWITCHBOARD_AUTH_REQUIRED") {
            Some(required) => required,
            None => !config.api_keys.is_empty(),
        };

        config
    }

    /// Set the MCP endpoint path.
    pub fn with_endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.endpoint_path = path.into();
        self
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Set the session idle TTL.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set the sampling relay timeout.
    pub fn with_sampling_timeout(mut self, timeout: Duration) -> Self {
        self.sampling_timeout = timeout;
        self
    }

    /// Set the accepted API keys and require auth.
    pub fn with_api_keys(mut self, keys: Vec<String>) -> Self {
        self.auth_required = !keys.is_empty();
        self.api_keys = keys;
        self
    }

    /// Explicitly enable or disable auth.
    pub fn with_auth_required(mut self, required: bool) -> Self {
        self.auth_required = required;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(var = %name, value = %value, "unparseable environment variable ignored");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.endpoint_path, "/mcp");
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.sampling_timeout, Duration::from_secs(30));
        assert!(!config.auth_required);
    }

    #[test]
    fn test_with_api_keys_enables_auth() {
        let config = BridgeConfig::default().with_api_keys(vec!["k1".to_string()]);
        assert!(config.auth_required);

        let config = BridgeConfig::default().with_api_keys(vec![]);
        assert!(!config.auth_required);
    }

    #[test]
    fn test_auth_can_be_forced_without_keys() {
        let config = BridgeConfig::default().with_auth_required(true);
        assert!(config.auth_required);
        assert!(config.api_keys.is_empty());
    }
}
