use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time to wait for a correlated reply
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

/// Default upper bound on requests waiting for a reply, per device
pub const DEFAULT_MAX_PENDING: usize = 1000;

/// Client configuration shared by devices, discovery and the registry
///
/// Every field has a default, so a partial JSON/TOML document deserializes
/// into a usable configuration.
///
/// # Example
///
/// ```
/// use yeelight_lan::Config;
/// use std::time::Duration;
///
/// let config = Config::default()
///     .with_request_timeout(Duration::from_secs(2))
///     .with_verbose(true);
/// assert_eq!(config.request_timeout(), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Time to wait for a reply before failing a request
    pub request_timeout_ms: u64,

    /// Time allowed for establishing the TCP stream
    pub connect_timeout_ms: u64,

    /// Time allowed for the liveness check used by health filtering
    pub health_timeout_ms: u64,

    /// Listening window after the discovery query is sent
    pub discovery_timeout_ms: u64,

    /// Maximum number of requests awaiting a reply on one device
    pub max_pending: usize,

    /// Log every request and reply at debug level
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: 5000,
            health_timeout_ms: 1000,
            discovery_timeout_ms: 5000,
            max_pending: DEFAULT_MAX_PENDING,
            verbose: false,
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// Set the reply timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = millis(timeout);
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = millis(timeout);
        self
    }

    /// Set the health check timeout
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout_ms = millis(timeout);
        self
    }

    /// Set the discovery listening window
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout_ms = millis(timeout);
        self
    }

    /// Set the pending request ceiling
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Enable or disable wire-level debug logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
