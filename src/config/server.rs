//! # Server Configuration
//!
//! HTTP server settings loaded from environment variables.

use super::controller::env_var_or_default;
use std::time::Duration;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for the sync webhook, metrics and probes
    pub port: u16,
    /// How long to wait for the server to bind before giving up
    pub startup_timeout_secs: u64,
    /// How often to poll for server readiness during startup
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            port: DEFAULT_SERVER_PORT,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            port: env_var_or_default("PORT", DEFAULT_SERVER_PORT),
            startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
