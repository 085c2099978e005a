//! HTTP Server Configuration
//!
//! Bind address, handling timeouts and request limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::TimeoutPolicy;

/// HTTP server section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Handling timeout for most routes
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Handling timeout for the book listing
    #[serde(default = "default_long_request_timeout")]
    pub long_request_timeout_secs: u64,

    /// Grace period for in-flight work at shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Abandoned handlers tolerated before warning
    #[serde(default = "default_max_lingering")]
    pub max_lingering_handlers: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_long_request_timeout() -> u64 {
    120
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_max_lingering() -> u64 {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            long_request_timeout_secs: default_long_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_body_bytes: default_max_body_bytes(),
            max_lingering_handlers: default_max_lingering(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy::new(
            Duration::from_secs(self.request_timeout_secs),
            Duration::from_secs(self.long_request_timeout_secs),
        )
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
