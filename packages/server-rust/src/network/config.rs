//! Listener configuration of the edge server.

use std::time::Duration;

/// Bind address and per-request limits of the inbound HTTP listener.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Maximum time to answer a request, including all backend calls.
    pub request_timeout: Duration,
    /// Largest inbound request body the edge buffers for forwarding.
    pub max_body_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            request_timeout: Duration::from_secs(60),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}
