use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the network layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Request timeout in seconds; bounds every remote call, the
    /// broker-forwarding path included
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Maximum message size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_message_size() -> usize {
    1_000_000 // 1MB
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl NetworkConfig {
    /// Set the request timeout in seconds
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: u64) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the maximum message size in bytes
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// The request timeout as a `Duration`
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}
