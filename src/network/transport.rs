use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::config::NetworkConfig;
use super::error::{NetworkError, NetworkResult};
use super::protocol::{read_frame, write_frame};

/// Point-to-point RPC seam.
///
/// The node and broker logic go through this trait so tests can substitute
/// an in-process transport for real sockets.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Sends one request to `address` and awaits the response value.
    async fn call(&self, address: &str, request: Value) -> NetworkResult<Value>;
}

/// One-connection-per-call TCP transport speaking the length-prefixed JSON
/// protocol. Every call is bounded by the configured request timeout.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    request_timeout: Duration,
    max_message_size: usize,
}

impl TcpTransport {
    #[must_use]
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            request_timeout: config.timeout(),
            max_message_size: config.max_message_size,
        }
    }
}

#[async_trait]
impl RpcTransport for TcpTransport {
    async fn call(&self, address: &str, request: Value) -> NetworkResult<Value> {
        let seconds = self.request_timeout.as_secs();
        timeout(self.request_timeout, async {
            let mut stream = TcpStream::connect(address).await?;
            let payload = serde_json::to_vec(&request)?;
            write_frame(&mut stream, &payload, self.max_message_size).await?;
            let response = read_frame(&mut stream, self.max_message_size).await?;
            Ok(serde_json::from_slice(&response)?)
        })
        .await
        .map_err(|_| NetworkError::Timeout(seconds))?
    }
}
