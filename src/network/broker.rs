use std::sync::Arc;

use log::debug;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::config::NetworkConfig;
use super::error::{NetworkError, NetworkResult};
use super::protocol::DiscoveryMessage;
use super::transport::{RpcTransport, TcpTransport};
use crate::record::FilePointer;

/// Client half of the broker relationship.
///
/// An explicit dependency handed to the node at construction: it knows the
/// broker's RPC address (for reference registration and forwarded lookups)
/// and the discovery channel address (for the startup announcement).
pub struct BrokerClient {
    rpc_address: String,
    discovery_address: Option<String>,
    request_timeout: std::time::Duration,
    transport: Arc<dyn RpcTransport>,
}

impl BrokerClient {
    #[must_use]
    pub fn new(
        rpc_address: &str,
        discovery_address: Option<&str>,
        config: &NetworkConfig,
    ) -> Self {
        Self {
            rpc_address: rpc_address.to_string(),
            discovery_address: discovery_address.map(str::to_string),
            request_timeout: config.timeout(),
            transport: Arc::new(TcpTransport::new(config)),
        }
    }

    /// Substitutes the transport; used by tests.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn RpcTransport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn rpc_address(&self) -> &str {
        &self.rpc_address
    }

    async fn call(&self, operation: &str, params: Value) -> NetworkResult<Value> {
        let request = json!({"operation": operation, "params": params});
        let response = self.transport.call(&self.rpc_address, request).await?;
        into_result(response)
    }

    /// Publishes a `HI` announcement on the broker's discovery channel.
    pub async fn announce(&self, node_name: &str, rpc_address: &str) -> NetworkResult<()> {
        let discovery = self.discovery_address.as_ref().ok_or_else(|| {
            NetworkError::Protocol("no discovery address configured".to_string())
        })?;
        let message = DiscoveryMessage::Hi {
            node: node_name.to_string(),
            address: rpc_address.to_string(),
        };
        let seconds = self.request_timeout.as_secs();
        timeout(self.request_timeout, async {
            let mut stream = TcpStream::connect(discovery.as_str()).await?;
            stream
                .write_all(format!("{}\n", message.encode()).as_bytes())
                .await?;
            stream.flush().await?;
            Ok(())
        })
        .await
        .map_err(|_| NetworkError::Timeout(seconds))?
    }

    /// Registers a reference entry in the broker's namespace.
    pub async fn register(&self, entry: &FilePointer) -> NetworkResult<()> {
        debug!("registering {} with broker", entry.full_path());
        self.call("register", json!({"entry": entry})).await?;
        Ok(())
    }

    /// Forwarded pointer lookup.
    pub async fn get(&self, path: &str) -> NetworkResult<Value> {
        self.call("get", json!({"path": path})).await
    }

    /// Forwarded object lookup.
    pub async fn get_object(&self, path: &str, raw: bool) -> NetworkResult<Value> {
        self.call("getobject", json!({"path": path, "raw": raw}))
            .await
    }
}

/// Unwraps the RPC error envelope into a remote error.
pub(crate) fn into_result(response: Value) -> NetworkResult<Value> {
    if response.get("error").and_then(Value::as_bool) == Some(true) {
        let message = response
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown remote error");
        return Err(NetworkError::Remote(message.to_string()));
    }
    Ok(response)
}
