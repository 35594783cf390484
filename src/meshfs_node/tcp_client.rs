use serde_json::{json, Value};

use crate::error::MeshFsResult;
use crate::network::broker::into_result;
use crate::network::{NetworkConfig, RpcTransport, TcpTransport};
use crate::record::FilePointer;

/// RPC client speaking a node's length-prefixed JSON protocol.
pub struct TcpClient {
    address: String,
    transport: TcpTransport,
}

impl TcpClient {
    #[must_use]
    pub fn new(address: &str, config: &NetworkConfig) -> Self {
        Self {
            address: address.to_string(),
            transport: TcpTransport::new(config),
        }
    }

    /// One RPC round trip; the remote error envelope surfaces as an `Err`.
    pub async fn call(&self, operation: &str, params: Value) -> MeshFsResult<Value> {
        let request = json!({"operation": operation, "params": params});
        let response = self.transport.call(&self.address, request).await?;
        Ok(into_result(response)?)
    }

    pub async fn store(
        &self,
        id: &str,
        path: &str,
        name: &str,
        kind: &str,
        payload: Value,
    ) -> MeshFsResult<Value> {
        self.call(
            "store",
            json!({"id": id, "path": path, "name": name, "kind": kind, "payload": payload}),
        )
        .await
    }

    pub async fn get(&self, path: &str) -> MeshFsResult<FilePointer> {
        let value = self.call("get", json!({"path": path})).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_object(&self, path: &str, raw: bool) -> MeshFsResult<Value> {
        self.call("getobject", json!({"path": path, "raw": raw}))
            .await
    }

    pub async fn list(&self, path: &str, offset: u64, size: u64) -> MeshFsResult<Value> {
        self.call("list", json!({"path": path, "offset": offset, "size": size}))
            .await
    }

    pub async fn mkdir(&self, path: &str) -> MeshFsResult<Value> {
        self.call("mkdir", json!({"path": path})).await
    }

    pub async fn rm(&self, path: &str) -> MeshFsResult<Value> {
        self.call("rm", json!({"path": path})).await
    }

    pub async fn execute(&self, path: &str, operation: &str) -> MeshFsResult<Value> {
        self.call("execute", json!({"path": path, "operation": operation}))
            .await
    }

    pub async fn query(&self, path: &str) -> MeshFsResult<Value> {
        self.call("query", json!({"path": path})).await
    }

    pub async fn search(&self, field: &str, op: &str, value: Value) -> MeshFsResult<Value> {
        self.call("search", json!({"field": field, "op": op, "value": value}))
            .await
    }

    pub async fn search_text(&self, field: &str, text: &str) -> MeshFsResult<Value> {
        self.call("searchtext", json!({"field": field, "text": text}))
            .await
    }

    pub async fn registry(&self) -> MeshFsResult<Value> {
        self.call("registry", json!({})).await
    }

    pub async fn stats(&self) -> MeshFsResult<Value> {
        self.call("stats", json!({})).await
    }
}
