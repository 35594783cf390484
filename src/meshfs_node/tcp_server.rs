use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use log::debug;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::db_operations::{FieldPredicate, PredicateOp};
use crate::error::{MeshFsError, MeshFsResult};
use crate::meshfs_node::MeshFsNode;
use crate::record::FilePointer;

/// TCP RPC server for a MeshFS node.
///
/// Speaks length-prefixed JSON: a 4-byte big-endian length, then a request
/// of the form `{"operation": ..., "params": {...}}`. Failures come back
/// as `{"error": true, "message": ...}` frames.
pub struct TcpServer {
    node: Arc<MeshFsNode>,
    listener: TcpListener,
}

impl TcpServer {
    /// Binds the server to `address` (`host:port`; port 0 picks a free
    /// one).
    pub async fn bind(node: Arc<MeshFsNode>, address: &str) -> MeshFsResult<Self> {
        let listener = TcpListener::bind(address).await?;
        log::info!("RPC server listening on {}", listener.local_addr()?);
        Ok(Self { node, listener })
    }

    pub fn local_addr(&self) -> MeshFsResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop: one task per connection.
    pub async fn run(&self) -> MeshFsResult<()> {
        loop {
            let (socket, peer) = self.listener.accept().await?;
            debug!("client connected: {}", peer);
            let node = Arc::clone(&self.node);
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(socket, node).await {
                    debug!("connection {} closed: {}", peer, e);
                }
            });
        }
    }

    async fn handle_connection(mut socket: TcpStream, node: Arc<MeshFsNode>) -> MeshFsResult<()> {
        let max_message_size = node.config().network.max_message_size;
        loop {
            let request_len = match socket.read_u32().await {
                Ok(len) => len as usize,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            if request_len > max_message_size {
                return Err(MeshFsError::Config(format!(
                    "request of {} bytes exceeds the {} byte limit",
                    request_len, max_message_size
                )));
            }

            let mut request_bytes = vec![0u8; request_len];
            socket.read_exact(&mut request_bytes).await?;
            let request: Value = serde_json::from_slice(&request_bytes)?;

            let response = match Self::process_request(&request, &node).await {
                Ok(value) => value,
                Err(e) => json!({"error": true, "message": e.to_string()}),
            };

            let response_bytes = serde_json::to_vec(&response)?;
            socket.write_u32(response_bytes.len() as u32).await?;
            socket.write_all(&response_bytes).await?;
        }
    }

    /// Dispatches one RPC request to the node.
    pub async fn process_request(request: &Value, node: &MeshFsNode) -> MeshFsResult<Value> {
        let operation = request
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| MeshFsError::Config("missing operation".to_string()))?;
        debug!("processing request: {}", operation);

        match operation {
            "store" => {
                let id = opt_str(request, "id").unwrap_or_default();
                let path = param_str(request, "path")?;
                let name = param_str(request, "name")?;
                let kind = opt_str(request, "kind").unwrap_or_default();
                let version = opt_u64(request, "version").unwrap_or(1);
                let payload = opt_value(request, "payload").unwrap_or_else(|| json!({}));
                let record = node
                    .store(&id, &path, &name, &kind, version, payload)
                    .await?;
                Ok(json!({"uuid": record.uuid, "path": record.full_path()}))
            }
            "get" => {
                let path = param_str(request, "path")?;
                let pointer = node.get(&path).await?;
                Ok(serde_json::to_value(pointer)?)
            }
            "getobject" => {
                let path = param_str(request, "path")?;
                let raw = opt_bool(request, "raw").unwrap_or(false);
                node.get_object(&path, raw).await
            }
            "list" => {
                let path = param_str(request, "path")?;
                let recursive = opt_bool(request, "recursive").unwrap_or(false);
                let raw = opt_bool(request, "raw").unwrap_or(false);
                let offset = opt_u64(request, "offset").unwrap_or(0) as usize;
                let size = opt_u64(request, "size").unwrap_or(0) as usize;
                node.list(&path, recursive, raw, offset, size)
            }
            "mkdir" => {
                let path = param_str(request, "path")?;
                node.engine().mkdir(&path)?;
                Ok(json!({"ok": true}))
            }
            "rm" => {
                let path = param_str(request, "path")?;
                node.engine().rm(&path)?;
                Ok(json!({"ok": true}))
            }
            "cp" => {
                let source = param_str(request, "source")?;
                let dest = param_str(request, "dest")?;
                let pointer = node.engine().cp(&source, &dest)?;
                Ok(serde_json::to_value(pointer)?)
            }
            "execute" => {
                let target = param_str(request, "path")
                    .or_else(|_| param_str(request, "target"))?;
                let name = param_str(request, "operation")?;
                node.execute(&target, &name)
            }
            "query" => {
                let path = param_str(request, "path")?;
                node.query(&path)
            }
            "search" => {
                let field = param_str(request, "field")?;
                let op = match opt_str(request, "op") {
                    Some(op) => PredicateOp::from_str(&op)?,
                    None => PredicateOp::Eq,
                };
                let value = opt_value(request, "value").unwrap_or(Value::Null);
                let predicate = FieldPredicate::new(&field, op, value);
                let records = node.engine().search(&predicate)?;
                Ok(serialize_records(&records)?)
            }
            "searchtext" => {
                let field = param_str(request, "field")?;
                let text = param_str(request, "text")?;
                let records = node.engine().search_text(&field, &text)?;
                Ok(serialize_records(&records)?)
            }
            "reindex" => {
                let indexed = node.engine().reindex()?;
                Ok(json!({"indexed": indexed}))
            }
            "register" => {
                let entry = opt_value(request, "entry")
                    .ok_or_else(|| MeshFsError::Config("missing entry parameter".to_string()))?;
                let entry: FilePointer = serde_json::from_value(entry)?;
                node.register(entry)?;
                Ok(json!({"ok": true}))
            }
            "registry" => node.registry_snapshot(),
            "hello" => {
                let name = param_str(request, "node")?;
                let address = param_str(request, "address")?;
                node.hello(&name, &address)
            }
            "stats" => {
                let stats = node.engine().stats()?;
                Ok(serde_json::to_value(stats)?)
            }
            other => Err(MeshFsError::Config(format!("unknown operation: {}", other))),
        }
    }
}

fn serialize_records(records: &[crate::record::Record]) -> MeshFsResult<Value> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        out.push(Value::String(serde_json::to_string(record)?));
    }
    Ok(Value::Array(out))
}

fn params<'a>(request: &'a Value) -> Option<&'a Value> {
    request.get("params")
}

fn param_str(request: &Value, name: &str) -> MeshFsResult<String> {
    params(request)
        .and_then(|p| p.get(name))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MeshFsError::Config(format!("missing {} parameter", name)))
}

fn opt_str(request: &Value, name: &str) -> Option<String> {
    params(request)
        .and_then(|p| p.get(name))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn opt_bool(request: &Value, name: &str) -> Option<bool> {
    params(request).and_then(|p| p.get(name)).and_then(Value::as_bool)
}

fn opt_u64(request: &Value, name: &str) -> Option<u64> {
    params(request).and_then(|p| p.get(name)).and_then(Value::as_u64)
}

fn opt_value(request: &Value, name: &str) -> Option<Value> {
    params(request).and_then(|p| p.get(name)).cloned()
}
