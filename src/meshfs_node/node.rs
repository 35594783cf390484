use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::constants::KIND_REFERENCE;
use crate::error::{MeshFsError, MeshFsResult};
use crate::meshfs_core::MeshFs;
use crate::meshfs_node::config::NodeConfig;
use crate::network::broker::into_result;
use crate::network::{BrokerClient, RpcTransport, TcpTransport};
use crate::record::{FilePointer, NodeDescriptor, Record, Resolved};

/// A node in the MeshFS distributed object store.
///
/// MeshFsNode combines the storage/execution engine with the mesh
/// behaviors: reference registration on store, broker forwarding of local
/// misses, and the discovery handshake. A node configured as broker skips
/// its own forwarding logic; every other node needs a [`BrokerClient`]
/// injected at construction to participate in the mesh, and works as a
/// standalone store without one.
pub struct MeshFsNode {
    /// The storage/execution engine
    engine: Arc<MeshFs>,
    /// Configuration settings for this node
    config: NodeConfig,
    /// Persistent unique identifier for this node
    node_id: String,
    /// Client half of the broker relationship, absent on the broker itself
    broker_client: Option<Arc<BrokerClient>>,
    /// Point-to-point RPC transport for proxying and handshake callbacks
    transport: Arc<dyn RpcTransport>,
}

impl MeshFsNode {
    /// Creates a new MeshFsNode with the specified configuration.
    pub fn new(config: NodeConfig) -> MeshFsResult<Self> {
        let storage = config
            .storage_path
            .to_str()
            .ok_or_else(|| MeshFsError::Config("invalid storage path".to_string()))?;
        let engine = MeshFs::new(storage)?.with_list_limit(config.list_limit);
        let node_id = engine.node_id()?;
        let transport: Arc<dyn RpcTransport> = Arc::new(TcpTransport::new(&config.network));
        info!(
            "node '{}' ({}) opened store at {}",
            config.node_name, node_id, storage
        );
        Ok(Self {
            engine: Arc::new(engine),
            config,
            node_id,
            broker_client: None,
            transport,
        })
    }

    /// Injects the broker dependency; its lifecycle follows the node's.
    #[must_use]
    pub fn with_broker_client(mut self, client: BrokerClient) -> Self {
        self.broker_client = Some(Arc::new(client));
        self
    }

    /// Substitutes the RPC transport; used by tests.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn RpcTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn engine(&self) -> &MeshFs {
        &self.engine
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_broker(&self) -> bool {
        self.config.broker
    }

    fn can_forward(&self) -> bool {
        !self.is_broker() && self.broker_client.is_some()
    }

    /// Persists a record and, on a non-broker node, registers a reference
    /// entry with the broker so the mesh namespace stays a superset view.
    /// Registration is best-effort: the broker's view is eventually
    /// consistent, a failure never rolls back the local commit.
    pub async fn store(
        &self,
        id: &str,
        path: &str,
        name: &str,
        kind: &str,
        version: u64,
        payload: Value,
    ) -> MeshFsResult<Record> {
        let record = self
            .engine
            .store_record(id, path, name, kind, version, payload)?;
        if !self.is_broker() {
            if let Some(broker) = &self.broker_client {
                let mut entry = FilePointer::from_record(&record);
                entry.kind = KIND_REFERENCE.to_string();
                entry.node = Some(self.config.listen_address.clone());
                if let Err(e) = broker.register(&entry).await {
                    warn!(
                        "failed to register {} with broker: {}",
                        record.full_path(),
                        e
                    );
                }
            }
        }
        Ok(record)
    }

    /// Pointer lookup with one forwarding attempt to the broker on a local
    /// miss.
    pub async fn get(&self, path: &str) -> MeshFsResult<FilePointer> {
        match self.engine.get_pointer(path) {
            Err(MeshFsError::PathNotFound(_)) if self.can_forward() => {
                let broker = match &self.broker_client {
                    Some(broker) => broker,
                    None => return Err(MeshFsError::NoSuchObject(path.to_string())),
                };
                match broker.get(path).await {
                    Ok(value) => serde_json::from_value(value)
                        .map_err(|_| MeshFsError::NoSuchObject(path.to_string())),
                    Err(e) => {
                        debug!("broker lookup for {} failed: {}", path, e);
                        Err(MeshFsError::NoSuchObject(path.to_string()))
                    }
                }
            }
            other => other,
        }
    }

    /// Object lookup: local registry first; reference hits proxy to the
    /// owning node (broker side); local misses forward to the broker once
    /// (everyone else). `raw` selects the decoded record over its
    /// wire-serialized string form.
    pub async fn get_object(&self, target: &str, raw: bool) -> MeshFsResult<Value> {
        if target.starts_with('/') {
            if let Ok(Resolved::Pointer(pointer)) = self.engine.resolve(target) {
                if pointer.kind == KIND_REFERENCE {
                    return self.proxy_get_object(&pointer, raw).await;
                }
            }
        }
        match self.engine.get_record(target) {
            Ok(record) => encode_record(&record, raw),
            Err(MeshFsError::PathNotFound(_)) | Err(MeshFsError::NoSuchObject(_))
                if self.can_forward() =>
            {
                self.forward_get_object(target, raw).await
            }
            Err(e) => Err(e),
        }
    }

    async fn proxy_get_object(&self, pointer: &FilePointer, raw: bool) -> MeshFsResult<Value> {
        let owner = pointer.node.clone().ok_or_else(|| {
            MeshFsError::RemoteLookupFailed(format!(
                "reference {} has no owning node",
                pointer.full_path()
            ))
        })?;
        let request = json!({
            "operation": "getobject",
            "params": {"path": pointer.full_path(), "raw": raw},
        });
        debug!("proxying getobject {} to {}", pointer.full_path(), owner);
        match self.transport.call(&owner, request).await {
            Ok(response) => into_result(response)
                .map_err(|e| MeshFsError::RemoteLookupFailed(format!("{} (owner {})", e, owner))),
            Err(e) => Err(MeshFsError::RemoteLookupFailed(format!(
                "{} (owner {})",
                e, owner
            ))),
        }
    }

    async fn forward_get_object(&self, target: &str, raw: bool) -> MeshFsResult<Value> {
        let broker = match &self.broker_client {
            Some(broker) => broker,
            None => return Err(MeshFsError::NoSuchObject(target.to_string())),
        };
        match broker.get_object(target, raw).await {
            Ok(value) => Ok(value),
            Err(e) => {
                debug!("broker lookup for {} failed: {}", target, e);
                Err(MeshFsError::NoSuchObject(target.to_string()))
            }
        }
    }

    /// Executes a named operation against the record the target resolves
    /// to, on this node.
    pub fn execute(&self, target: &str, operation: &str) -> MeshFsResult<Value> {
        self.engine.execute(target, operation)
    }

    /// Sugar for `execute(path, "query")`.
    pub fn query(&self, path: &str) -> MeshFsResult<Value> {
        self.engine.execute(path, "query")
    }

    /// Broker-only: adds a reference entry to the namespace.
    pub fn register(&self, mut entry: FilePointer) -> MeshFsResult<()> {
        if !self.is_broker() {
            return Err(MeshFsError::Config(
                "register is a broker-only operation".to_string(),
            ));
        }
        entry.kind = KIND_REFERENCE.to_string();
        info!(
            "registering reference {} owned by {:?}",
            entry.full_path(),
            entry.node
        );
        self.engine.register_reference(&entry)
    }

    /// Discovery handshake acknowledgement: records the peer descriptor.
    pub fn hello(&self, node_name: &str, address: &str) -> MeshFsResult<Value> {
        self.engine
            .db_ops()
            .put_node(&NodeDescriptor::new(node_name, address))?;
        info!("handshake from '{}' at {}", node_name, address);
        Ok(json!({
            "ack": true,
            "node": self.config.node_name,
            "address": self.config.listen_address,
        }))
    }

    /// Broker side of a discovery announcement: record the descriptor and,
    /// on first sight of the node, call back to complete the mutual
    /// handshake.
    pub async fn handle_announcement(&self, node_name: &str, address: &str) -> MeshFsResult<()> {
        let first_seen = self.engine.db_ops().get_node(node_name)?.is_none();
        self.engine
            .db_ops()
            .put_node(&NodeDescriptor::new(node_name, address))?;
        debug!(
            "announcement from '{}' at {} (first seen: {})",
            node_name, address, first_seen
        );
        if first_seen {
            let request = json!({
                "operation": "hello",
                "params": {
                    "node": self.config.node_name,
                    "address": self.config.listen_address,
                },
            });
            if let Err(e) = self.transport.call(address, request).await {
                warn!("hello callback to {} failed: {}", address, e);
            }
        }
        Ok(())
    }

    /// Announces this node on the broker's discovery channel.
    pub async fn announce(&self) -> MeshFsResult<()> {
        if let Some(broker) = &self.broker_client {
            broker
                .announce(&self.config.node_name, &self.config.listen_address)
                .await?;
            info!("announced '{}' to broker", self.config.node_name);
        }
        Ok(())
    }

    /// Listing with paging applied after the engine's result cap.
    pub fn list(
        &self,
        path: &str,
        recursive: bool,
        raw: bool,
        offset: usize,
        size: usize,
    ) -> MeshFsResult<Value> {
        let entries = self.engine.list(path, recursive)?;
        let end = if size == 0 {
            entries.len()
        } else {
            (offset + size).min(entries.len())
        };
        let page = entries.get(offset.min(entries.len())..end).unwrap_or(&[]);
        if raw {
            Ok(serde_json::to_value(page)?)
        } else {
            let paths: Vec<String> = page
                .iter()
                .map(|entry| {
                    if entry.is_dir {
                        format!("{}{}", crate::constants::DIR_TAG, entry.path)
                    } else {
                        entry.path.clone()
                    }
                })
                .collect();
            Ok(serde_json::to_value(paths)?)
        }
    }

    /// Snapshot of locally-registered file entries plus this node's host.
    pub fn registry_snapshot(&self) -> MeshFsResult<Value> {
        let registry = self.engine.registry_snapshot()?;
        Ok(json!({
            "registry": registry,
            "host": self.config.listen_address,
        }))
    }
}

fn encode_record(record: &Record, raw: bool) -> MeshFsResult<Value> {
    if raw {
        Ok(serde_json::to_value(record)?)
    } else {
        Ok(Value::String(serde_json::to_string(record)?))
    }
}
