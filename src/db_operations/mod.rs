// Core database operations
mod index_operations;
mod object_operations;
mod path_operations;

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionalTree};

use crate::error::{MeshFsError, MeshFsResult};
use crate::record::NodeDescriptor;

pub use index_operations::{FieldPredicate, PredicateOp};
pub use path_operations::ListEntry;

/// Key prefixes for the transactional namespace in the default tree.
///
/// Directory entries, file pointers, object payloads and index entries all
/// share the default tree so that a single `sled` transaction can span every
/// key a mutation touches; the node table and node metadata live in named
/// trees because nothing needs them inside those transactions.
pub(crate) const KEY_DIR: &str = "dir:";
pub(crate) const KEY_PTR: &str = "ptr:";
pub(crate) const KEY_OBJ: &str = "obj:";
pub(crate) const KEY_FIELD_INDEX: &str = "fidx:";
pub(crate) const KEY_TEXT_INDEX: &str = "tidx:";

/// Field separator inside index keys.
pub(crate) const IDX_SEP: char = '\u{1f}';

const METADATA_NODE_ID: &str = "node_id";

pub(crate) type TxError = ConflictableTransactionError<MeshFsError>;

pub(crate) fn abort(err: MeshFsError) -> TxError {
    ConflictableTransactionError::Abort(err)
}

pub(crate) fn dir_key(path: &str) -> String {
    format!("{}{}", KEY_DIR, path)
}

pub(crate) fn ptr_key(path: &str) -> String {
    format!("{}{}", KEY_PTR, path)
}

pub(crate) fn obj_key<T: std::fmt::Display>(uuid: T) -> String {
    format!("{}{}", KEY_OBJ, uuid)
}

/// Reads and decodes a value inside a transaction scope.
pub(crate) fn tx_get<T: DeserializeOwned>(
    tx: &TransactionalTree,
    key: &str,
) -> Result<Option<T>, TxError> {
    match tx.get(key.as_bytes())? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| abort(MeshFsError::Serialization(e.to_string()))),
        None => Ok(None),
    }
}

/// Encodes and writes a value inside a transaction scope.
pub(crate) fn tx_put<T: Serialize>(
    tx: &TransactionalTree,
    key: &str,
    item: &T,
) -> Result<(), TxError> {
    let bytes = serde_json::to_vec(item)
        .map_err(|e| abort(MeshFsError::Serialization(e.to_string())))?;
    tx.insert(key.as_bytes(), bytes)?;
    Ok(())
}

/// Unified access to all database operations.
///
/// Wraps the sled instance and the named trees, and provides the generic
/// serde-backed store/get helpers the operation modules build on.
#[derive(Clone)]
pub struct DbOperations {
    /// The underlying sled database instance
    db: sled::Db,
    /// Node-local metadata (persistent node id)
    pub(crate) metadata_tree: sled::Tree,
    /// Broker-side node table
    pub(crate) nodes_tree: sled::Tree,
}

impl DbOperations {
    /// Opens the backing store at `path` and prepares all required trees.
    ///
    /// sled recovers to the last committed state on open, which is the
    /// correctness floor the rest of the design depends on.
    pub fn open(path: &str) -> MeshFsResult<Self> {
        let db = sled::open(path)?;
        let metadata_tree = db.open_tree("metadata")?;
        let nodes_tree = db.open_tree("nodes")?;

        let ops = Self {
            db,
            metadata_tree,
            nodes_tree,
        };
        ops.ensure_root()?;
        Ok(ops)
    }

    /// Gets a reference to the underlying database
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Generic function to store a serializable item in the default tree
    pub fn store_item<T: Serialize>(&self, key: &str, item: &T) -> MeshFsResult<()> {
        let bytes = serde_json::to_vec(item)?;
        self.db.insert(key.as_bytes(), bytes)?;
        // Ensure the data is durably written to disk
        self.db.flush()?;
        Ok(())
    }

    /// Generic function to retrieve a deserializable item from the default tree
    pub fn get_item<T: DeserializeOwned>(&self, key: &str) -> MeshFsResult<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Removes an item from the default tree, reporting whether it existed
    pub fn remove_item(&self, key: &str) -> MeshFsResult<bool> {
        let existed = self.db.remove(key.as_bytes())?.is_some();
        self.db.flush()?;
        Ok(existed)
    }

    /// Lists all key/value pairs under a prefix in the default tree
    pub fn scan_items<T: DeserializeOwned>(&self, prefix: &str) -> MeshFsResult<Vec<(String, T)>> {
        let mut items = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            let key_str = String::from_utf8_lossy(&key).to_string();
            let item = serde_json::from_slice(&value).map_err(|e| {
                MeshFsError::Serialization(format!("bad entry at key '{}': {}", key_str, e))
            })?;
            items.push((key_str, item));
        }
        Ok(items)
    }

    /// Lists all keys under a prefix in the default tree
    pub fn scan_keys(&self, prefix: &str) -> MeshFsResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            keys.push(String::from_utf8_lossy(&key).to_string());
        }
        Ok(keys)
    }

    /// Counts items with a given prefix
    pub fn count_items_with_prefix(&self, prefix: &str) -> MeshFsResult<u64> {
        let mut count = 0;
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Gets database statistics: entry counts per collection
    pub fn get_stats(&self) -> MeshFsResult<HashMap<String, u64>> {
        let mut stats = HashMap::new();
        stats.insert(
            "directories".to_string(),
            self.count_items_with_prefix(KEY_DIR)?,
        );
        stats.insert(
            "pointers".to_string(),
            self.count_items_with_prefix(KEY_PTR)?,
        );
        stats.insert(
            "objects".to_string(),
            self.count_items_with_prefix(KEY_OBJ)?,
        );
        stats.insert(
            "field_index".to_string(),
            self.count_items_with_prefix(KEY_FIELD_INDEX)?,
        );
        stats.insert(
            "text_index".to_string(),
            self.count_items_with_prefix(KEY_TEXT_INDEX)?,
        );
        stats.insert("nodes".to_string(), self.nodes_tree.len() as u64);
        Ok(stats)
    }

    /// Retrieves the persistent node id, generating one on first open.
    pub fn node_id(&self) -> MeshFsResult<String> {
        if let Some(bytes) = self.metadata_tree.get(METADATA_NODE_ID.as_bytes())? {
            return Ok(String::from_utf8_lossy(&bytes).to_string());
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.metadata_tree
            .insert(METADATA_NODE_ID.as_bytes(), id.as_bytes())?;
        self.metadata_tree.flush()?;
        Ok(id)
    }

    // ========== NODE TABLE ==========

    /// Records (or refreshes) a peer descriptor in the node table
    pub fn put_node(&self, descriptor: &NodeDescriptor) -> MeshFsResult<()> {
        let bytes = serde_json::to_vec(descriptor)?;
        self.nodes_tree.insert(descriptor.name.as_bytes(), bytes)?;
        self.nodes_tree.flush()?;
        Ok(())
    }

    /// Looks up a peer descriptor by node name
    pub fn get_node(&self, name: &str) -> MeshFsResult<Option<NodeDescriptor>> {
        match self.nodes_tree.get(name.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All known peer descriptors
    pub fn list_nodes(&self) -> MeshFsResult<Vec<NodeDescriptor>> {
        let mut nodes = Vec::new();
        for entry in self.nodes_tree.iter() {
            let (_, bytes) = entry?;
            nodes.push(serde_json::from_slice(&bytes)?);
        }
        Ok(nodes)
    }
}
