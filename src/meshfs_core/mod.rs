//! The storage/execution engine embedded in the node process.
//!
//! `MeshFs` ties the backing store, path tree, object registry, field
//! indexes and the operation registry into one engine value. Every public
//! mutation runs in its own transaction scope; the engine is safe to share
//! across request handlers behind an `Arc`.

use std::collections::HashMap;

use log::info;
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{DEFAULT_LIST_LIMIT, DIR_TAG, KIND_DIRECTORY, KIND_REFERENCE};
use crate::db_operations::{DbOperations, FieldPredicate, ListEntry};
use crate::error::{MeshFsError, MeshFsResult};
use crate::execution::{default_registry, OperationRegistry, StoreContext};
use crate::record::{split_path, FilePointer, Record, Resolved};

pub struct MeshFs {
    db_ops: DbOperations,
    operations: OperationRegistry,
    list_limit: usize,
}

impl MeshFs {
    /// Opens (or creates) the engine's backing store at `path`.
    pub fn new(path: &str) -> MeshFsResult<Self> {
        Ok(Self {
            db_ops: DbOperations::open(path)?,
            operations: default_registry().clone(),
            list_limit: DEFAULT_LIST_LIMIT,
        })
    }

    /// Overrides the `list` result cap.
    #[must_use]
    pub fn with_list_limit(mut self, limit: usize) -> Self {
        if limit > 0 {
            self.list_limit = limit;
        }
        self
    }

    /// Replaces the operation registry (built-ins by default).
    #[must_use]
    pub fn with_operations(mut self, operations: OperationRegistry) -> Self {
        self.operations = operations;
        self
    }

    pub fn db_ops(&self) -> &DbOperations {
        &self.db_ops
    }

    pub fn list_limit(&self) -> usize {
        self.list_limit
    }

    /// The persistent node id, generated on first open.
    pub fn node_id(&self) -> MeshFsResult<String> {
        self.db_ops.node_id()
    }

    /// Persists a record under `path/name`, updating the path tree, the
    /// object registry and the field indexes in one transaction.
    pub fn store_record(
        &self,
        id: &str,
        path: &str,
        name: &str,
        kind: &str,
        version: u64,
        payload: Value,
    ) -> MeshFsResult<Record> {
        let record = Record::new(id, path, name, kind, payload).with_version(version);
        self.db_ops.store_record(&record)?;
        info!("stored {} ({})", record.full_path(), record.uuid);
        Ok(record)
    }

    pub fn resolve(&self, path: &str) -> MeshFsResult<Resolved> {
        self.db_ops.resolve(path)
    }

    /// Resolves a path to its pointer projection. Directories resolve to a
    /// synthesized pointer of kind `directory`.
    pub fn get_pointer(&self, path: &str) -> MeshFsResult<FilePointer> {
        match self.db_ops.resolve(path)? {
            Resolved::Pointer(pointer) => Ok(pointer),
            Resolved::Directory(dir) => {
                let (parent, name) = split_path(&dir.path);
                Ok(FilePointer {
                    path: parent,
                    name,
                    uuid: dir.uuid,
                    kind: KIND_DIRECTORY.to_string(),
                    size: dir.size(),
                    version: 1,
                    date: dir.created_at,
                    node: None,
                })
            }
        }
    }

    /// Loads a record by path or identity (a bare uuid string).
    ///
    /// Reference pointers have no local body; resolving one surfaces
    /// `NoSuchObject` so the node layer can decide whether to forward.
    pub fn get_record(&self, target: &str) -> MeshFsResult<Record> {
        if !target.starts_with('/') {
            if let Ok(uuid) = Uuid::parse_str(target) {
                return self
                    .db_ops
                    .get_record_by_uuid(&uuid.to_string())?
                    .ok_or_else(|| MeshFsError::NoSuchObject(target.to_string()));
            }
        }
        match self.db_ops.resolve(target)? {
            Resolved::Pointer(pointer) => {
                if pointer.kind == KIND_REFERENCE {
                    return Err(MeshFsError::NoSuchObject(pointer.full_path()));
                }
                self.db_ops
                    .get_record_by_uuid(&pointer.uuid.to_string())?
                    .ok_or_else(|| MeshFsError::NoSuchObject(pointer.uuid.to_string()))
            }
            Resolved::Directory(dir) => self
                .db_ops
                .get_record_by_uuid(&dir.uuid.to_string())?
                .ok_or_else(|| MeshFsError::NoSuchObject(dir.uuid.to_string())),
        }
    }

    pub fn list(&self, path: &str, recursive: bool) -> MeshFsResult<Vec<ListEntry>> {
        self.db_ops.list_entries(path, recursive, self.list_limit)
    }

    /// Display-form listing: directories carry the `dir:` tag.
    pub fn list_paths(&self, path: &str, recursive: bool) -> MeshFsResult<Vec<String>> {
        Ok(self
            .list(path, recursive)?
            .into_iter()
            .map(|entry| {
                if entry.is_dir {
                    format!("{}{}", DIR_TAG, entry.path)
                } else {
                    entry.path
                }
            })
            .collect())
    }

    pub fn mkdir(&self, path: &str) -> MeshFsResult<()> {
        self.db_ops.mkdir(path)
    }

    pub fn rm(&self, path: &str) -> MeshFsResult<()> {
        self.db_ops.rm(path)
    }

    pub fn cp(&self, source: &str, dest: &str) -> MeshFsResult<FilePointer> {
        self.db_ops.cp(source, dest)
    }

    pub fn search(&self, predicate: &FieldPredicate) -> MeshFsResult<Vec<Record>> {
        self.db_ops.search(predicate)
    }

    pub fn search_text(&self, field: &str, query: &str) -> MeshFsResult<Vec<Record>> {
        self.db_ops.search_text(field, query)
    }

    pub fn reindex(&self) -> MeshFsResult<u64> {
        self.db_ops.reindex()
    }

    pub fn stats(&self) -> MeshFsResult<HashMap<String, u64>> {
        self.db_ops.get_stats()
    }

    pub fn registry_snapshot(&self) -> MeshFsResult<Vec<FilePointer>> {
        self.db_ops.registry_snapshot()
    }

    pub fn register_reference(&self, pointer: &FilePointer) -> MeshFsResult<()> {
        self.db_ops.register_reference(pointer)
    }

    /// Executes a named operation against the record a path or uuid
    /// resolves to.
    ///
    /// Directories fan out: the operation runs against every child that
    /// defines it and the results come back as an array. For a single
    /// record, an unregistered `(kind, operation)` pair fails with
    /// `NoSuchOperation`; a handler error skips persistence entirely, so
    /// no partial mutation is ever visible.
    pub fn execute(&self, target: &str, operation: &str) -> MeshFsResult<Value> {
        if target.starts_with('/') {
            if let Resolved::Directory(dir) = self.db_ops.resolve(target)? {
                let mut results = Vec::new();
                for entry in self.db_ops.list_entries(&dir.path, false, self.list_limit)? {
                    let pointer = match entry.pointer {
                        Some(pointer) if pointer.kind != KIND_REFERENCE => pointer,
                        _ => continue,
                    };
                    if !self.operations.defines(&pointer.kind, operation) {
                        continue;
                    }
                    let record = self
                        .db_ops
                        .get_record_by_uuid(&pointer.uuid.to_string())?
                        .ok_or_else(|| MeshFsError::NoSuchObject(pointer.uuid.to_string()))?;
                    results.push(self.run_one(record, operation)?);
                }
                return Ok(Value::Array(results));
            }
        }
        let record = self.get_record(target)?;
        self.run_one(record, operation)
    }

    fn run_one(&self, mut record: Record, operation: &str) -> MeshFsResult<Value> {
        let handler = self.operations.get(&record.kind, operation).ok_or_else(|| {
            MeshFsError::NoSuchOperation {
                kind: record.kind.clone(),
                operation: operation.to_string(),
            }
        })?;

        // handlers mutate payload, never identity
        let uuid = record.uuid;
        let path = record.path.clone();
        let name = record.name.clone();

        let result = handler(&mut record, self)?;

        record.uuid = uuid;
        record.path = path;
        record.name = name;
        self.db_ops.persist_record_update(&record)?;
        Ok(result)
    }
}

impl StoreContext for MeshFs {
    fn list(&self, path: &str, recursive: bool) -> MeshFsResult<Vec<String>> {
        self.list_paths(path, recursive)
    }

    fn get_record(&self, target: &str) -> MeshFsResult<Record> {
        MeshFs::get_record(self, target)
    }
}
