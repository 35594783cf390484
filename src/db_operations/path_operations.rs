use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sled::transaction::TransactionalTree;
use uuid::Uuid;

use super::{abort, dir_key, index_operations, obj_key, ptr_key, tx_get, tx_put, DbOperations, TxError};
use crate::constants::{DEFAULT_PERMISSIONS, KIND_DIRECTORY};
use crate::error::{MeshFsError, MeshFsResult};
use crate::record::{
    join_path, normalize_path, path_segments, split_path, ChildKind, DirectoryNode, FilePointer,
    Record, Resolved,
};

/// One entry of a `list` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEntry {
    pub path: String,
    pub is_dir: bool,
    pub pointer: Option<FilePointer>,
}

/// Identity material for a directory that may need creating inside a
/// transaction. Precomputed so transaction retries stay deterministic.
struct DirSeed {
    uuid: Uuid,
    created_at: DateTime<Utc>,
}

fn dir_seeds(path: &str) -> HashMap<String, DirSeed> {
    let mut seeds = HashMap::new();
    let mut cur = String::from("/");
    for segment in path_segments(path) {
        cur = join_path(&cur, &segment);
        seeds.insert(
            cur.clone(),
            DirSeed {
                uuid: Uuid::new_v4(),
                created_at: Utc::now(),
            },
        );
    }
    seeds
}

/// Creates every missing directory along `path`, one segment at a time,
/// linking each into its parent and writing a registry entry so the new
/// directory is independently resolvable by identity.
fn ensure_dirs(
    tx: &TransactionalTree,
    path: &str,
    seeds: &HashMap<String, DirSeed>,
) -> Result<(), TxError> {
    let mut cur = String::from("/");
    for segment in path_segments(path) {
        let child_path = join_path(&cur, &segment);
        if tx_get::<FilePointer>(tx, &ptr_key(&child_path))?.is_some() {
            return Err(abort(MeshFsError::PathAlreadyExists(child_path)));
        }
        if tx_get::<DirectoryNode>(tx, &dir_key(&child_path))?.is_none() {
            let seed = seeds
                .get(&child_path)
                .ok_or_else(|| abort(MeshFsError::Database(format!("no seed for {}", child_path))))?;
            let dir = DirectoryNode {
                path: child_path.clone(),
                uuid: seed.uuid,
                children: Default::default(),
                created_at: seed.created_at,
            };
            tx_put(tx, &dir_key(&child_path), &dir)?;

            let registry_entry = Record {
                id: segment.clone(),
                uuid: seed.uuid,
                path: cur.clone(),
                name: segment.clone(),
                permissions: DEFAULT_PERMISSIONS.to_string(),
                kind: KIND_DIRECTORY.to_string(),
                version: 1,
                payload: json!({}),
                created_at: seed.created_at,
            };
            tx_put(tx, &obj_key(seed.uuid), &registry_entry)?;

            let mut parent = tx_get::<DirectoryNode>(tx, &dir_key(&cur))?
                .ok_or_else(|| abort(MeshFsError::PathNotFound(cur.clone())))?;
            parent.children.insert(segment.clone(), ChildKind::Directory);
            tx_put(tx, &dir_key(&cur), &parent)?;
        }
        cur = child_path;
    }
    Ok(())
}

impl DbOperations {
    /// Creates the root directory (and its registry entry) on first open.
    pub(crate) fn ensure_root(&self) -> MeshFsResult<()> {
        if self.get_item::<DirectoryNode>(&dir_key("/"))?.is_some() {
            return Ok(());
        }
        let root = DirectoryNode::new("/");
        let registry_entry = Record {
            id: "/".to_string(),
            uuid: root.uuid,
            path: "/".to_string(),
            name: String::new(),
            permissions: DEFAULT_PERMISSIONS.to_string(),
            kind: KIND_DIRECTORY.to_string(),
            version: 1,
            payload: json!({}),
            created_at: root.created_at,
        };
        self.store_item(&obj_key(root.uuid), &registry_entry)?;
        self.store_item(&dir_key("/"), &root)
    }

    /// Resolves a path to a file pointer or directory node, descending
    /// segment by segment from the root.
    pub fn resolve(&self, path: &str) -> MeshFsResult<Resolved> {
        let path = normalize_path(path);
        if path == "/" {
            let root = self
                .get_item::<DirectoryNode>(&dir_key("/"))?
                .ok_or_else(|| MeshFsError::Database("missing root directory".to_string()))?;
            return Ok(Resolved::Directory(root));
        }

        let segments = path_segments(&path);
        let mut cur = String::from("/");
        for segment in &segments[..segments.len() - 1] {
            cur = join_path(&cur, segment);
            if self.get_item::<DirectoryNode>(&dir_key(&cur))?.is_none() {
                return Err(MeshFsError::PathNotFound(path));
            }
        }

        if let Some(pointer) = self.get_item::<FilePointer>(&ptr_key(&path))? {
            return Ok(Resolved::Pointer(pointer));
        }
        if let Some(dir) = self.get_item::<DirectoryNode>(&dir_key(&path))? {
            return Ok(Resolved::Directory(dir));
        }
        Err(MeshFsError::PathNotFound(path))
    }

    /// Creates a directory, including any missing intermediates.
    pub fn mkdir(&self, path: &str) -> MeshFsResult<()> {
        let path = normalize_path(path);
        if path == "/" {
            return Err(MeshFsError::PathAlreadyExists(path));
        }
        let seeds = dir_seeds(&path);
        self.db()
            .transaction(|tx| {
                if tx_get::<FilePointer>(tx, &ptr_key(&path))?.is_some()
                    || tx_get::<DirectoryNode>(tx, &dir_key(&path))?.is_some()
                {
                    return Err(abort(MeshFsError::PathAlreadyExists(path.clone())));
                }
                ensure_dirs(tx, &path, &seeds)
            })
            .map_err(MeshFsError::from)?;
        self.db().flush()?;
        Ok(())
    }

    /// Persists a record: parent directories, file pointer, registry entry
    /// and index entries all commit in one transaction. Storing over an
    /// existing path replaces the previous record body and its index
    /// entries.
    pub fn store_record(&self, record: &Record) -> MeshFsResult<FilePointer> {
        if record.name.is_empty() {
            return Err(MeshFsError::Config("record name must not be empty".to_string()));
        }
        let parent = normalize_path(&record.path);
        let full = record.full_path();
        let seeds = dir_seeds(&parent);
        let pointer = FilePointer::from_record(record);

        self.db()
            .transaction(|tx| {
                if tx_get::<DirectoryNode>(tx, &dir_key(&full))?.is_some() {
                    return Err(abort(MeshFsError::PathAlreadyExists(full.clone())));
                }
                ensure_dirs(tx, &parent, &seeds)?;

                if let Some(old_pointer) = tx_get::<FilePointer>(tx, &ptr_key(&full))? {
                    if let Some(old_record) =
                        tx_get::<Record>(tx, &obj_key(old_pointer.uuid))?
                    {
                        for key in index_operations::index_keys(&old_record) {
                            tx.remove(key.as_bytes())?;
                        }
                        tx.remove(obj_key(old_pointer.uuid).as_bytes())?;
                    }
                }

                tx_put(tx, &obj_key(record.uuid), record)?;
                tx_put(tx, &ptr_key(&full), &pointer)?;

                let mut dir = tx_get::<DirectoryNode>(tx, &dir_key(&parent))?
                    .ok_or_else(|| abort(MeshFsError::PathNotFound(parent.clone())))?;
                dir.children.insert(record.name.clone(), ChildKind::File);
                tx_put(tx, &dir_key(&parent), &dir)?;

                index_operations::index_record_tx(tx, record)
            })
            .map_err(MeshFsError::from)?;
        self.db().flush()?;
        Ok(pointer)
    }

    /// Registers a reference pointer (a path entry whose record body lives
    /// on another node). No registry entry is written.
    pub fn register_reference(&self, pointer: &FilePointer) -> MeshFsResult<()> {
        if pointer.name.is_empty() {
            return Err(MeshFsError::Config("reference name must not be empty".to_string()));
        }
        let parent = normalize_path(&pointer.path);
        let full = pointer.full_path();
        let seeds = dir_seeds(&parent);

        self.db()
            .transaction(|tx| {
                if tx_get::<DirectoryNode>(tx, &dir_key(&full))?.is_some() {
                    return Err(abort(MeshFsError::PathAlreadyExists(full.clone())));
                }
                ensure_dirs(tx, &parent, &seeds)?;
                tx_put(tx, &ptr_key(&full), pointer)?;
                let mut dir = tx_get::<DirectoryNode>(tx, &dir_key(&parent))?
                    .ok_or_else(|| abort(MeshFsError::PathNotFound(parent.clone())))?;
                dir.children.insert(pointer.name.clone(), ChildKind::File);
                tx_put(tx, &dir_key(&parent), &dir)?;
                Ok(())
            })
            .map_err(MeshFsError::from)?;
        self.db().flush()?;
        Ok(())
    }

    /// Removes a path entry. Directories must be empty; file removal also
    /// deletes the registry entry and index entries in the same
    /// transaction.
    pub fn rm(&self, path: &str) -> MeshFsResult<()> {
        let path = normalize_path(path);
        if path == "/" {
            return Err(MeshFsError::Config("cannot remove the root directory".to_string()));
        }
        let (parent, name) = split_path(&path);

        self.db()
            .transaction(|tx| {
                if let Some(dir) = tx_get::<DirectoryNode>(tx, &dir_key(&path))? {
                    if !dir.children.is_empty() {
                        return Err(abort(MeshFsError::DirectoryNotEmpty(path.clone())));
                    }
                    tx.remove(dir_key(&path).as_bytes())?;
                    tx.remove(obj_key(dir.uuid).as_bytes())?;
                } else if let Some(pointer) = tx_get::<FilePointer>(tx, &ptr_key(&path))? {
                    tx.remove(ptr_key(&path).as_bytes())?;
                    if let Some(record) = tx_get::<Record>(tx, &obj_key(pointer.uuid))? {
                        for key in index_operations::index_keys(&record) {
                            tx.remove(key.as_bytes())?;
                        }
                        tx.remove(obj_key(pointer.uuid).as_bytes())?;
                    }
                } else {
                    return Err(abort(MeshFsError::PathNotFound(path.clone())));
                }

                if let Some(mut dir) = tx_get::<DirectoryNode>(tx, &dir_key(&parent))? {
                    dir.children.remove(&name);
                    tx_put(tx, &dir_key(&parent), &dir)?;
                }
                Ok(())
            })
            .map_err(MeshFsError::from)?;
        self.db().flush()?;
        Ok(())
    }

    /// Lists a directory's children (or the single entry a file path
    /// resolves to). `limit` caps the result count.
    pub fn list_entries(
        &self,
        path: &str,
        recursive: bool,
        limit: usize,
    ) -> MeshFsResult<Vec<ListEntry>> {
        match self.resolve(path)? {
            Resolved::Pointer(pointer) => Ok(vec![ListEntry {
                path: pointer.full_path(),
                is_dir: false,
                pointer: Some(pointer),
            }]),
            Resolved::Directory(dir) => {
                let mut out = Vec::new();
                let mut queue = VecDeque::from([dir]);
                while let Some(dir) = queue.pop_front() {
                    for (name, kind) in &dir.children {
                        if out.len() >= limit {
                            debug!("listing of {} truncated at {} entries", path, limit);
                            return Ok(out);
                        }
                        let child_path = join_path(&dir.path, name);
                        match kind {
                            ChildKind::Directory => {
                                out.push(ListEntry {
                                    path: child_path.clone(),
                                    is_dir: true,
                                    pointer: None,
                                });
                                if recursive {
                                    if let Some(child) =
                                        self.get_item::<DirectoryNode>(&dir_key(&child_path))?
                                    {
                                        queue.push_back(child);
                                    }
                                }
                            }
                            ChildKind::File => {
                                let pointer =
                                    self.get_item::<FilePointer>(&ptr_key(&child_path))?;
                                out.push(ListEntry {
                                    path: child_path,
                                    is_dir: false,
                                    pointer,
                                });
                            }
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    /// Duplicates the source record under a new path entry. The copy gets
    /// a fresh identity over a copied payload; two pointers never share a
    /// uuid.
    pub fn cp(&self, source: &str, dest: &str) -> MeshFsResult<FilePointer> {
        let source = normalize_path(source);
        let dest = normalize_path(dest);
        let pointer = match self.resolve(&source)? {
            Resolved::Pointer(p) => p,
            Resolved::Directory(_) => {
                return Err(MeshFsError::Config(format!(
                    "cannot copy a directory: {}",
                    source
                )))
            }
        };
        let record = self
            .get_item::<Record>(&obj_key(pointer.uuid))?
            .ok_or_else(|| MeshFsError::NoSuchObject(pointer.uuid.to_string()))?;

        let (parent, name) = split_path(&dest);
        if name.is_empty() {
            return Err(MeshFsError::Config("destination must name a file".to_string()));
        }
        let mut copy = Record::new(&record.id, &parent, &name, &record.kind, record.payload.clone());
        copy.version = record.version;
        copy.permissions = record.permissions.clone();
        self.store_record(&copy)
    }

    /// Snapshot of every locally-registered file pointer.
    pub fn registry_snapshot(&self) -> MeshFsResult<Vec<FilePointer>> {
        Ok(self
            .scan_items::<FilePointer>(super::KEY_PTR)?
            .into_iter()
            .map(|(_, pointer)| pointer)
            .collect())
    }
}
