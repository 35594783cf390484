use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{DEFAULT_PERMISSIONS, KIND_FILE};

/// A named, versioned unit of data stored in the Object Registry.
///
/// A Record is addressable two ways: by its full path (`path` + `name`)
/// through the Path Tree, and by its store-assigned `uuid` through the
/// Object Registry. The uuid is the stable identity; path entries are
/// lightweight pointers that reference it. The `kind` tag doubles as the
/// dispatch key for server-side execution: the operation registry maps
/// `(kind, operation)` pairs to handler functions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Caller-assigned identifier, not required to be unique store-wide
    pub id: String,
    /// Store-assigned, globally unique identity
    pub uuid: Uuid,
    /// Parent directory path
    pub path: String,
    /// Leaf name within the parent directory
    pub name: String,
    /// Permission string, carried but not enforced
    pub permissions: String,
    /// Kind tag used for operation dispatch (`file` when plain data)
    pub kind: String,
    /// Monotonic version counter, caller-supplied
    pub version: u64,
    /// The record body, a JSON value (usually an object)
    pub payload: Value,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// Creates a new Record with a generated uuid and current timestamp.
    ///
    /// The parent path is normalized (§ path rule: duplicate slashes
    /// collapse, trailing slashes are trimmed) and the name is stripped of
    /// any stray slashes so that `(path, name)` always joins cleanly.
    #[must_use]
    pub fn new(id: &str, path: &str, name: &str, kind: &str, payload: Value) -> Self {
        Self {
            id: id.to_string(),
            uuid: Uuid::new_v4(),
            path: normalize_path(path),
            name: name.trim_matches('/').to_string(),
            permissions: DEFAULT_PERMISSIONS.to_string(),
            kind: if kind.is_empty() {
                KIND_FILE.to_string()
            } else {
                kind.to_string()
            },
            version: 1,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Sets the caller-supplied version counter.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// The record's full path in the namespace.
    #[must_use]
    pub fn full_path(&self) -> String {
        join_path(&self.path, &self.name)
    }

    /// Serialized payload length in bytes, reported as the pointer size.
    #[must_use]
    pub fn payload_size(&self) -> u64 {
        serde_json::to_vec(&self.payload)
            .map(|v| v.len() as u64)
            .unwrap_or(0)
    }
}

/// The directory-tree-visible projection of a Record.
///
/// The full payload lives only in the Object Registry, keyed by `uuid`;
/// every pointer's uuid must resolve there, except `reference` pointers
/// whose body lives on the node named by `node`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePointer {
    pub path: String,
    pub name: String,
    pub uuid: Uuid,
    pub kind: String,
    pub size: u64,
    pub version: u64,
    pub date: DateTime<Utc>,
    /// RPC address of the owning node, set only when `kind == "reference"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

impl FilePointer {
    /// Builds the pointer projection of a record.
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        Self {
            path: record.path.clone(),
            name: record.name.clone(),
            uuid: record.uuid,
            kind: record.kind.clone(),
            size: record.payload_size(),
            version: record.version,
            date: record.created_at,
            node: None,
        }
    }

    #[must_use]
    pub fn full_path(&self) -> String {
        join_path(&self.path, &self.name)
    }
}

/// Kind of a directory child, enough to pick the right key prefix on descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildKind {
    File,
    Directory,
}

/// An interior path-tree node.
///
/// Directories are created lazily, one path segment at a time, and are
/// never deleted while non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryNode {
    pub path: String,
    pub uuid: Uuid,
    /// Child name -> child kind; the map is ordered so listings are stable
    pub children: BTreeMap<String, ChildKind>,
    pub created_at: DateTime<Utc>,
}

impl DirectoryNode {
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            path: normalize_path(path),
            uuid: Uuid::new_v4(),
            children: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Child count, reported as the directory's size.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.children.len() as u64
    }
}

/// Result of resolving a path against the Path Tree.
#[derive(Debug, Clone)]
pub enum Resolved {
    Pointer(FilePointer),
    Directory(DirectoryNode),
}

/// Broker-side record of a known peer node.
///
/// Descriptors are created on handshake receipt and never expired;
/// `last_seen` refreshes on every handshake so staleness is observable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub name: String,
    /// RPC address of the peer, `host:port`
    pub address: String,
    pub last_seen: DateTime<Utc>,
}

impl NodeDescriptor {
    #[must_use]
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            last_seen: Utc::now(),
        }
    }
}

/// Canonical path rule, applied once at every public entry point:
/// duplicate slashes collapse, trailing slashes are trimmed, the root
/// stays `/`.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Joins a parent path and a leaf name under the canonical path rule.
#[must_use]
pub fn join_path(parent: &str, name: &str) -> String {
    let parent = normalize_path(parent);
    let name = name.trim_matches('/');
    if name.is_empty() {
        return parent;
    }
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Splits a full path into `(parent, name)`; the root splits to `("/", "")`.
#[must_use]
pub fn split_path(path: &str) -> (String, String) {
    let path = normalize_path(path);
    if path == "/" {
        return ("/".to_string(), String::new());
    }
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => ("/".to_string(), path),
    }
}

/// Path segments of a normalized path, left to right.
#[must_use]
pub fn path_segments(path: &str) -> Vec<String> {
    normalize_path(path)
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_trims() {
        assert_eq!(normalize_path("/a//b/"), "/a/b");
        assert_eq!(normalize_path("a/b"), "/a/b");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn join_and_split_round_trip() {
        assert_eq!(join_path("/inventory", "widget1"), "/inventory/widget1");
        assert_eq!(join_path("/", "a"), "/a");
        assert_eq!(join_path("/a/", "/b/"), "/a/b");
        assert_eq!(
            split_path("/inventory/widget1"),
            ("/inventory".to_string(), "widget1".to_string())
        );
        assert_eq!(split_path("/a"), ("/".to_string(), "a".to_string()));
        assert_eq!(split_path("/"), ("/".to_string(), String::new()));
    }

    #[test]
    fn record_full_path_uses_canonical_join() {
        let record = Record::new("w1", "/inventory/", "widget1", "item", serde_json::json!({}));
        assert_eq!(record.full_path(), "/inventory/widget1");
    }
}
