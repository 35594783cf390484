//! Server-side execution of named operations against stored records.
//!
//! Records declare a `kind` tag; the registry maps `(kind, operation)`
//! pairs to handler functions compiled into the server. This replaces
//! shipping executable behavior alongside the data: new record kinds
//! require a server-side deployment, which is an explicit constraint of
//! the design.

mod builtins;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::MeshFsResult;
use crate::record::Record;

/// A registered operation handler.
///
/// Handlers may mutate the record's payload; the engine persists the
/// record back under the same uuid after a successful return. The store
/// context lets an operation traverse other paths server-side.
pub type OperationFn = fn(&mut Record, &dyn StoreContext) -> MeshFsResult<Value>;

/// Restricted store façade passed to operation handlers.
pub trait StoreContext {
    /// Display-form listing of a path (`dir:` tag on directories).
    fn list(&self, path: &str, recursive: bool) -> MeshFsResult<Vec<String>>;
    /// Loads a record by path or identity.
    fn get_record(&self, target: &str) -> MeshFsResult<Record>;
}

/// Table of `(kind, operation) -> handler` registrations.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    handlers: HashMap<(String, String), OperationFn>,
}

impl OperationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in kinds.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::register_builtins(&mut registry);
        registry
    }

    /// Registers a handler, replacing any previous registration for the
    /// same `(kind, operation)` pair.
    pub fn register(&mut self, kind: &str, operation: &str, handler: OperationFn) {
        self.handlers
            .insert((kind.to_string(), operation.to_string()), handler);
    }

    #[must_use]
    pub fn get(&self, kind: &str, operation: &str) -> Option<OperationFn> {
        self.handlers
            .get(&(kind.to_string(), operation.to_string()))
            .copied()
    }

    #[must_use]
    pub fn defines(&self, kind: &str, operation: &str) -> bool {
        self.get(kind, operation).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

static DEFAULT_REGISTRY: Lazy<OperationRegistry> = Lazy::new(OperationRegistry::with_builtins);

/// The process-wide default registry (built-in kinds only).
pub fn default_registry() -> &'static OperationRegistry {
    &DEFAULT_REGISTRY
}
