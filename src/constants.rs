/// Common constants used across the MeshFS project.
///
/// These defaults are used for command line arguments and
/// configuration when explicit values are not provided.
pub const DEFAULT_RPC_PORT: u16 = 5558;
pub const DEFAULT_DISCOVERY_PORT: u16 = 5557;

/// Default cap on the number of entries a single `list` call returns.
pub const DEFAULT_LIST_LIMIT: usize = 200;

/// Tag prepended to directory entries in `list` output.
pub const DIR_TAG: &str = "dir:";

/// Default permission string for newly stored records.
pub const DEFAULT_PERMISSIONS: &str = "rw-rw-rw-";

/// Record kind assigned when the caller does not supply one.
pub const KIND_FILE: &str = "file";
/// Record kind of interior path-tree entries.
pub const KIND_DIRECTORY: &str = "directory";
/// Record kind of pointers whose payload lives on another node.
pub const KIND_REFERENCE: &str = "reference";
