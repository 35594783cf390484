use thiserror::Error;

/// Unified error type for the entire application.
///
/// This error type centralizes all possible errors that can occur in the
/// application, providing a consistent interface for error handling and
/// propagation. The path/object variants form the domain taxonomy surfaced
/// to RPC callers; the remaining variants are ambient categories.
#[derive(Error, Debug)]
pub enum MeshFsError {
    /// A path segment (or the full path) does not resolve
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// The full path already resolves to a file or directory
    #[error("path already exists: {0}")]
    PathAlreadyExists(String),

    /// A directory with at least one child cannot be removed
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The record's kind does not define the requested operation
    #[error("no such operation '{operation}' for kind '{kind}'")]
    NoSuchOperation { kind: String, operation: String },

    /// Neither the local registry nor the broker could produce the object
    #[error("no such object: {0}")]
    NoSuchObject(String),

    /// A cross-node forward reached the owning node but the call failed
    #[error("remote lookup failed: {0}")]
    RemoteLookupFailed(String),

    /// An executed operation reported a failure
    #[error("operation '{operation}' failed: {message}")]
    Operation { operation: String, message: String },

    /// Errors related to the backing store
    #[error("database error: {0}")]
    Database(String),

    /// Errors related to serialization/deserialization
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Errors related to IO operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors related to configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Errors related to network operations
    #[error("network error: {0}")]
    Network(#[from] crate::network::NetworkError),
}

impl From<sled::Error> for MeshFsError {
    fn from(error: sled::Error) -> Self {
        MeshFsError::Database(error.to_string())
    }
}

impl From<serde_json::Error> for MeshFsError {
    fn from(error: serde_json::Error) -> Self {
        MeshFsError::Serialization(error.to_string())
    }
}

/// Unwraps a sled transaction failure into the application error it carries.
impl From<sled::transaction::TransactionError<MeshFsError>> for MeshFsError {
    fn from(error: sled::transaction::TransactionError<MeshFsError>) -> Self {
        match error {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(err) => {
                MeshFsError::Database(err.to_string())
            }
        }
    }
}

/// Result type alias for operations that can result in a MeshFsError
pub type MeshFsResult<T> = Result<T, MeshFsError>;
