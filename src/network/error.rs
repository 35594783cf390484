use thiserror::Error;

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Error types for network operations
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("message error: {0}")]
    Message(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        NetworkError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        NetworkError::Message(err.to_string())
    }
}
