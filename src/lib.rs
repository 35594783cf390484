pub mod constants;
pub mod db_operations;
pub mod error;
pub mod execution;
pub mod meshfs_core;
pub mod meshfs_node;
pub mod network;
pub mod record;

pub use db_operations::DbOperations;
pub use error::{MeshFsError, MeshFsResult};
pub use meshfs_core::MeshFs;
pub use meshfs_node::{MeshFsNode, NodeConfig, TcpClient, TcpServer};
pub use network::{BrokerClient, DiscoveryServer, NetworkConfig};
pub use record::{DirectoryNode, FilePointer, NodeDescriptor, Record};
