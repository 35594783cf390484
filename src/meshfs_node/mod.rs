pub mod config;
pub mod node;
pub mod tcp_client;
pub mod tcp_server;

pub use config::{load_node_config, NodeConfig};
pub use node::MeshFsNode;
pub use tcp_client::TcpClient;
pub use tcp_server::TcpServer;
