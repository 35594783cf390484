#![allow(dead_code)]

use std::sync::Arc;

use meshfs::{MeshFs, MeshFsNode, NodeConfig, TcpServer};
use tempfile::TempDir;

/// Opens a fresh engine over a scratch directory. The directory is removed
/// when the returned guard drops.
pub fn setup_test_engine() -> (MeshFs, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let engine = MeshFs::new(dir.path().to_str().expect("temp dir path"))
        .expect("failed to open test engine");
    (engine, dir)
}

/// Node config over a scratch directory.
pub fn test_node_config(dir: &TempDir) -> NodeConfig {
    NodeConfig::new(dir.path().to_path_buf())
}

/// Picks a currently-free local port.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("failed to bind probe listener")
        .local_addr()
        .expect("probe listener has no address")
        .port()
}

/// Binds the node's RPC server on its configured address and runs it in a
/// background task.
pub async fn spawn_server(node: Arc<MeshFsNode>) {
    let address = node.config().listen_address.clone();
    let server = TcpServer::bind(node, &address)
        .await
        .expect("failed to bind test server");
    tokio::spawn(async move {
        let _ = server.run().await;
    });
}
