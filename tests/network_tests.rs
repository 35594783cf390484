use std::sync::Arc;
use std::time::Duration;

use meshfs::network::{BrokerClient, DiscoveryMessage, DiscoveryServer, NetworkConfig};
use meshfs::{MeshFsError, MeshFsNode, NodeConfig, TcpClient};
use serde_json::json;
use tempfile::TempDir;

mod test_helpers;
use test_helpers::{free_port, spawn_server};

fn scratch_config(dir: &TempDir, port: u16) -> NodeConfig {
    NodeConfig::new(dir.path().to_path_buf())
        .with_listen_address(&format!("127.0.0.1:{}", port))
}

/// Broker node with a running RPC server.
async fn spawn_broker(dir: &TempDir) -> (Arc<MeshFsNode>, String) {
    let port = free_port();
    let config = scratch_config(dir, port)
        .with_node_name("broker")
        .as_broker();
    let node = Arc::new(MeshFsNode::new(config).expect("failed to create broker"));
    spawn_server(Arc::clone(&node)).await;
    (node, format!("127.0.0.1:{}", port))
}

/// Non-broker node pointed at the broker, with a running RPC server.
async fn spawn_member(dir: &TempDir, name: &str, broker_address: &str) -> (Arc<MeshFsNode>, String) {
    let port = free_port();
    let config = scratch_config(dir, port)
        .with_node_name(name)
        .with_broker(broker_address, None);
    let client = BrokerClient::new(broker_address, None, &config.network);
    let node = Arc::new(
        MeshFsNode::new(config)
            .expect("failed to create node")
            .with_broker_client(client),
    );
    spawn_server(Arc::clone(&node)).await;
    (node, format!("127.0.0.1:{}", port))
}

#[tokio::test]
async fn store_registers_a_reference_with_the_broker() {
    let broker_dir = TempDir::new().unwrap();
    let member_dir = TempDir::new().unwrap();
    let (broker, broker_address) = spawn_broker(&broker_dir).await;
    let (member, member_address) = spawn_member(&member_dir, "node-a", &broker_address).await;

    member
        .store("x1", "/files", "x", "file", 1, json!({"data": "owned by a"}))
        .await
        .expect("store failed");

    let pointer = broker.engine().get_pointer("/files/x").expect("no reference at broker");
    assert_eq!(pointer.kind, "reference");
    assert_eq!(pointer.node.as_deref(), Some(member_address.as_str()));
}

#[tokio::test]
async fn broker_proxies_getobject_to_the_owning_node() {
    let broker_dir = TempDir::new().unwrap();
    let member_dir = TempDir::new().unwrap();
    let (_broker, broker_address) = spawn_broker(&broker_dir).await;
    let (member, _member_address) = spawn_member(&member_dir, "node-a", &broker_address).await;

    member
        .store("x1", "/files", "x", "file", 1, json!({"data": "owned by a"}))
        .await
        .expect("store failed");

    // the broker returns the same payload the owning node returns
    let direct = member.get_object("/files/x", true).await.expect("direct lookup failed");
    let client = TcpClient::new(&broker_address, &NetworkConfig::default());
    let via_broker = client.get_object("/files/x", true).await.expect("broker lookup failed");
    assert_eq!(via_broker["payload"], direct["payload"]);
    assert_eq!(via_broker["uuid"], direct["uuid"]);
}

#[tokio::test]
async fn local_miss_forwards_through_the_broker() {
    let broker_dir = TempDir::new().unwrap();
    let a_dir = TempDir::new().unwrap();
    let b_dir = TempDir::new().unwrap();
    let (_broker, broker_address) = spawn_broker(&broker_dir).await;
    let (node_a, _) = spawn_member(&a_dir, "node-a", &broker_address).await;
    let (node_b, _) = spawn_member(&b_dir, "node-b", &broker_address).await;

    node_a
        .store("x1", "/files", "x", "file", 1, json!({"data": "owned by a"}))
        .await
        .expect("store failed");

    // node B has no /files/x locally; the lookup chains B -> broker -> A
    let value = node_b.get_object("/files/x", true).await.expect("forwarded lookup failed");
    assert_eq!(value["payload"], json!({"data": "owned by a"}));
}

#[tokio::test]
async fn forwarding_failure_surfaces_no_such_object() {
    let dir = TempDir::new().unwrap();
    let dead_address = format!("127.0.0.1:{}", free_port());
    let config = scratch_config(&dir, free_port()).with_broker(&dead_address, None);
    let client = BrokerClient::new(&dead_address, None, &config.network);
    let node = MeshFsNode::new(config)
        .expect("failed to create node")
        .with_broker_client(client);

    let err = node
        .get_object("/never/stored", true)
        .await
        .expect_err("lookup should fail");
    assert!(matches!(err, MeshFsError::NoSuchObject(_)));
}

#[tokio::test]
async fn discovery_announcement_completes_a_mutual_handshake() {
    let broker_dir = TempDir::new().unwrap();
    let member_dir = TempDir::new().unwrap();
    let (broker, broker_address) = spawn_broker(&broker_dir).await;

    let discovery = DiscoveryServer::bind("127.0.0.1:0").await.expect("bind failed");
    let discovery_address = discovery.local_addr().expect("no local addr").to_string();
    let mut announcements = discovery.subscribe();
    tokio::spawn(async move {
        let _ = discovery.run().await;
    });

    let member_port = free_port();
    let member_config = scratch_config(&member_dir, member_port)
        .with_node_name("node-a")
        .with_broker(&broker_address, Some(&discovery_address));
    let client = BrokerClient::new(&broker_address, Some(&discovery_address), &member_config.network);
    let member = Arc::new(
        MeshFsNode::new(member_config)
            .expect("failed to create node")
            .with_broker_client(client),
    );
    spawn_server(Arc::clone(&member)).await;

    member.announce().await.expect("announce failed");

    let message = tokio::time::timeout(Duration::from_secs(5), announcements.recv())
        .await
        .expect("no announcement within 5s")
        .expect("discovery channel closed");
    let DiscoveryMessage::Hi { node: name, address } = message;
    assert_eq!(name, "node-a");
    assert_eq!(address, format!("127.0.0.1:{}", member_port));

    broker
        .handle_announcement(&name, &address)
        .await
        .expect("handle_announcement failed");

    // broker recorded the member
    let descriptor = broker
        .engine()
        .db_ops()
        .get_node("node-a")
        .expect("node table read failed")
        .expect("no descriptor for node-a");
    assert_eq!(descriptor.address, address);

    // first sight triggered the hello callback, so the member knows the
    // broker too
    let descriptor = member
        .engine()
        .db_ops()
        .get_node("broker")
        .expect("node table read failed")
        .expect("member never got the hello callback");
    assert_eq!(descriptor.address, broker_address);
}
