use std::sync::Arc;

use log::{error, info};
use meshfs::constants::DEFAULT_DISCOVERY_PORT;
use meshfs::meshfs_node::load_node_config;
use meshfs::network::{BrokerClient, DiscoveryMessage, DiscoveryServer};
use meshfs::{MeshFsNode, TcpServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config_path = std::env::args().nth(1);
    let config = load_node_config(config_path.as_deref(), None)?;
    info!(
        "starting node '{}' (broker: {})",
        config.node_name, config.broker
    );

    let mut node = MeshFsNode::new(config.clone())?;
    if !config.broker {
        if let Some(rpc_address) = config.broker_address.as_deref() {
            node = node.with_broker_client(BrokerClient::new(
                rpc_address,
                config.discovery_address.as_deref(),
                &config.network,
            ));
        }
    }
    let node = Arc::new(node);

    let server = TcpServer::bind(Arc::clone(&node), &config.listen_address).await?;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("RPC server error: {}", e);
        }
    });

    if config.broker {
        let discovery_address = config
            .discovery_address
            .clone()
            .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_DISCOVERY_PORT));
        let discovery = DiscoveryServer::bind(&discovery_address).await?;

        let mut announcements = discovery.subscribe();
        let broker_node = Arc::clone(&node);
        tokio::spawn(async move {
            while let Ok(message) = announcements.recv().await {
                let DiscoveryMessage::Hi {
                    node: name,
                    address,
                } = message;
                if let Err(e) = broker_node.handle_announcement(&name, &address).await {
                    error!("failed to handle announcement from '{}': {}", name, e);
                }
            }
        });

        tokio::spawn(async move {
            if let Err(e) = discovery.run().await {
                error!("discovery server error: {}", e);
            }
        });
    } else if let Err(e) = node.announce().await {
        error!("broker announce failed: {}", e);
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server_handle.abort();
    Ok(())
}
