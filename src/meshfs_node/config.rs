use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_LIST_LIMIT, DEFAULT_RPC_PORT};
use crate::network::NetworkConfig;

/// Configuration for a MeshFsNode instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Path where the node will store its data
    pub storage_path: PathBuf,
    /// Name this node announces itself under
    #[serde(default = "default_node_name")]
    pub node_name: String,
    /// RPC listening address, `host:port`
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Whether this node is the broker: it aggregates the mesh namespace
    /// and skips its own broker-forwarding logic
    #[serde(default)]
    pub broker: bool,
    /// RPC address of the broker (non-broker nodes)
    #[serde(default)]
    pub broker_address: Option<String>,
    /// Discovery channel address: bound by the broker, announced to by
    /// everyone else
    #[serde(default)]
    pub discovery_address: Option<String>,
    /// Cap on `list` result size
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
    /// Network layer settings
    #[serde(default)]
    pub network: NetworkConfig,
}

fn default_node_name() -> String {
    "node".to_string()
}

fn default_listen_address() -> String {
    format!("127.0.0.1:{}", DEFAULT_RPC_PORT)
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("data"),
            node_name: default_node_name(),
            listen_address: default_listen_address(),
            broker: false,
            broker_address: None,
            discovery_address: None,
            list_limit: default_list_limit(),
            network: NetworkConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Create a new node configuration with the specified storage path
    #[must_use]
    pub fn new(storage_path: PathBuf) -> Self {
        Self {
            storage_path,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_node_name(mut self, name: &str) -> Self {
        self.node_name = name.to_string();
        self
    }

    #[must_use]
    pub fn with_listen_address(mut self, address: &str) -> Self {
        self.listen_address = address.to_string();
        self
    }

    /// Marks this node as the broker
    #[must_use]
    pub fn as_broker(mut self) -> Self {
        self.broker = true;
        self
    }

    /// Points a non-broker node at its broker
    #[must_use]
    pub fn with_broker(mut self, rpc_address: &str, discovery_address: Option<&str>) -> Self {
        self.broker_address = Some(rpc_address.to_string());
        self.discovery_address = discovery_address.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_list_limit(mut self, limit: usize) -> Self {
        self.list_limit = limit;
        self
    }
}

/// Load a node configuration from the given path or from the
/// `MESHFS_NODE_CONFIG` environment variable.
///
/// JSON is the default encoding; files ending in `.toml` parse as TOML.
/// If the file does not exist, a default [`NodeConfig`] is returned. When
/// a `port` is provided in this case, the returned config will have its
/// `listen_address` set to `"127.0.0.1:<port>"`.
pub fn load_node_config(
    path: Option<&str>,
    port: Option<u16>,
) -> Result<NodeConfig, std::io::Error> {
    use std::fs;

    let config_path = path
        .map(|p| p.to_string())
        .or_else(|| std::env::var("MESHFS_NODE_CONFIG").ok())
        .unwrap_or_else(|| "config/node_config.json".to_string());

    if let Ok(config_str) = fs::read_to_string(&config_path) {
        let parsed: Result<NodeConfig, String> = if config_path.ends_with(".toml") {
            toml::from_str(&config_str).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&config_str).map_err(|e| e.to_string())
        };
        match parsed {
            Ok(mut config) => {
                if let Some(p) = port {
                    config.listen_address = format!("127.0.0.1:{}", p);
                }
                Ok(config)
            }
            Err(e) => {
                log::error!("failed to parse node configuration: {}", e);
                Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            }
        }
    } else {
        let mut config = NodeConfig::default();
        if let Some(p) = port {
            config.listen_address = format!("127.0.0.1:{}", p);
        }
        Ok(config)
    }
}
