//! Daemon configuration file management.

use serde::{Deserialize, Serialize};

use tessera_dht::REFRESH_INTERVAL_SECS;
use tessera_node::snapshot;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Node identity settings.
    #[serde(default)]
    pub node: NodeConfig,
    /// Network settings.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Node identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Owner name the node persists under.
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Node id as a 40-character hex string. Empty = random on first start.
    #[serde(default)]
    pub node_id: String,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// 0 = OS-assigned ephemeral port.
    #[serde(default)]
    pub listen_port: u16,
    /// IPv4 address advertised to peers.
    #[serde(default = "default_advertise_ip")]
    pub advertise_ip: String,
    /// Bootstrap peer as "ip:port". Empty = start a fresh overlay.
    #[serde(default)]
    pub bootstrap: String,
    /// Bucket refresh and re-publication period in seconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Persist the routing table and content store on shutdown.
    #[serde(default = "default_true")]
    pub save_state_on_shutdown: bool,
}

// Default value functions

fn default_owner() -> String {
    "default".to_string()
}

fn default_advertise_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_refresh_interval() -> u64 {
    REFRESH_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            node_id: String::new(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            advertise_ip: default_advertise_ip(),
            bootstrap: String::new(),
            refresh_interval_secs: default_refresh_interval(),
            save_state_on_shutdown: true,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from `<data_dir>/config.toml`, falling back to
    /// defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = snapshot::data_dir().join("config.toml");
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}
