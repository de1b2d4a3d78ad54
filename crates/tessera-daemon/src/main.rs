//! tessera-daemon: a long-running Tessera DHT node.
//!
//! Binds the node (restoring a saved snapshot when one exists for the
//! configured owner), optionally joins an overlay through a bootstrap
//! peer, then refreshes buckets and re-publishes content on a timer until
//! ctrl-c.

mod config;

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tracing::{info, warn};

use tessera_node::{snapshot, Node};
use tessera_types::Key;

use crate::config::DaemonConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tessera=info".parse()?),
        )
        .init();

    info!("Tessera daemon starting");

    let config = DaemonConfig::load()?;
    std::fs::create_dir_all(snapshot::data_dir())?;

    let node = if snapshot::exists(&config.node.owner) {
        info!(owner = %config.node.owner, "Restoring node from snapshot");
        snapshot::load(&config.node.owner).await?
    } else {
        let id = if config.node.node_id.is_empty() {
            Key::random()
        } else {
            Key::from_hex(&config.node.node_id)?
        };
        let ip: Ipv4Addr = config.network.advertise_ip.parse()?;
        Node::bind_at(config.node.owner.clone(), id, ip, config.network.listen_port).await?
    };

    info!(id = %node.local().id, port = node.local().port, "Node listening");

    if !config.network.bootstrap.is_empty() {
        let bootstrap: SocketAddr = config.network.bootstrap.parse()?;
        match node.connect(bootstrap).await {
            Ok(()) => info!(peer = %bootstrap, "Joined overlay"),
            Err(e) => warn!(peer = %bootstrap, error = %e, "Bootstrap failed, continuing standalone"),
        }
    }

    let mut refresh = tokio::time::interval(Duration::from_secs(
        config.network.refresh_interval_secs.max(1),
    ));
    // Consume the immediate first tick; the post-bootstrap refresh already ran.
    refresh.tick().await;

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                info!("Running periodic refresh");
                if let Err(e) = node.refresh().await {
                    warn!(error = %e, "Periodic refresh failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    if config.network.save_state_on_shutdown {
        snapshot::save(&node)?;
    }
    node.shutdown();

    info!("Daemon stopped");
    Ok(())
}
