//! On-disk node snapshots.
//!
//! A node persists as four JSON files under `<data_dir>/nodes/<owner>/`:
//!
//! - `kad.kns` — owner name and listen port
//! - `node.kns` — the local contact
//! - `routingtable.kns` — non-empty buckets as `{depth, contacts}` records
//! - `dht.kns` — the stored content items (values hex-encoded)
//!
//! The data directory comes from `TESSERA_DATA_DIR`, falling back to
//! `$HOME/.tessera`. Loading a snapshot reconstructs a node whose routing
//! table and content store are semantically equal to the saved one.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use tessera_types::{Contact, Content};

use crate::node::Node;
use crate::Result;

const KAD_FILE: &str = "kad.kns";
const NODE_FILE: &str = "node.kns";
const ROUTING_FILE: &str = "routingtable.kns";
const DHT_FILE: &str = "dht.kns";

#[derive(Debug, Serialize, Deserialize)]
struct KadFile {
    owner: String,
    port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
struct BucketRecord {
    depth: usize,
    contacts: Vec<Contact>,
}

/// The base directory for all persisted state.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TESSERA_DATA_DIR") {
        return PathBuf::from(dir);
    }
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".tessera"))
        .unwrap_or_else(|_| PathBuf::from("/tmp/tessera"))
}

fn owner_dir(base: &Path, owner: &str) -> PathBuf {
    base.join("nodes").join(owner)
}

/// Whether a snapshot exists for `owner` under the default data directory.
pub fn exists(owner: &str) -> bool {
    exists_in(&data_dir(), owner)
}

/// Whether a snapshot exists for `owner` under `base`.
pub fn exists_in(base: &Path, owner: &str) -> bool {
    owner_dir(base, owner).join(KAD_FILE).exists()
}

/// Save the node's state under the default data directory.
pub fn save(node: &Node) -> Result<()> {
    save_in(&data_dir(), node)
}

/// Save the node's state under `base`, creating the directory tree.
pub fn save_in(base: &Path, node: &Node) -> Result<()> {
    let dir = owner_dir(base, node.owner());
    fs::create_dir_all(&dir)?;

    write_json(
        &dir.join(KAD_FILE),
        &KadFile {
            owner: node.owner().to_string(),
            port: node.local().port,
        },
    )?;
    write_json(&dir.join(NODE_FILE), node.local())?;

    let buckets: Vec<BucketRecord> = node
        .shared
        .table_guard()
        .bucket_contents()
        .into_iter()
        .map(|(depth, contacts)| BucketRecord { depth, contacts })
        .collect();
    write_json(&dir.join(ROUTING_FILE), &buckets)?;

    let contents: Vec<Content> = node.shared.store_guard().all();
    write_json(&dir.join(DHT_FILE), &contents)?;

    info!(owner = node.owner(), dir = %dir.display(), "node state saved");
    Ok(())
}

/// Reconstruct a node from the snapshot for `owner` under the default
/// data directory. Rebinds the saved port.
pub async fn load(owner: &str) -> Result<Node> {
    load_in(&data_dir(), owner).await
}

/// Reconstruct a node from the snapshot for `owner` under `base`.
pub async fn load_in(base: &Path, owner: &str) -> Result<Node> {
    let dir = owner_dir(base, owner);
    let kad: KadFile = read_json(&dir.join(KAD_FILE))?;
    let local: Contact = read_json(&dir.join(NODE_FILE))?;
    let buckets: Vec<BucketRecord> = read_json(&dir.join(ROUTING_FILE))?;
    let contents: Vec<Content> = read_json(&dir.join(DHT_FILE))?;

    let node = Node::bind_at(kad.owner, local.id, local.ip, kad.port).await?;
    {
        let mut table = node.shared.table_guard();
        for bucket in buckets {
            for contact in bucket.contacts {
                table.insert(contact);
            }
        }
    }
    {
        let mut store = node.shared.store_guard();
        for content in contents {
            store.put(content);
        }
    }

    info!(owner = node.owner(), "node state restored");
    Ok(node)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
