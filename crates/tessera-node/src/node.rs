//! The DHT node and its local operations.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tessera_dht::kademlia::RoutingTable;
use tessera_dht::store::ContentStore;
use tessera_dht::{K, OPERATION_TIMEOUT_MS};
use tessera_transport::messages::Message;
use tessera_transport::udp::{ReplyEvent, RequestHandler, UdpEndpoint};
use tessera_types::{Contact, Content, GetParameter, Key};

use crate::{lookup, NodeError, Result};

/// State shared between the node's operations and the transport's inbound
/// request path.
pub(crate) struct NodeShared {
    local: Contact,
    owner: String,
    table: Mutex<RoutingTable>,
    store: Mutex<ContentStore>,
    transport: Arc<UdpEndpoint>,
    operation_timeout: Duration,
}

impl NodeShared {
    pub(crate) fn local(&self) -> &Contact {
        &self.local
    }

    pub(crate) fn transport(&self) -> &UdpEndpoint {
        &self.transport
    }

    pub(crate) fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    pub(crate) fn table_guard(&self) -> MutexGuard<'_, RoutingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn store_guard(&self) -> MutexGuard<'_, ContentStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Every inbound request also teaches us about its sender, so the origin
// contact is inserted before the verb is serviced.
impl RequestHandler for NodeShared {
    fn handle(&self, message: Message, _source: SocketAddr) -> Option<Message> {
        match message {
            Message::ConnectRequest { origin } => {
                self.table_guard().insert(origin);
                Some(Message::ConnectReply {
                    origin: self.local.clone(),
                })
            }
            Message::NodeLookupRequest { origin, target } => {
                let contacts = {
                    let mut table = self.table_guard();
                    table.insert(origin);
                    table.find_closest(&target, K)
                };
                Some(Message::NodeReply {
                    origin: self.local.clone(),
                    contacts,
                })
            }
            Message::StoreRequest { origin, content } => {
                self.table_guard().insert(origin);
                debug!(key = %content.key, "storing content placed by peer");
                self.store_guard().put(content);
                None
            }
            Message::ContentLookupRequest { origin, params } => {
                self.table_guard().insert(origin);
                let hit = self.store_guard().get(&params).cloned();
                match hit {
                    Some(content) => Some(Message::ContentReply {
                        origin: self.local.clone(),
                        content,
                    }),
                    None => Some(Message::NodeReply {
                        origin: self.local.clone(),
                        contacts: self.table_guard().find_closest(&params.key, K),
                    }),
                }
            }
            // Replies are matched against the pending table by the
            // transport and never reach the handler.
            _ => None,
        }
    }
}

/// A Tessera DHT node.
///
/// Owns its routing table, content store, and UDP transport. All
/// operations may run concurrently; the table and store each serialize
/// their own state.
pub struct Node {
    pub(crate) shared: Arc<NodeShared>,
}

impl Node {
    /// Bind a node on the given UDP port (0 for ephemeral), advertising
    /// the loopback address.
    pub async fn bind(owner: impl Into<String>, id: Key, port: u16) -> Result<Self> {
        Self::bind_at(owner, id, Ipv4Addr::LOCALHOST, port).await
    }

    /// Bind a node advertising the given IPv4 address to peers.
    pub async fn bind_at(
        owner: impl Into<String>,
        id: Key,
        ip: Ipv4Addr,
        port: u16,
    ) -> Result<Self> {
        let operation_timeout = Duration::from_millis(OPERATION_TIMEOUT_MS);
        let transport = UdpEndpoint::bind(port, operation_timeout).await?;
        let local = Contact::new(id, ip, transport.port());

        let shared = Arc::new(NodeShared {
            local: local.clone(),
            owner: owner.into(),
            table: Mutex::new(RoutingTable::new(id)),
            store: Mutex::new(ContentStore::new()),
            transport,
            operation_timeout,
        });
        let handler_arc: Arc<dyn RequestHandler> = shared.clone();
        let handler: Weak<dyn RequestHandler> = Arc::downgrade(&handler_arc);
        shared.transport.install_handler(handler);

        info!(id = %local.id, port = local.port, "node listening");
        Ok(Self { shared })
    }

    /// The node's own contact.
    pub fn local(&self) -> &Contact {
        self.shared.local()
    }

    /// The owner name this node persists under.
    pub fn owner(&self) -> &str {
        &self.shared.owner
    }

    /// Every contact currently in the routing table.
    pub fn contacts(&self) -> Vec<Contact> {
        self.shared.table_guard().all_nodes()
    }

    /// Every content item currently in the local store.
    pub fn contents(&self) -> Vec<Content> {
        self.shared.store_guard().all()
    }

    /// Seed the routing table with a known contact.
    pub fn add_contact(&self, contact: Contact) {
        self.shared.table_guard().insert(contact);
    }

    /// Join the overlay through a bootstrap peer.
    ///
    /// Performs the connect handshake to learn the peer's identifier,
    /// inserts it, looks up the local id to populate nearby buckets, then
    /// runs one full refresh.
    pub async fn connect(&self, bootstrap: SocketAddr) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.shared
            .transport
            .request(
                bootstrap,
                Message::ConnectRequest {
                    origin: self.shared.local.clone(),
                },
                tx,
            )
            .await?;

        let event = tokio::time::timeout(self.shared.operation_timeout, rx.recv())
            .await
            .map_err(|_| NodeError::RoutingTimeout)?;
        match event {
            Some(ReplyEvent::Reply {
                message: Message::ConnectReply { origin },
                ..
            }) => {
                info!(peer = %origin, "bootstrap peer responded");
                self.shared.table_guard().insert(origin);
            }
            _ => return Err(NodeError::RoutingTimeout),
        }

        self.lookup(self.shared.local.id).await?;
        self.refresh().await?;
        Ok(())
    }

    /// Find the K closest contacts to `target`.
    pub async fn lookup(&self, target: Key) -> Result<Vec<Contact>> {
        lookup::node_lookup(&self.shared, target).await
    }

    /// Place a content item on the K nodes closest to its key.
    ///
    /// Returns the number of placements made (the local store counts when
    /// this node is among the closest).
    pub async fn put(&self, content: Content) -> Result<usize> {
        let responders = lookup::node_lookup(&self.shared, content.key).await?;
        let mut placed = 0usize;
        for peer in responders {
            if peer.id == self.shared.local.id {
                self.shared.store_guard().put(content.clone());
                placed += 1;
                continue;
            }
            let message = Message::StoreRequest {
                origin: self.shared.local.clone(),
                content: content.clone(),
            };
            match self.shared.transport.send(peer.address(), message).await {
                Ok(()) => placed += 1,
                Err(error) => warn!(peer = %peer, error = %error, "store placement failed"),
            }
        }
        debug!(key = %content.key, placed, "content placed");
        Ok(placed)
    }

    /// Retrieve content matching `param`, preferring the local store,
    /// collecting up to `wanted` distinct replies from the overlay.
    pub async fn get(&self, param: GetParameter, wanted: usize) -> Result<Vec<Content>> {
        let local_hit = self.shared.store_guard().get(&param).cloned();
        if let Some(content) = local_hit {
            return Ok(vec![content]);
        }
        lookup::content_lookup(&self.shared, param, wanted.max(1)).await
    }

    /// Refresh every bucket with a lookup and re-publish the local store.
    ///
    /// Individual lookup failures are logged and skipped; refresh is a
    /// maintenance sweep, not a transaction.
    pub async fn refresh(&self) -> Result<()> {
        let ids = self.shared.table_guard().refresh_ids();
        for id in ids {
            if let Err(error) = lookup::node_lookup(&self.shared, id).await {
                debug!(target = %id, error = %error, "bucket refresh lookup failed");
            }
        }

        let items = self.shared.store_guard().all();
        for content in items {
            let key = content.key;
            if let Err(error) = self.put(content).await {
                debug!(key = %key, error = %error, "content re-publication failed");
            }
        }
        Ok(())
    }

    /// Stop the transport. Outstanding requests observe timeouts; any
    /// lookup still running fails over to its error path.
    pub fn shutdown(&self) {
        info!(id = %self.shared.local.id, "node shutting down");
        self.shared.transport.shutdown();
    }
}
