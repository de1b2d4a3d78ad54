//! UDP request/reply endpoint.
//!
//! One [`UdpEndpoint`] owns the node's socket. Outbound requests are
//! tagged with a fresh correlation id and parked in a pending-reply table;
//! the receive task matches inbound replies against that table and routes
//! inbound requests to the installed handler. A sweep task expires pending
//! entries whose deadline has passed, delivering a timeout event on the
//! same channel the reply would have used.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, trace, warn};

use crate::messages::Message;
use crate::wire::{self, MAX_DATAGRAM_SIZE};
use crate::Result;

/// How often the sweep task checks pending-reply deadlines.
const SWEEP_INTERVAL_MS: u64 = 250;

/// Event delivered to a request's reply sink.
#[derive(Clone, Debug)]
pub enum ReplyEvent {
    /// A reply datagram arrived for the request.
    Reply {
        correlation: u32,
        message: Message,
    },
    /// The request's deadline passed without a reply.
    Timeout { correlation: u32 },
}

/// Channel end that receives [`ReplyEvent`]s for requests issued with it.
pub type ReplySink = mpsc::UnboundedSender<ReplyEvent>;

/// Handler for inbound request messages.
///
/// Returning `Some(reply)` sends the reply back to the source address
/// under the request's correlation id.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, message: Message, source: SocketAddr) -> Option<Message>;
}

struct PendingReply {
    sink: ReplySink,
    deadline: Instant,
    destination: SocketAddr,
}

/// UDP socket pump with correlation-id multiplexing.
pub struct UdpEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    request_timeout: Duration,
    pending: Mutex<HashMap<u32, PendingReply>>,
    next_correlation: AtomicU32,
    handler: OnceLock<Weak<dyn RequestHandler>>,
    shutdown: broadcast::Sender<()>,
}

impl UdpEndpoint {
    /// Bind the socket and start the receive and sweep tasks.
    ///
    /// Port 0 binds an ephemeral port; [`UdpEndpoint::port`] reports the
    /// actual one. `request_timeout` is the reply deadline applied to
    /// every outbound request.
    pub async fn bind(port: u16, request_timeout: Duration) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        let local_addr = socket.local_addr()?;
        let (shutdown, _) = broadcast::channel(1);

        let endpoint = Arc::new(Self {
            socket,
            local_addr,
            request_timeout,
            pending: Mutex::new(HashMap::new()),
            next_correlation: AtomicU32::new(0),
            handler: OnceLock::new(),
            shutdown,
        });

        tokio::spawn(Arc::clone(&endpoint).run(endpoint.shutdown.subscribe()));
        tokio::spawn(Arc::clone(&endpoint).sweep(endpoint.shutdown.subscribe()));
        Ok(endpoint)
    }

    /// The bound UDP port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Install the request handler. Effective once; later calls are
    /// ignored.
    pub fn install_handler(&self, handler: Weak<dyn RequestHandler>) {
        if self.handler.set(handler).is_err() {
            warn!("request handler already installed");
        }
    }

    /// Send a request and register `sink` for its reply or timeout.
    ///
    /// Returns the correlation id the reply will carry.
    pub async fn request(
        &self,
        destination: SocketAddr,
        message: Message,
        sink: ReplySink,
    ) -> Result<u32> {
        let correlation = {
            let mut pending = self.pending_table();
            let correlation = loop {
                let candidate = self.next_correlation.fetch_add(1, Ordering::Relaxed);
                if !pending.contains_key(&candidate) {
                    break candidate;
                }
            };
            pending.insert(
                correlation,
                PendingReply {
                    sink,
                    deadline: Instant::now() + self.request_timeout,
                    destination,
                },
            );
            correlation
        };

        let datagram = match wire::encode(&message, correlation) {
            Ok(datagram) => datagram,
            Err(e) => {
                let _ = self.pending_table().remove(&correlation);
                return Err(e);
            }
        };
        if let Err(e) = self.socket.send_to(&datagram, destination).await {
            let _ = self.pending_table().remove(&correlation);
            return Err(e.into());
        }
        trace!(correlation, peer = %destination, code = message.code(), "request sent");
        Ok(correlation)
    }

    /// Send a message without expecting a reply.
    pub async fn send(&self, destination: SocketAddr, message: Message) -> Result<()> {
        let correlation = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        let datagram = wire::encode(&message, correlation)?;
        self.socket.send_to(&datagram, destination).await?;
        trace!(correlation, peer = %destination, code = message.code(), "datagram sent");
        Ok(())
    }

    /// Stop the receive and sweep tasks; every pending request observes a
    /// timeout.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, source)) => self.dispatch(&buf[..len], source).await,
                    Err(e) => {
                        error!(error = %e, "receive loop failed");
                        break;
                    }
                }
            }
        }
        self.drain_pending();
    }

    async fn dispatch(&self, datagram: &[u8], source: SocketAddr) {
        let (correlation, message) = match wire::decode(datagram) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(peer = %source, error = %e, "dropping undecodable datagram");
                return;
            }
        };

        if message.is_reply() {
            let entry = {
                let mut pending = self.pending_table();
                match pending.get(&correlation).map(|p| p.destination == source) {
                    Some(true) => pending.remove(&correlation),
                    Some(false) => {
                        debug!(correlation, peer = %source, "reply from unexpected source");
                        return;
                    }
                    None => None,
                }
            };
            match entry {
                Some(p) => {
                    let _ = p.sink.send(ReplyEvent::Reply {
                        correlation,
                        message,
                    });
                }
                None => {
                    trace!(correlation, peer = %source, "dropping reply with unknown correlation id");
                }
            }
        } else {
            let Some(handler) = self.handler.get().and_then(Weak::upgrade) else {
                debug!(peer = %source, "no request handler; dropping request");
                return;
            };
            if let Some(reply) = handler.handle(message, source) {
                match wire::encode(&reply, correlation) {
                    Ok(datagram) => {
                        if let Err(e) = self.socket.send_to(&datagram, source).await {
                            warn!(peer = %source, error = %e, "reply send failed");
                        }
                    }
                    Err(e) => warn!(peer = %source, error = %e, "reply encode failed"),
                }
            }
        }
    }

    async fn sweep(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut tick = tokio::time::interval(Duration::from_millis(SWEEP_INTERVAL_MS));
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tick.tick() => self.expire_overdue(),
            }
        }
    }

    fn expire_overdue(&self) {
        let now = Instant::now();
        let expired: Vec<(u32, PendingReply)> = {
            let mut pending = self.pending_table();
            let overdue: Vec<u32> = pending
                .iter()
                .filter(|(_, p)| p.deadline <= now)
                .map(|(c, _)| *c)
                .collect();
            overdue
                .into_iter()
                .filter_map(|c| pending.remove(&c).map(|p| (c, p)))
                .collect()
        };
        for (correlation, entry) in expired {
            debug!(correlation, peer = %entry.destination, "request timed out");
            let _ = entry.sink.send(ReplyEvent::Timeout { correlation });
        }
    }

    fn drain_pending(&self) {
        let drained: Vec<(u32, PendingReply)> = self.pending_table().drain().collect();
        for (correlation, entry) in drained {
            let _ = entry.sink.send(ReplyEvent::Timeout { correlation });
        }
    }

    fn pending_table(&self) -> MutexGuard<'_, HashMap<u32, PendingReply>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
