//! Peer endpoint identity.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};

use crate::Key;

/// A peer in the overlay: an identifier paired with a reachable IPv4/UDP
/// endpoint.
///
/// Contacts are cheap values and are copied freely between the routing
/// table, lookups, and the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    /// The peer's 160-bit identifier.
    pub id: Key,
    /// The peer's IPv4 address.
    pub ip: Ipv4Addr,
    /// The peer's UDP port.
    pub port: u16,
}

impl Contact {
    /// Create a new contact.
    pub fn new(id: Key, ip: Ipv4Addr, port: u16) -> Self {
        Self { id, ip, port }
    }

    /// The contact's socket address.
    pub fn address(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.ip, self.port)
    }
}
