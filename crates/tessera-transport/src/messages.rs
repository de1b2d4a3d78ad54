//! Protocol message set.
//!
//! Seven verbs, each carrying the sender's contact so that every exchange
//! also teaches the receiver about a live peer. Codes form a fixed closed
//! set; anything else is rejected by the codec.

use tessera_types::{Contact, Content, GetParameter, Key};

/// Message code for a connect request (0x01).
pub const MSG_CONNECT_REQUEST: u8 = 0x01;
/// Message code for a connect reply (0x02).
pub const MSG_CONNECT_REPLY: u8 = 0x02;
/// Message code for a node lookup request (0x03).
pub const MSG_NODE_LOOKUP_REQUEST: u8 = 0x03;
/// Message code for a node reply (0x04).
pub const MSG_NODE_REPLY: u8 = 0x04;
/// Message code for a store request (0x05).
pub const MSG_STORE_REQUEST: u8 = 0x05;
/// Message code for a content lookup request (0x06).
pub const MSG_CONTENT_LOOKUP_REQUEST: u8 = 0x06;
/// Message code for a content reply (0x07).
pub const MSG_CONTENT_REPLY: u8 = 0x07;

/// A decoded protocol message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Liveness handshake; the receiver answers with its own contact.
    ConnectRequest { origin: Contact },
    /// Handshake answer.
    ConnectReply { origin: Contact },
    /// Ask for the contacts closest to `target`.
    NodeLookupRequest { origin: Contact, target: Key },
    /// The closest contacts the sender knows.
    NodeReply { origin: Contact, contacts: Vec<Contact> },
    /// Place a content item on the receiver. Not acknowledged.
    StoreRequest { origin: Contact, content: Content },
    /// Ask for content matching the parameter, or failing that the
    /// closest contacts to its key.
    ContentLookupRequest { origin: Contact, params: GetParameter },
    /// A matching content item.
    ContentReply { origin: Contact, content: Content },
}

impl Message {
    /// The wire code of this message.
    pub fn code(&self) -> u8 {
        match self {
            Message::ConnectRequest { .. } => MSG_CONNECT_REQUEST,
            Message::ConnectReply { .. } => MSG_CONNECT_REPLY,
            Message::NodeLookupRequest { .. } => MSG_NODE_LOOKUP_REQUEST,
            Message::NodeReply { .. } => MSG_NODE_REPLY,
            Message::StoreRequest { .. } => MSG_STORE_REQUEST,
            Message::ContentLookupRequest { .. } => MSG_CONTENT_LOOKUP_REQUEST,
            Message::ContentReply { .. } => MSG_CONTENT_REPLY,
        }
    }

    /// The sender's contact.
    pub fn origin(&self) -> &Contact {
        match self {
            Message::ConnectRequest { origin }
            | Message::ConnectReply { origin }
            | Message::NodeLookupRequest { origin, .. }
            | Message::NodeReply { origin, .. }
            | Message::StoreRequest { origin, .. }
            | Message::ContentLookupRequest { origin, .. }
            | Message::ContentReply { origin, .. } => origin,
        }
    }

    /// Whether this message answers an earlier request (and is therefore
    /// matched against the pending-reply table rather than a handler).
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            Message::ConnectReply { .. }
                | Message::NodeReply { .. }
                | Message::ContentReply { .. }
        )
    }
}
