//! Binary datagram codec.
//!
//! ## Wire format
//!
//! ```text
//! datagram: [code u8][correlation u32 BE][body]
//! contact:  [id 20B][ipv4 4B][port u32 BE]      (28 bytes)
//! content:  [key 20B][owner u16-len UTF-8][type u16-len UTF-8]
//!           [value u32-len bytes]
//! params:   [key 20B][owner u16-len UTF-8][type u16-len UTF-8]
//! ```
//!
//! The port travels as a 4-byte field even though its range is u16.
//! Zero-length owner/type strings mean "unspecified". Datagrams above the
//! 64 KiB cap, with unknown codes, with truncated bodies, or with trailing
//! garbage are rejected.

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use tessera_types::{Contact, Content, GetParameter, Key, KEY_BYTES};

use crate::messages::{
    Message, MSG_CONNECT_REPLY, MSG_CONNECT_REQUEST, MSG_CONTENT_LOOKUP_REQUEST,
    MSG_CONTENT_REPLY, MSG_NODE_LOOKUP_REQUEST, MSG_NODE_REPLY, MSG_STORE_REQUEST,
};
use crate::{Result, TransportError};

/// Hard cap on datagram size.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Serialized size of a contact: 20-byte id, 4-byte IPv4, 4-byte port.
const CONTACT_WIRE_SIZE: usize = KEY_BYTES + 4 + 4;

/// Envelope size: code byte plus correlation id.
const HEADER_SIZE: usize = 1 + 4;

/// Serialize a message under the given correlation id.
pub fn encode(message: &Message, correlation: u32) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + CONTACT_WIRE_SIZE);
    buf.put_u8(message.code());
    buf.put_u32(correlation);

    match message {
        Message::ConnectRequest { origin } | Message::ConnectReply { origin } => {
            put_contact(&mut buf, origin);
        }
        Message::NodeLookupRequest { origin, target } => {
            put_contact(&mut buf, origin);
            buf.put_slice(target.as_bytes());
        }
        Message::NodeReply { origin, contacts } => {
            put_contact(&mut buf, origin);
            buf.put_u32(contacts.len() as u32);
            for contact in contacts {
                put_contact(&mut buf, contact);
            }
        }
        Message::StoreRequest { origin, content }
        | Message::ContentReply { origin, content } => {
            put_contact(&mut buf, origin);
            put_content(&mut buf, content)?;
        }
        Message::ContentLookupRequest { origin, params } => {
            put_contact(&mut buf, origin);
            buf.put_slice(params.key.as_bytes());
            put_string(&mut buf, params.owner.as_deref())?;
            put_string(&mut buf, params.kind.as_deref())?;
        }
    }

    if buf.len() > MAX_DATAGRAM_SIZE {
        return Err(TransportError::MessageTooLarge {
            size: buf.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(buf.freeze())
}

/// Deserialize a datagram into its correlation id and message.
pub fn decode(datagram: &[u8]) -> Result<(u32, Message)> {
    if datagram.len() > MAX_DATAGRAM_SIZE {
        return Err(TransportError::Decode(format!(
            "datagram of {} bytes exceeds the {} byte cap",
            datagram.len(),
            MAX_DATAGRAM_SIZE
        )));
    }
    let mut buf = datagram;
    if buf.remaining() < HEADER_SIZE {
        return Err(TransportError::Decode("truncated envelope".to_string()));
    }
    let code = buf.get_u8();
    let correlation = buf.get_u32();

    let message = match code {
        MSG_CONNECT_REQUEST => Message::ConnectRequest {
            origin: get_contact(&mut buf)?,
        },
        MSG_CONNECT_REPLY => Message::ConnectReply {
            origin: get_contact(&mut buf)?,
        },
        MSG_NODE_LOOKUP_REQUEST => Message::NodeLookupRequest {
            origin: get_contact(&mut buf)?,
            target: get_key(&mut buf)?,
        },
        MSG_NODE_REPLY => {
            let origin = get_contact(&mut buf)?;
            if buf.remaining() < 4 {
                return Err(TransportError::Decode("truncated contact count".to_string()));
            }
            let count = buf.get_u32() as usize;
            if count * CONTACT_WIRE_SIZE > buf.remaining() {
                return Err(TransportError::Decode(format!(
                    "contact count {count} exceeds body size"
                )));
            }
            let mut contacts = Vec::with_capacity(count);
            for _ in 0..count {
                contacts.push(get_contact(&mut buf)?);
            }
            Message::NodeReply { origin, contacts }
        }
        MSG_STORE_REQUEST => Message::StoreRequest {
            origin: get_contact(&mut buf)?,
            content: get_content(&mut buf)?,
        },
        MSG_CONTENT_LOOKUP_REQUEST => {
            let origin = get_contact(&mut buf)?;
            let key = get_key(&mut buf)?;
            let owner = get_string(&mut buf)?;
            let kind = get_string(&mut buf)?;
            Message::ContentLookupRequest {
                origin,
                params: GetParameter { key, owner, kind },
            }
        }
        MSG_CONTENT_REPLY => Message::ContentReply {
            origin: get_contact(&mut buf)?,
            content: get_content(&mut buf)?,
        },
        other => {
            return Err(TransportError::Decode(format!(
                "unknown message code {other:#04x}"
            )))
        }
    };

    if buf.has_remaining() {
        return Err(TransportError::Decode(format!(
            "{} trailing bytes after message body",
            buf.remaining()
        )));
    }
    Ok((correlation, message))
}

fn put_contact(buf: &mut BytesMut, contact: &Contact) {
    buf.put_slice(contact.id.as_bytes());
    buf.put_slice(&contact.ip.octets());
    buf.put_u32(u32::from(contact.port));
}

fn put_content(buf: &mut BytesMut, content: &Content) -> Result<()> {
    if content.value.len() > MAX_DATAGRAM_SIZE {
        return Err(TransportError::MessageTooLarge {
            size: content.value.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    buf.put_slice(content.key.as_bytes());
    put_string(buf, content.owner.as_deref())?;
    put_string(buf, content.kind.as_deref())?;
    buf.put_u32(content.value.len() as u32);
    buf.put_slice(&content.value);
    Ok(())
}

fn put_string(buf: &mut BytesMut, text: Option<&str>) -> Result<()> {
    let raw = text.map(str::as_bytes).unwrap_or_default();
    if raw.len() > usize::from(u16::MAX) {
        return Err(TransportError::MessageTooLarge {
            size: raw.len(),
            max: usize::from(u16::MAX),
        });
    }
    buf.put_u16(raw.len() as u16);
    buf.put_slice(raw);
    Ok(())
}

fn get_key(buf: &mut &[u8]) -> Result<Key> {
    if buf.remaining() < KEY_BYTES {
        return Err(TransportError::Decode("truncated key".to_string()));
    }
    let mut bytes = [0u8; KEY_BYTES];
    buf.copy_to_slice(&mut bytes);
    Ok(Key::from_bytes(bytes))
}

fn get_contact(buf: &mut &[u8]) -> Result<Contact> {
    let id = get_key(buf)?;
    if buf.remaining() < 8 {
        return Err(TransportError::Decode("truncated contact".to_string()));
    }
    let mut octets = [0u8; 4];
    buf.copy_to_slice(&mut octets);
    let port = buf.get_u32();
    let port = u16::try_from(port)
        .map_err(|_| TransportError::Decode(format!("port {port} out of range")))?;
    Ok(Contact::new(id, Ipv4Addr::from(octets), port))
}

fn get_string(buf: &mut &[u8]) -> Result<Option<String>> {
    if buf.remaining() < 2 {
        return Err(TransportError::Decode("truncated string length".to_string()));
    }
    let len = usize::from(buf.get_u16());
    if len == 0 {
        return Ok(None);
    }
    if buf.remaining() < len {
        return Err(TransportError::Decode("truncated string".to_string()));
    }
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    let text = String::from_utf8(raw)
        .map_err(|e| TransportError::Decode(format!("invalid UTF-8: {e}")))?;
    Ok(Some(text))
}

fn get_content(buf: &mut &[u8]) -> Result<Content> {
    let key = get_key(buf)?;
    let owner = get_string(buf)?;
    let kind = get_string(buf)?;
    if buf.remaining() < 4 {
        return Err(TransportError::Decode("truncated value length".to_string()));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(TransportError::Decode("truncated value".to_string()));
    }
    let mut value = vec![0u8; len];
    buf.copy_to_slice(&mut value);
    Ok(Content {
        key,
        owner,
        kind,
        value,
    })
}
