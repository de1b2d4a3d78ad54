//! # tessera-types
//!
//! Shared domain types for the Tessera DHT workspace: the 160-bit [`Key`]
//! identifier, peer [`Contact`]s, and [`Content`] items with their lookup
//! parameters.

pub mod contact;
pub mod content;
pub mod key;

pub use contact::Contact;
pub use content::{Content, GetParameter};
pub use key::{Key, KEY_BITS, KEY_BYTES};

/// Errors from key construction.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// A text key exceeded the 20-byte backing array.
    #[error("text key too long: {len} bytes exceeds maximum of {max}")]
    TooLong { len: usize, max: usize },

    /// A hex key failed to parse.
    #[error("invalid hex key: {0}")]
    InvalidHex(String),
}
