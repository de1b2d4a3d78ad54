//! 160-bit identifiers naming both nodes and content items.
//!
//! A [`Key`] is an opaque 20-byte value. The overlay orders keys by XOR
//! distance; the routing table additionally uses the coarser bucket-distance
//! form `160 - leading_zeros(a XOR b)`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::KeyError;

/// Number of bytes in a key.
pub const KEY_BYTES: usize = 20;

/// Number of bits in a key.
pub const KEY_BITS: usize = 160;

/// A 160-bit identifier.
///
/// Ordering compares the raw bytes, which is the big-endian unsigned
/// interpretation. The text form is a 40-character uppercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key([u8; KEY_BYTES]);

impl Key {
    /// Construct a key from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Construct a key from the UTF-8 bytes of a string, zero-padded on the
    /// right to 20 bytes.
    ///
    /// Strings longer than 20 bytes are rejected.
    pub fn from_text(text: &str) -> Result<Self, KeyError> {
        let raw = text.as_bytes();
        if raw.len() > KEY_BYTES {
            return Err(KeyError::TooLong {
                len: raw.len(),
                max: KEY_BYTES,
            });
        }
        let mut bytes = [0u8; KEY_BYTES];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self(bytes))
    }

    /// Parse a key from its 40-character hex text form (either case).
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let raw = hex::decode(text).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        if raw.len() != KEY_BYTES {
            return Err(KeyError::InvalidHex(format!(
                "expected {} bytes, got {}",
                KEY_BYTES,
                raw.len()
            )));
        }
        let mut bytes = [0u8; KEY_BYTES];
        bytes.copy_from_slice(&raw);
        Ok(Self(bytes))
    }

    /// Generate a uniformly random key.
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_BYTES];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// The raw bytes of the key.
    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    /// XOR this key with another.
    pub fn xor(&self, other: &Key) -> Key {
        let mut out = [0u8; KEY_BYTES];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Key(out)
    }

    /// Count the leading zero bits of this key, `0..=160`.
    ///
    /// The all-zero key has 160 leading zeros.
    pub fn leading_zeros(&self) -> usize {
        for (i, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return i * 8 + byte.leading_zeros() as usize;
            }
        }
        KEY_BITS
    }

    /// Bucket distance to another key: `160 - leading_zeros(self XOR other)`.
    ///
    /// Equal keys are at distance 0; keys differing in the most significant
    /// bit are at distance 160.
    pub fn bucket_distance(&self, other: &Key) -> usize {
        KEY_BITS - self.xor(other).leading_zeros()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", hex::encode_upper(self.0))
    }
}

// Keys appear in snapshot and config files as their hex text form.
impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Key::from_hex(&text).map_err(serde::de::Error::custom)
    }
}
