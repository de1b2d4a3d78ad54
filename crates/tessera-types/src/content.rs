//! Content items and lookup parameters.

use serde::{Deserialize, Serialize};

use crate::Key;

/// An opaque content item stored in the overlay.
///
/// The `(key, owner, kind)` triple uniquely identifies an item within one
/// node's store; the value is an uninterpreted byte sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// The content identifier, drawn from the same space as node ids.
    pub key: Key,
    /// Optional owner tag.
    pub owner: Option<String>,
    /// Optional type tag.
    pub kind: Option<String>,
    /// The content bytes.
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
}

impl Content {
    /// Create a content item with neither owner nor type tag.
    pub fn new(key: Key, value: Vec<u8>) -> Self {
        Self {
            key,
            owner: None,
            kind: None,
            value,
        }
    }

    /// The lookup parameter that selects exactly this item.
    pub fn parameter(&self) -> GetParameter {
        GetParameter {
            key: self.key,
            owner: self.owner.clone(),
            kind: self.kind.clone(),
        }
    }
}

/// Selection criteria for a content lookup.
///
/// The key is required; owner and kind, when present, narrow the match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetParameter {
    /// The content key to look up.
    pub key: Key,
    /// Match only content with this owner tag.
    pub owner: Option<String>,
    /// Match only content with this type tag.
    pub kind: Option<String>,
}

impl GetParameter {
    /// Select any content stored under `key`.
    pub fn new(key: Key) -> Self {
        Self {
            key,
            owner: None,
            kind: None,
        }
    }

    /// Whether `content` satisfies these criteria.
    pub fn matches(&self, content: &Content) -> bool {
        if self.key != content.key {
            return false;
        }
        if let Some(owner) = &self.owner {
            if content.owner.as_deref() != Some(owner.as_str()) {
                return false;
            }
        }
        if let Some(kind) = &self.kind {
            if content.kind.as_deref() != Some(kind.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Serde support for content values as hex strings in snapshot files.
mod hex_bytes {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        hex::decode(&text).map_err(serde::de::Error::custom)
    }
}
