//! Local content storage.
//!
//! Each node keeps the content items placed on it by the overlay, keyed by
//! the `(key, owner, type)` triple. Lookups match on the key plus whichever
//! of owner/type the caller specified.

use std::collections::HashMap;

use tessera_types::{Content, GetParameter, Key};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct StoreKey {
    key: Key,
    owner: Option<String>,
    kind: Option<String>,
}

impl StoreKey {
    fn of(content: &Content) -> Self {
        Self {
            key: content.key,
            owner: content.owner.clone(),
            kind: content.kind.clone(),
        }
    }
}

/// The node-local `(key, owner, type) -> value` map.
#[derive(Default)]
pub struct ContentStore {
    entries: HashMap<StoreKey, Content>,
}

impl ContentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a content item, overwriting any entry with the same triple.
    pub fn put(&mut self, content: Content) {
        self.entries.insert(StoreKey::of(&content), content);
    }

    /// Whether any stored item satisfies the parameter.
    pub fn contains(&self, param: &GetParameter) -> bool {
        self.entries.values().any(|c| param.matches(c))
    }

    /// The first stored item satisfying the parameter.
    pub fn get(&self, param: &GetParameter) -> Option<&Content> {
        self.entries.values().find(|c| param.matches(c))
    }

    /// The parameter triples of every stored item, for refresh.
    pub fn keys(&self) -> Vec<GetParameter> {
        self.entries.values().map(Content::parameter).collect()
    }

    /// Every stored item.
    pub fn all(&self) -> Vec<Content> {
        self.entries.values().cloned().collect()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
