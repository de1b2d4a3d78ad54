//! Kademlia routing table and iterative lookup bookkeeping.
//!
//! The routing table keeps 160 buckets indexed by `bucket_distance - 1`
//! between the local id and the remote id, so bucket 0 holds the closest
//! possible remotes (ids differing only in the last bit) and bucket 159
//! holds ids differing in the most significant bit. Each bucket stores up
//! to K contacts ordered by last-seen time.
//!
//! ## Eviction
//!
//! A full bucket rejects newcomers in favor of the contacts it already
//! holds (Kademlia's preference for long-lived nodes, without the
//! ping-the-oldest probe). Contacts leave the table only when a lookup
//! times out on them.

use std::collections::{HashMap, VecDeque};

use tessera_types::{Contact, Key, KEY_BITS};

use crate::{ALPHA, K, NUM_BUCKETS};

/// A single bucket holding up to [`K`] contacts at one prefix distance.
///
/// The front of the deque holds the least-recently-seen contact; the back
/// holds the most-recently-seen.
#[derive(Clone, Debug, Default)]
struct Bucket {
    entries: VecDeque<Contact>,
}

impl Bucket {
    fn find_index(&self, id: &Key) -> Option<usize> {
        self.entries.iter().position(|c| c.id == *id)
    }

    /// Move an existing entry to the most-recently-seen position, adopting
    /// the endpoint from the fresh sighting.
    fn touch(&mut self, index: usize, contact: Contact) {
        let _ = self.entries.remove(index);
        self.entries.push_back(contact);
    }

    fn insert(&mut self, contact: Contact) {
        self.entries.push_back(contact);
    }

    fn remove(&mut self, index: usize) -> Option<Contact> {
        self.entries.remove(index)
    }

    fn is_full(&self) -> bool {
        self.entries.len() >= K
    }

    fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.entries.iter()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Result of attempting to insert a contact into the routing table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertResult {
    /// The contact was newly inserted into a bucket.
    Inserted,
    /// The contact was already present; its liveness position was updated.
    Updated,
    /// The contact is the local node and was ignored.
    Ignored,
    /// The target bucket is full; the contact was rejected.
    Full,
}

/// The Kademlia routing table.
///
/// Holds the local node's identifier (the owning node keeps the full local
/// contact) and 160 capacity-bounded buckets of remote contacts.
pub struct RoutingTable {
    local_id: Key,
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    /// Create an empty routing table for the given local id.
    pub fn new(local_id: Key) -> Self {
        Self {
            local_id,
            buckets: vec![Bucket::default(); NUM_BUCKETS],
        }
    }

    /// The local node's id.
    pub fn local_id(&self) -> &Key {
        &self.local_id
    }

    /// Bucket index for a remote id: `bucket_distance - 1`.
    ///
    /// Returns `None` for the local id itself (distance 0).
    fn bucket_index(&self, id: &Key) -> Option<usize> {
        match self.local_id.bucket_distance(id) {
            0 => None,
            distance => Some(distance - 1),
        }
    }

    /// Insert a contact.
    ///
    /// Re-inserting a known id is a liveness touch: the contact moves to
    /// the most-recently-seen position of its bucket. A full bucket rejects
    /// the newcomer.
    pub fn insert(&mut self, contact: Contact) -> InsertResult {
        let Some(index) = self.bucket_index(&contact.id) else {
            return InsertResult::Ignored;
        };
        let bucket = &mut self.buckets[index];

        if let Some(position) = bucket.find_index(&contact.id) {
            bucket.touch(position, contact);
            return InsertResult::Updated;
        }
        if bucket.is_full() {
            return InsertResult::Full;
        }
        bucket.insert(contact);
        InsertResult::Inserted
    }

    /// Remove a contact by id.
    pub fn remove(&mut self, id: &Key) -> Option<Contact> {
        let index = self.bucket_index(id)?;
        let bucket = &mut self.buckets[index];
        let position = bucket.find_index(id)?;
        bucket.remove(position)
    }

    /// Whether the table holds a contact with this id.
    pub fn contains(&self, id: &Key) -> bool {
        self.bucket_index(id)
            .is_some_and(|index| self.buckets[index].find_index(id).is_some())
    }

    /// Every contact in the table.
    pub fn all_nodes(&self) -> Vec<Contact> {
        self.buckets
            .iter()
            .flat_map(|b| b.contacts().cloned())
            .collect()
    }

    /// Total number of contacts in the table.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-empty buckets as `(depth, contacts)` pairs, for snapshots.
    pub fn bucket_contents(&self) -> Vec<(usize, Vec<Contact>)> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.len() > 0)
            .map(|(depth, b)| (depth, b.contacts().cloned().collect()))
            .collect()
    }

    /// Find up to `num` contacts closest to `target`, sorted by ascending
    /// XOR distance.
    ///
    /// Seeds from the bucket the target would live in, then walks outward
    /// symmetrically until enough contacts are collected, and re-sorts the
    /// result by the raw XOR metric (finer than bucket granularity).
    pub fn find_closest(&self, target: &Key, num: usize) -> Vec<Contact> {
        let seed = self.bucket_index(target).unwrap_or(0);
        let mut collected: Vec<Contact> = self.buckets[seed].contacts().cloned().collect();

        let mut below = seed.checked_sub(1);
        let mut above = seed + 1;
        while collected.len() < num && (below.is_some() || above < NUM_BUCKETS) {
            if let Some(index) = below {
                collected.extend(self.buckets[index].contacts().cloned());
                below = index.checked_sub(1);
            }
            if collected.len() >= num {
                break;
            }
            if above < NUM_BUCKETS {
                collected.extend(self.buckets[above].contacts().cloned());
                above += 1;
            }
        }

        collected.sort_by(|a, b| a.id.xor(target).cmp(&b.id.xor(target)));
        collected.truncate(num);
        collected
    }

    /// One identifier per bucket distance `1..=159`, each landing in the
    /// bucket it names, for periodic bucket refresh lookups.
    pub fn refresh_ids(&self) -> Vec<Key> {
        (1..NUM_BUCKETS)
            .map(|distance| self.random_id_at_distance(distance))
            .collect()
    }

    /// A random id at exactly the given bucket distance from the local id:
    /// the leading `160 - distance` bits match the local id, the next bit
    /// differs, and the remaining bits are random.
    fn random_id_at_distance(&self, distance: usize) -> Key {
        let split = KEY_BITS - distance;
        let byte_index = split / 8;
        let bit_index = split % 8;
        let local = self.local_id.as_bytes();

        let mut bytes = *Key::random().as_bytes();
        bytes[..byte_index].copy_from_slice(&local[..byte_index]);

        let keep: u8 = if bit_index == 0 {
            0x00
        } else {
            0xFF << (8 - bit_index)
        };
        let flip: u8 = 0x80 >> bit_index;
        bytes[byte_index] =
            (local[byte_index] & keep) | (!local[byte_index] & flip) | (bytes[byte_index] & !(keep | flip));

        Key::from_bytes(bytes)
    }
}

/// Per-contact progress within one iterative lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupStatus {
    /// Known but not yet queried.
    Unasked,
    /// A request is in flight.
    Awaiting,
    /// Responded.
    Asked,
    /// Timed out or unreachable.
    Failed,
}

#[derive(Clone, Debug)]
struct LookupEntry {
    contact: Contact,
    status: LookupStatus,
}

/// Bookkeeping for one iterative lookup.
///
/// Tracks every contact ever seen during the lookup (sorted by XOR
/// distance to the target), each contact's status, and the correlation ids
/// of requests currently in flight. The async driver owns the I/O; this
/// type owns the convergence rules.
pub struct LookupState {
    target: Key,
    entries: Vec<LookupEntry>,
    in_flight: HashMap<u32, Key>,
}

impl LookupState {
    /// Start a lookup for `target`.
    ///
    /// The local contact starts as already-asked (it may appear in the
    /// final result set); `seeds` — normally the whole routing table —
    /// start unasked.
    pub fn new(target: Key, local: Contact, seeds: Vec<Contact>) -> Self {
        let mut state = Self {
            target,
            entries: vec![LookupEntry {
                contact: local,
                status: LookupStatus::Asked,
            }],
            in_flight: HashMap::new(),
        };
        state.add_candidates(&seeds);
        state
    }

    /// The lookup target.
    pub fn target(&self) -> &Key {
        &self.target
    }

    /// Merge newly learned contacts as unasked candidates, keeping the
    /// entry list sorted by distance to the target.
    pub fn add_candidates(&mut self, contacts: &[Contact]) {
        let mut added = false;
        for contact in contacts {
            if self.entries.iter().any(|e| e.contact.id == contact.id) {
                continue;
            }
            self.entries.push(LookupEntry {
                contact: contact.clone(),
                status: LookupStatus::Unasked,
            });
            added = true;
        }
        if added {
            let target = self.target;
            self.entries
                .sort_by(|a, b| a.contact.id.xor(&target).cmp(&b.contact.id.xor(&target)));
        }
    }

    /// Select the next contacts to query and mark them awaiting.
    ///
    /// Candidates are the unasked contacts among the K closest non-failed
    /// entries; at most `ALPHA - in_flight` are returned, closest first.
    pub fn next_batch(&mut self) -> Vec<Contact> {
        let slots = ALPHA.saturating_sub(self.in_flight.len());
        if slots == 0 {
            return Vec::new();
        }
        let mut batch = Vec::new();
        let mut live = 0usize;
        for entry in &mut self.entries {
            if live >= K || batch.len() >= slots {
                break;
            }
            if entry.status == LookupStatus::Failed {
                continue;
            }
            live += 1;
            if entry.status == LookupStatus::Unasked {
                entry.status = LookupStatus::Awaiting;
                batch.push(entry.contact.clone());
            }
        }
        batch
    }

    /// Record that a request to `id` went out under `correlation`.
    pub fn sent(&mut self, correlation: u32, id: Key) {
        self.in_flight.insert(correlation, id);
    }

    /// Resolve an in-flight correlation id to the contact it was sent to.
    pub fn take_in_flight(&mut self, correlation: u32) -> Option<Key> {
        self.in_flight.remove(&correlation)
    }

    /// Whether any request is in flight.
    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Mark a contact as having responded.
    pub fn mark_asked(&mut self, id: &Key) {
        self.set_status(id, LookupStatus::Asked);
    }

    /// Mark a contact as failed; it no longer counts toward the K closest.
    pub fn mark_failed(&mut self, id: &Key) {
        self.set_status(id, LookupStatus::Failed);
    }

    fn set_status(&mut self, id: &Key, status: LookupStatus) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.contact.id == *id) {
            entry.status = status;
        }
    }

    /// The lookup has converged: nothing is in flight and none of the K
    /// closest non-failed contacts remains unasked.
    pub fn is_finished(&self) -> bool {
        if !self.in_flight.is_empty() {
            return false;
        }
        !self
            .entries
            .iter()
            .filter(|e| e.status != LookupStatus::Failed)
            .take(K)
            .any(|e| e.status == LookupStatus::Unasked)
    }

    /// The `num` closest contacts that responded, closest first.
    pub fn closest_asked(&self, num: usize) -> Vec<Contact> {
        self.entries
            .iter()
            .filter(|e| e.status == LookupStatus::Asked)
            .take(num)
            .map(|e| e.contact.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn key_with_first_byte(byte: u8) -> Key {
        let mut bytes = [0u8; 20];
        bytes[0] = byte;
        Key::from_bytes(bytes)
    }

    fn key_with_last_byte(byte: u8) -> Key {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Key::from_bytes(bytes)
    }

    fn contact(id: Key) -> Contact {
        Contact::new(id, Ipv4Addr::LOCALHOST, 7529)
    }

    #[test]
    fn test_insert_and_update() {
        let mut table = RoutingTable::new(Key::from_bytes([0u8; 20]));
        let peer = contact(key_with_last_byte(0x01));

        assert_eq!(table.insert(peer.clone()), InsertResult::Inserted);
        assert_eq!(table.len(), 1);

        // Re-inserting the same id is a liveness touch, not a duplicate.
        assert_eq!(table.insert(peer), InsertResult::Updated);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_self_ignored() {
        let local = Key::from_bytes([0x42u8; 20]);
        let mut table = RoutingTable::new(local);
        assert_eq!(table.insert(contact(local)), InsertResult::Ignored);
        assert!(table.is_empty());
    }

    #[test]
    fn test_bucket_placement_invariant() {
        let local = Key::from_bytes([0u8; 20]);
        let mut table = RoutingTable::new(local);
        for byte in 1..=10u8 {
            table.insert(contact(key_with_last_byte(byte)));
        }
        for (depth, contacts) in table.bucket_contents() {
            for peer in contacts {
                assert_eq!(local.bucket_distance(&peer.id) - 1, depth);
            }
        }
    }

    #[test]
    fn test_remove_uses_insert_bucket() {
        let mut table = RoutingTable::new(Key::from_bytes([0u8; 20]));
        let peer = contact(key_with_first_byte(0x80));
        table.insert(peer.clone());
        assert!(table.contains(&peer.id));

        let removed = table.remove(&peer.id);
        assert_eq!(removed, Some(peer));
        assert!(table.is_empty());

        assert!(table.remove(&key_with_first_byte(0x40)).is_none());
    }

    #[test]
    fn test_full_bucket_rejects_newcomer() {
        let mut table = RoutingTable::new(Key::from_bytes([0u8; 20]));
        // All these ids share the top bit, so they land in the same bucket.
        for byte in 0..K as u8 {
            let mut bytes = [0u8; 20];
            bytes[0] = 0x80;
            bytes[19] = byte;
            assert_eq!(
                table.insert(contact(Key::from_bytes(bytes))),
                InsertResult::Inserted
            );
        }
        let mut overflow = [0u8; 20];
        overflow[0] = 0x80;
        overflow[19] = K as u8;
        assert_eq!(
            table.insert(contact(Key::from_bytes(overflow))),
            InsertResult::Full
        );
        assert_eq!(table.len(), K);
    }

    #[test]
    fn test_find_closest_sorted_no_duplicates() {
        let mut table = RoutingTable::new(Key::from_bytes([0u8; 20]));
        for byte in 1..=10u8 {
            table.insert(contact(key_with_first_byte(byte)));
        }

        let target = key_with_first_byte(0x05);
        let closest = table.find_closest(&target, 5);
        assert_eq!(closest.len(), 5);
        for pair in closest.windows(2) {
            assert!(pair[0].id.xor(&target) <= pair[1].id.xor(&target));
        }
        for (i, a) in closest.iter().enumerate() {
            assert!(!closest[i + 1..].iter().any(|b| b.id == a.id));
        }
        // The target's exact id is present and must come first.
        assert_eq!(closest[0].id, target);
    }

    #[test]
    fn test_find_closest_caps_at_table_size() {
        let mut table = RoutingTable::new(Key::from_bytes([0u8; 20]));
        table.insert(contact(key_with_first_byte(0x01)));
        table.insert(contact(key_with_first_byte(0x02)));
        assert_eq!(table.find_closest(&Key::random(), 10).len(), 2);
    }

    #[test]
    fn test_find_closest_on_local_target() {
        let mut table = RoutingTable::new(Key::from_bytes([0u8; 20]));
        table.insert(contact(key_with_last_byte(0x01)));
        // Looking up the local id seeds from the closest bucket.
        let closest = table.find_closest(&Key::from_bytes([0u8; 20]), 5);
        assert_eq!(closest.len(), 1);
    }

    #[test]
    fn test_refresh_ids_land_in_their_buckets() {
        let table = RoutingTable::new(Key::random());
        let ids = table.refresh_ids();
        assert_eq!(ids.len(), NUM_BUCKETS - 1);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(table.local_id().bucket_distance(id), i + 1);
        }
    }

    #[test]
    fn test_lookup_initial_batch_is_alpha() {
        let target = Key::from_bytes([0xFFu8; 20]);
        let local = contact(Key::from_bytes([0u8; 20]));
        let seeds: Vec<Contact> = (1..=5u8).map(|b| contact(key_with_first_byte(b))).collect();

        let mut state = LookupState::new(target, local, seeds);
        assert!(!state.is_finished());

        let batch = state.next_batch();
        assert_eq!(batch.len(), ALPHA);

        // Nothing more until capacity frees up.
        for (i, peer) in batch.iter().enumerate() {
            state.sent(i as u32, peer.id);
        }
        assert!(state.next_batch().is_empty());
    }

    #[test]
    fn test_lookup_reply_flow() {
        let target = Key::from_bytes([0xFFu8; 20]);
        let local = contact(Key::from_bytes([0u8; 20]));
        let seed = contact(key_with_first_byte(0x01));
        let mut state = LookupState::new(target, local, vec![seed.clone()]);

        let batch = state.next_batch();
        assert_eq!(batch.len(), 1);
        state.sent(7, seed.id);
        assert!(!state.is_finished());

        // The reply names a closer contact, which becomes a candidate.
        let closer = contact(key_with_first_byte(0xF0));
        assert_eq!(state.take_in_flight(7), Some(seed.id));
        state.mark_asked(&seed.id);
        state.add_candidates(std::slice::from_ref(&closer));
        assert!(!state.is_finished());

        let batch = state.next_batch();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, closer.id);
        state.sent(8, closer.id);
        assert_eq!(state.take_in_flight(8), Some(closer.id));
        state.mark_asked(&closer.id);

        assert!(state.is_finished());
        let result = state.closest_asked(K);
        // Closest-first: the 0xF0 contact is nearest the 0xFF target.
        assert_eq!(result[0].id, closer.id);
        assert!(result.iter().any(|c| c.id == seed.id));
    }

    #[test]
    fn test_lookup_failed_contact_excluded() {
        let target = Key::from_bytes([0xFFu8; 20]);
        let local = contact(Key::from_bytes([0u8; 20]));
        let seed = contact(key_with_first_byte(0x01));
        let mut state = LookupState::new(target, local, vec![seed.clone()]);

        let batch = state.next_batch();
        assert_eq!(batch.len(), 1);
        state.sent(3, seed.id);

        assert_eq!(state.take_in_flight(3), Some(seed.id));
        state.mark_failed(&seed.id);

        assert!(state.is_finished());
        assert!(!state.closest_asked(K).iter().any(|c| c.id == seed.id));
    }

    #[test]
    fn test_lookup_converges_without_responses() {
        let target = Key::from_bytes([0x42u8; 20]);
        let local = contact(Key::from_bytes([0u8; 20]));
        let seeds: Vec<Contact> = (1..=3u8).map(|b| contact(key_with_first_byte(b))).collect();
        let mut state = LookupState::new(target, local.clone(), seeds);

        let mut correlation = 0u32;
        loop {
            let batch = state.next_batch();
            if batch.is_empty() && !state.has_in_flight() {
                break;
            }
            for peer in batch {
                state.sent(correlation, peer.id);
                let id = state.take_in_flight(correlation).expect("in flight");
                state.mark_asked(&id);
                correlation += 1;
            }
        }

        assert!(state.is_finished());
        let result = state.closest_asked(K);
        assert_eq!(result.len(), 4); // 3 seeds + the local contact
        assert!(result.iter().any(|c| c.id == local.id));
    }

    #[test]
    fn test_lookup_kth_distance_monotone() {
        // The distance of the K-th closest asked contact never increases
        // as the lookup learns more.
        let target = Key::from_bytes([0xFFu8; 20]);
        let local = contact(Key::from_bytes([0u8; 20]));
        let seeds: Vec<Contact> = (1..=8u8).map(|b| contact(key_with_first_byte(b))).collect();
        let mut state = LookupState::new(target, local, seeds);

        let mut last_kth: Option<Key> = None;
        let mut correlation = 0u32;
        for round in 0..4u8 {
            for peer in state.next_batch() {
                state.sent(correlation, peer.id);
                let id = state.take_in_flight(correlation).expect("in flight");
                state.mark_asked(&id);
                correlation += 1;
            }
            // Each round surfaces a closer contact.
            state.add_candidates(&[contact(key_with_first_byte(0xF0 + round))]);

            let asked = state.closest_asked(K);
            if asked.len() == K {
                let kth = asked[K - 1].id.xor(&target);
                if let Some(previous) = last_kth {
                    assert!(kth <= previous);
                }
                last_kth = Some(kth);
            }
        }
    }
}
