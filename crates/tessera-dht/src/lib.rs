//! # tessera-dht
//!
//! Kademlia routing structures for the Tessera overlay.
//!
//! This crate implements:
//! - The 160-bucket XOR-metric routing table (K=5 contacts per bucket)
//! - Iterative lookup bookkeeping (status tracking, in-flight requests,
//!   alpha-bounded candidate selection)
//! - The local content store keyed by `(key, owner, type)` triples
//!
//! ## Key Parameters
//!
//! | Parameter | Value |
//! |---|---|
//! | K (bucket size, result-set size) | 5 |
//! | alpha (lookup parallelism) | 3 |
//! | Buckets | 160 |
//! | Operation timeout | 2 seconds |
//! | Refresh interval | 1 hour |

pub mod kademlia;
pub mod store;

/// Bucket capacity and the size of a lookup's final result set.
pub const K: usize = 5;

/// Lookup parallelism factor: maximum in-flight requests per lookup.
pub const ALPHA: usize = 3;

/// Number of buckets in the routing table (one per non-zero bucket
/// distance of the 160-bit key space).
pub const NUM_BUCKETS: usize = 160;

/// Time budget for one request/reply exchange and for lookup inactivity,
/// in milliseconds.
pub const OPERATION_TIMEOUT_MS: u64 = 2000;

/// Bucket refresh and content re-publication interval in seconds (1 hour).
pub const REFRESH_INTERVAL_SECS: u64 = 3600;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(K, 5);
        assert_eq!(ALPHA, 3);
        assert_eq!(NUM_BUCKETS, 160);
        assert_eq!(OPERATION_TIMEOUT_MS, 2000);
        assert_eq!(REFRESH_INTERVAL_SECS, 3600);
    }
}
