//! Integration test crate for the Tessera DHT.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise end-to-end overlay flows (bootstrap, placement,
//! retrieval, failure handling, persistence) across real UDP sockets on
//! the loopback interface.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p tessera-integration-tests
//! ```
