//! # tessera-node
//!
//! The Tessera DHT node: local operations (connect, put, get, refresh,
//! shutdown), the iterative lookup driver, inbound request handling, and
//! on-disk snapshots.

mod lookup;
pub mod node;
pub mod snapshot;

pub use node::Node;

/// Error types for node operations.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// A lookup saw no reply or timeout activity within the operation
    /// timeout, or a bootstrap peer never answered.
    #[error("lookup did not converge within the operation timeout")]
    RoutingTimeout,

    /// A content lookup converged without finding a matching item.
    #[error("no content found for the requested key")]
    ContentNotFound,

    /// Transport failure (socket I/O, undecodable outgoing message).
    #[error(transparent)]
    Transport(#[from] tessera_transport::TransportError),

    /// Snapshot file I/O failure.
    #[error("snapshot I/O error: {0}")]
    SnapshotIo(#[from] std::io::Error),

    /// Snapshot encoding or decoding failure.
    #[error("snapshot format error: {0}")]
    SnapshotFormat(#[from] serde_json::Error),
}

/// Result type alias for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            NodeError::ContentNotFound.to_string(),
            "no content found for the requested key"
        );
        assert!(NodeError::RoutingTimeout.to_string().contains("timeout"));
    }
}
