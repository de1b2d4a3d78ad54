//! # tessera-transport
//!
//! UDP datagram transport for the Tessera overlay.
//!
//! This crate provides:
//!
//! - **Message set** for the seven protocol verbs via [`messages`]
//! - **Wire codec** (fixed binary layout, correlation-id envelope) via
//!   [`wire`]
//! - **Request/reply endpoint** multiplexing outstanding requests by
//!   correlation id via [`udp`]
//!
//! ## Architecture
//!
//! ```text
//! Node operations
//!     |
//!     v
//! Message (messages.rs)    -- typed protocol verbs
//!     |
//!     v
//! Envelope (wire.rs)       -- [code u8][correlation u32 BE][body]
//!     |
//!     v
//! UdpEndpoint (udp.rs)     -- socket pump, pending-reply table, handler
//!                             dispatch, deadline sweep
//! ```

pub mod messages;
pub mod udp;
pub mod wire;

/// Error types for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A datagram could not be decoded (unknown code, truncated body,
    /// malformed field, oversize).
    #[error("decode error: {0}")]
    Decode(String),

    /// An outgoing message would not fit in a datagram.
    #[error("message too large: {size} bytes exceeds maximum of {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Socket-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::Decode("truncated body".to_string());
        assert_eq!(err.to_string(), "decode error: truncated body");

        let err = TransportError::MessageTooLarge {
            size: 70_000,
            max: 65_536,
        };
        assert!(err.to_string().contains("70000"));
    }
}
