//! Error types for the sync module.

use briar_core::{ContactId, FormatError, RequestMismatch, TransportId};
use thiserror::Error;

/// Errors that end a sync session.
///
/// Every variant is fatal to the session that raised it. Verification
/// failures never appear here: a message that fails verification is dropped
/// and the session carries on.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed, oversized or non-canonical bytes from the peer.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// The stream failed or was closed under us.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer broke the Offer/Request exchange.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The store failed while producing an outgoing packet.
    #[error("store error: {0}")]
    Store(#[from] briar_store::StoreError),

    /// A packet would overrun the connection's capacity.
    #[error("packet of {length} bytes exceeds remaining capacity of {remaining}")]
    CapacityExceeded { length: usize, remaining: u64 },

    /// Another session already serves this contact over this transport.
    #[error("{contact} is already connected over {transport}")]
    DuplicateConnection {
        contact: ContactId,
        transport: TransportId,
    },

    /// The store queue worker has gone away.
    #[error("store queue closed")]
    QueueClosed,

    /// The session was shut down from outside.
    #[error("session cancelled")]
    Cancelled,
}

impl From<RequestMismatch> for SyncError {
    fn from(e: RequestMismatch) -> Self {
        SyncError::ProtocolViolation(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
