//! Error types for the store module.

use briar_core::{ContactId, GroupId, TransportId};
use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Receiving code treats most of these as expected races (a contact removed
/// mid-session, a message for a group just left) and logs them; generating
/// code treats any of them as fatal to the session.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The contact is not (or no longer) known.
    #[error("unknown contact: {0}")]
    UnknownContact(ContactId),

    /// A message arrived for a group we are not subscribed to.
    #[error("unknown group: {0}")]
    UnknownGroup(GroupId),

    /// Transport properties for a transport that was never registered.
    #[error("unknown transport: {0}")]
    UnknownTransport(TransportId),

    /// The contact is already known.
    #[error("contact already exists: {0}")]
    DuplicateContact(ContactId),

    /// Invalid data handed to the store.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
