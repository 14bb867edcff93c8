//! Error types for the engine.

use briar_core::TransportId;
use briar_store::StoreError;
use briar_sync::SyncError;
use thiserror::Error;

use crate::config::TransportKind;

/// Errors that can occur while assembling or driving the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Malformed engine configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The transport is not in the registration list.
    #[error("unknown transport: {0}")]
    UnknownTransport(TransportId),

    /// A stream was handed to a session of the wrong direction.
    #[error("transport {transport} is {actual:?}, not {expected:?}")]
    WrongTransportKind {
        transport: TransportId,
        expected: TransportKind,
        actual: TransportKind,
    },

    /// The session task panicked or was aborted.
    #[error("session task failed: {0}")]
    SessionTask(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
