//! Session tuning.

use serde::{Deserialize, Serialize};

use briar_core::constants::MAX_PAYLOAD_LENGTH;

/// Configuration for sync sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Bytes of messages written per duplex batch round.
    pub max_batch_length: usize,
    /// Signature checks allowed to run at once.
    pub verification_concurrency: usize,
    /// Byte budget of a duplex connection.
    pub duplex_capacity: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_batch_length: MAX_PAYLOAD_LENGTH * 4,
            verification_concurrency: 4,
            duplex_capacity: u64::MAX,
        }
    }
}
