//! What a transport hands the engine along with a connected stream.

use std::fmt;
use std::sync::{Arc, Mutex};

use zeroize::Zeroize;

use briar_core::{ContactId, TransportId};

/// Length of the per-session secret in bytes.
pub const SECRET_LENGTH: usize = 32;

/// Ephemeral key material bound to one session.
///
/// The bytes are overwritten in place by [`wipe`](Self::wipe), which the
/// session's disposal path calls exactly when the session ends. Dropping
/// the secret wipes it as well.
pub struct SessionSecret {
    key: Mutex<[u8; SECRET_LENGTH]>,
}

impl SessionSecret {
    pub fn new(key: [u8; SECRET_LENGTH]) -> Self {
        Self {
            key: Mutex::new(key),
        }
    }

    /// Runs `f` over the secret bytes.
    pub fn with_key<T>(&self, f: impl FnOnce(&[u8; SECRET_LENGTH]) -> T) -> T {
        f(&self.key.lock().unwrap())
    }

    /// Overwrites every byte with zero. Idempotent.
    pub fn wipe(&self) {
        self.key.lock().unwrap().zeroize();
    }

    /// True once every byte is zero.
    pub fn is_wiped(&self) -> bool {
        self.key.lock().unwrap().iter().all(|b| *b == 0)
    }
}

impl Drop for SessionSecret {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}

/// The peer, transport and secret of one connection attempt.
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub contact: ContactId,
    pub transport: TransportId,
    pub secret: Arc<SessionSecret>,
}

impl StreamContext {
    pub fn new(contact: ContactId, transport: TransportId, secret: [u8; SECRET_LENGTH]) -> Self {
        Self {
            contact,
            transport,
            secret: Arc::new(SessionSecret::new(secret)),
        }
    }
}
