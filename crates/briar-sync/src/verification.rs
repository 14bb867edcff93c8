//! Bounded pool for CPU-bound message verification.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use briar_core::{Message, MessageVerifier, UnverifiedMessage};

/// Runs signature checks on the blocking thread pool, at most
/// `concurrency` at a time, so a slow check never stalls the store queue or
/// another session's read loop.
#[derive(Clone)]
pub struct VerificationPool {
    verifier: Arc<dyn MessageVerifier>,
    permits: Arc<Semaphore>,
}

impl VerificationPool {
    pub fn new(verifier: Arc<dyn MessageVerifier>, concurrency: usize) -> Self {
        Self {
            verifier,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Verifies `message`, returning `None` if it must be dropped.
    ///
    /// A failed check concerns this message only and is logged, not
    /// propagated.
    pub async fn verify(&self, message: UnverifiedMessage) -> Option<Message> {
        let _permit = self.permits.acquire().await.ok()?;
        let verifier = Arc::clone(&self.verifier);
        let id = message.id();
        match tokio::task::spawn_blocking(move || verifier.verify(message)).await {
            Ok(Ok(message)) => Some(message),
            Ok(Err(e)) => {
                warn!(message = %id, error = %e, "dropping message that failed verification");
                None
            }
            Err(e) => {
                warn!(message = %id, error = %e, "verification task failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use briar_core::{ClientId, Group, Keypair, MessageFactory, SignatureVerifier};
    use bytes::Bytes;

    fn signed() -> UnverifiedMessage {
        let group = Group::new(ClientId::from_bytes([1; 32]), Bytes::from_static(b"g"));
        let keypair = Keypair::from_seed(&[3; 32]);
        let m = MessageFactory
            .create_pseudonymous(None, &group, "carol", &keypair, 5, b"body")
            .unwrap();
        UnverifiedMessage::read(m.raw).unwrap()
    }

    #[tokio::test]
    async fn test_valid_message_passes() {
        let pool = VerificationPool::new(Arc::new(SignatureVerifier), 2);
        let u = signed();
        let id = u.id();
        assert_eq!(pool.verify(u).await.map(|m| m.id), Some(id));
    }

    #[tokio::test]
    async fn test_invalid_message_is_dropped() {
        let pool = VerificationPool::new(Arc::new(SignatureVerifier), 2);
        let mut u = signed();
        u.author = None;
        assert!(pool.verify(u).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_many_verifications_share_the_pool() {
        let pool = VerificationPool::new(Arc::new(SignatureVerifier), 1);
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let pool = pool.clone();
            tasks.spawn(async move { pool.verify(signed()).await.is_some() });
        }
        while let Some(ok) = tasks.join_next().await {
            assert!(ok.unwrap());
        }
    }
}
