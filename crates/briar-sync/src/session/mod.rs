//! Sync sessions.
//!
//! A session owns one connected stream for one contact over one transport.
//! It registers the pair on start and ends through [`Lifecycle::dispose`],
//! which wipes the session secret, closes the stream and unregisters,
//! whatever the outcome.

pub mod duplex;
mod incoming;
mod output;
pub mod simplex;
pub mod state;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use briar_core::{ContactId, TransportId};

use crate::config::SyncConfig;
use crate::context::StreamContext;
use crate::error::{Result, SyncError};
use crate::queue::StoreQueue;
use crate::registry::ConnectionRegistry;
use crate::verification::VerificationPool;

pub use duplex::DuplexSession;
pub use simplex::{SimplexIncoming, SimplexOutgoing};
pub use state::{DuplexState, SessionEvent, WriteAction, WritePhase};

/// Everything a session shares with its siblings.
pub struct SyncServices<S: ?Sized> {
    pub queue: StoreQueue<S>,
    pub verification: VerificationPool,
    pub registry: Arc<dyn ConnectionRegistry>,
    pub config: SyncConfig,
}

impl<S: ?Sized> Clone for SyncServices<S> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            verification: self.verification.clone(),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

/// Result of a sync session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub contact: ContactId,
    pub transport: TransportId,
    pub packets_read: usize,
    pub packets_written: usize,
    /// Messages written to the peer.
    pub messages_sent: usize,
    /// Messages from the peer that were new to the store.
    pub messages_received: usize,
    /// Messages from the peer the store already held.
    pub duplicate_messages: usize,
    /// Messages from the peer that failed verification.
    pub invalid_messages: usize,
    /// Whether the session ended without error.
    pub success: bool,
    /// Error message if the session failed.
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub packets_read: AtomicUsize,
    pub packets_written: AtomicUsize,
    pub messages_sent: AtomicUsize,
    pub messages_received: AtomicUsize,
    pub duplicate_messages: AtomicUsize,
    pub invalid_messages: AtomicUsize,
}

impl Counters {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self, ctx: &StreamContext, result: Result<()>) -> SessionReport {
        let error = match result {
            Ok(()) => None,
            Err(e) => {
                warn!(contact = %ctx.contact, transport = %ctx.transport, error = %e, "session failed");
                Some(e.to_string())
            }
        };
        let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        SessionReport {
            contact: ctx.contact,
            transport: ctx.transport.clone(),
            packets_read: load(&self.packets_read),
            packets_written: load(&self.packets_written),
            messages_sent: load(&self.messages_sent),
            messages_received: load(&self.messages_received),
            duplicate_messages: load(&self.duplicate_messages),
            invalid_messages: load(&self.invalid_messages),
            success: error.is_none(),
            error,
        }
    }
}

/// The event channel of one duplex session.
///
/// The engine keeps a [`sender`](Self::sender) to deliver local changes; the
/// session's read loop holds another.
pub struct SessionEvents {
    sender: mpsc::UnboundedSender<SessionEvent>,
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.sender.clone()
    }

    pub(crate) fn split(
        self,
    ) -> (
        mpsc::UnboundedSender<SessionEvent>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        (self.sender, self.receiver)
    }
}

/// Registration and disposal of one session.
///
/// `dispose` is the only exit path. If a session future is dropped before
/// reaching it, `Drop` still wipes the secret and unregisters on the
/// current runtime.
pub(crate) struct Lifecycle {
    ctx: StreamContext,
    registry: Arc<dyn ConnectionRegistry>,
    registered: bool,
    disposed: bool,
}

impl Lifecycle {
    pub fn new(ctx: StreamContext, registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            ctx,
            registry,
            registered: false,
            disposed: false,
        }
    }

    /// Registers the connection, failing if the pair is already live.
    pub async fn register(&mut self) -> Result<()> {
        self.registered = self
            .registry
            .register_connection(self.ctx.contact, &self.ctx.transport)
            .await;
        if !self.registered {
            return Err(SyncError::DuplicateConnection {
                contact: self.ctx.contact,
                transport: self.ctx.transport.clone(),
            });
        }
        info!(contact = %self.ctx.contact, transport = %self.ctx.transport, "session started");
        Ok(())
    }

    pub async fn dispose(&mut self, stream: Option<&mut (dyn AsyncWrite + Unpin + Send)>) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.ctx.secret.wipe();
        if let Some(stream) = stream {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "stream already closed");
            }
        }
        if self.registered {
            self.registry
                .unregister_connection(self.ctx.contact, &self.ctx.transport)
                .await;
            self.registered = false;
        }
        info!(contact = %self.ctx.contact, transport = %self.ctx.transport, "session ended");
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        self.ctx.secret.wipe();
        if self.registered {
            let registry = Arc::clone(&self.registry);
            let contact = self.ctx.contact;
            let transport = self.ctx.transport.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    registry.unregister_connection(contact, &transport).await;
                });
            }
        }
    }
}
