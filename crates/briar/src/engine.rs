//! The engine: assembles the shared services and starts sessions.
//!
//! Transports hand the engine a connected stream plus a [`StreamContext`];
//! the engine never initiates transport-level setup itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use briar_core::{ContactId, MessageVerifier, TransportId};
use briar_store::SyncStore;
use briar_sync::{
    ConnectionRegistry, DuplexSession, SessionEvent, SessionEvents, SessionReport,
    SimplexIncoming, SimplexOutgoing, StoreQueue, StreamContext, SyncConfig, SyncServices,
    VerificationPool,
};

use crate::config::{EngineConfig, TransportDescriptor, TransportKind};
use crate::error::{EngineError, Result};

/// A local change that live duplex sessions must react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalEvent {
    /// New local messages may be offerable.
    MessagesAdded,
    SubscriptionsChanged,
    TransportsChanged,
    /// Ends every session with this contact.
    ContactRemoved(ContactId),
}

impl From<LocalEvent> for SessionEvent {
    fn from(event: LocalEvent) -> Self {
        match event {
            LocalEvent::MessagesAdded => SessionEvent::MessagesAdded,
            LocalEvent::SubscriptionsChanged => SessionEvent::SubscriptionsChanged,
            LocalEvent::TransportsChanged => SessionEvent::TransportsChanged,
            LocalEvent::ContactRemoved(_) => SessionEvent::ContactRemoved,
        }
    }
}

/// Builds a [`SyncEngine`] from its collaborators and the static transport
/// registration list.
pub struct EngineBuilder {
    store: Arc<dyn SyncStore>,
    verifier: Arc<dyn MessageVerifier>,
    registry: Arc<dyn ConnectionRegistry>,
    config: SyncConfig,
    transports: Vec<TransportDescriptor>,
}

impl EngineBuilder {
    pub fn new<S, V, G>(store: Arc<S>, verifier: Arc<V>, registry: Arc<G>) -> Self
    where
        S: SyncStore + 'static,
        V: MessageVerifier + 'static,
        G: ConnectionRegistry + 'static,
    {
        Self {
            store,
            verifier,
            registry,
            config: SyncConfig::default(),
            transports: Vec::new(),
        }
    }

    /// Applies a loaded config: session tuning plus its transports.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config.sync;
        self.transports.extend(config.transports);
        self
    }

    pub fn sync_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a transport. A later entry with the same id replaces an
    /// earlier one.
    pub fn transport(mut self, descriptor: TransportDescriptor) -> Self {
        self.transports.push(descriptor);
        self
    }

    /// Spawns the store queue worker. Must be called inside a tokio runtime.
    pub fn build(self) -> SyncEngine {
        let (queue, worker) = StoreQueue::spawn(self.store);
        let verification =
            VerificationPool::new(self.verifier, self.config.verification_concurrency);
        let transports = self
            .transports
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        SyncEngine {
            services: SyncServices {
                queue,
                verification,
                registry: self.registry,
                config: self.config,
            },
            transports,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_session: AtomicU64::new(0),
            _worker: worker,
        }
    }
}

type SessionMap = HashMap<u64, (ContactId, UnboundedSender<SessionEvent>)>;

/// Removes a duplex session's entry when its task finishes or is aborted.
struct SessionEntry {
    sessions: Arc<Mutex<SessionMap>>,
    id: u64,
}

impl Drop for SessionEntry {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(&self.id);
        }
    }
}

/// The running engine.
pub struct SyncEngine {
    services: SyncServices<dyn SyncStore>,
    transports: HashMap<TransportId, TransportDescriptor>,
    /// Event senders of live duplex sessions.
    sessions: Arc<Mutex<SessionMap>>,
    next_session: AtomicU64,
    _worker: JoinHandle<()>,
}

impl SyncEngine {
    pub fn transports(&self) -> impl Iterator<Item = &TransportDescriptor> {
        self.transports.values()
    }

    /// Number of live duplex sessions.
    pub fn duplex_sessions(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn transport(&self, ctx: &StreamContext, expected: TransportKind) -> Result<u64> {
        let descriptor = self
            .transports
            .get(&ctx.transport)
            .ok_or_else(|| EngineError::UnknownTransport(ctx.transport.clone()))?;
        if descriptor.kind != expected {
            return Err(EngineError::WrongTransportKind {
                transport: ctx.transport.clone(),
                expected,
                actual: descriptor.kind,
            });
        }
        Ok(descriptor.max_latency_ms)
    }

    /// Starts a duplex session over a bidirectional stream.
    pub fn start_duplex<T>(&self, ctx: StreamContext, stream: T) -> Result<SessionHandle>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let max_latency = self.transport(&ctx, TransportKind::Duplex)?;
        let (reader, writer) = tokio::io::split(stream);

        let events = SessionEvents::new();
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .lock()
            .unwrap()
            .insert(id, (ctx.contact, events.sender()));

        let entry = SessionEntry {
            sessions: Arc::clone(&self.sessions),
            id,
        };
        let (contact, transport) = (ctx.contact, ctx.transport.clone());
        let session = DuplexSession::new(ctx, self.services.clone(), max_latency);
        let task = tokio::spawn(async move {
            let _entry = entry;
            session.run(reader, writer, events).await
        });
        info!(%contact, %transport, "duplex session spawned");
        Ok(SessionHandle {
            contact,
            transport,
            task,
        })
    }

    /// Starts writing one burst of at most `capacity` bytes to `sink`.
    pub fn start_simplex_outgoing<W>(
        &self,
        ctx: StreamContext,
        sink: W,
        capacity: u64,
    ) -> Result<SessionHandle>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let max_latency = self.transport(&ctx, TransportKind::Simplex)?;
        let (contact, transport) = (ctx.contact, ctx.transport.clone());
        let session = SimplexOutgoing::new(ctx, self.services.clone(), max_latency);
        let task = tokio::spawn(session.run(sink, capacity));
        Ok(SessionHandle {
            contact,
            transport,
            task,
        })
    }

    /// Starts applying one burst read from `source`.
    pub fn start_simplex_incoming<R>(&self, ctx: StreamContext, source: R) -> Result<SessionHandle>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        self.transport(&ctx, TransportKind::Simplex)?;
        let (contact, transport) = (ctx.contact, ctx.transport.clone());
        let session = SimplexIncoming::new(ctx, self.services.clone());
        let task = tokio::spawn(session.run(source));
        Ok(SessionHandle {
            contact,
            transport,
            task,
        })
    }

    /// Routes a local change to the live duplex sessions it concerns.
    pub fn notify(&self, event: LocalEvent) {
        let sessions = self.sessions.lock().unwrap();
        for (contact, sender) in sessions.values() {
            if let LocalEvent::ContactRemoved(removed) = event {
                if *contact != removed {
                    continue;
                }
            }
            if sender.send(event.into()).is_err() {
                debug!(%contact, "session already ended");
            }
        }
    }
}

/// A spawned session.
#[derive(Debug)]
pub struct SessionHandle {
    contact: ContactId,
    transport: TransportId,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    pub fn contact(&self) -> ContactId {
        self.contact
    }

    pub fn transport(&self) -> &TransportId {
        &self.transport
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the session. Its secret is wiped and its registration
    /// released when the task is dropped.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the session to end.
    pub async fn join(self) -> Result<SessionReport> {
        self.task
            .await
            .map_err(|e| EngineError::SessionTask(e.to_string()))
    }
}
