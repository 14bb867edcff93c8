//! Routing of incoming packets, shared by the duplex read loop and the
//! simplex incoming session.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use briar_core::{ContactId, Offer, Packet, Request, UnverifiedMessage};
use briar_store::{ReceiveResult, SyncStore};

use super::{Counters, SessionEvent, SyncServices};
use crate::error::Result;

/// Where a packet went.
#[derive(Debug)]
pub(crate) enum Routed {
    /// Queued for the store or for verification.
    Handled,
    /// Write-side traffic; never reaches the store.
    Offer(Offer),
    Request(Request),
}

/// Which write-loop wakeups a stored packet triggers.
#[derive(Debug, Clone, Copy)]
enum Wake {
    Nothing,
    /// Remote subscriptions or retention changed: ack them, and messages
    /// may have become sendable.
    Subscriptions,
    Transports,
}

impl Wake {
    fn send(self, events: &UnboundedSender<SessionEvent>) {
        let _ = match self {
            Wake::Nothing => Ok(()),
            Wake::Subscriptions => events
                .send(SessionEvent::SubscriptionsChanged)
                .and_then(|_| events.send(SessionEvent::MessagesAdded)),
            Wake::Transports => events.send(SessionEvent::TransportsChanged),
        };
    }
}

pub(crate) struct IncomingHandler<S: ?Sized> {
    contact: ContactId,
    services: SyncServices<S>,
    counters: Arc<Counters>,
    /// Wakes the duplex write loop; absent for simplex.
    events: Option<UnboundedSender<SessionEvent>>,
    verifications: JoinSet<()>,
}

impl<S: SyncStore + ?Sized + 'static> IncomingHandler<S> {
    pub fn new(
        contact: ContactId,
        services: SyncServices<S>,
        counters: Arc<Counters>,
        events: Option<UnboundedSender<SessionEvent>>,
    ) -> Self {
        Self {
            contact,
            services,
            counters,
            events,
            verifications: JoinSet::new(),
        }
    }

    /// Sends `packet` on its way without waiting for the store.
    pub fn route(&mut self, packet: Packet) -> Result<Routed> {
        self.reap();
        Counters::bump(&self.counters.packets_read);
        debug!(contact = %self.contact, packet_type = ?packet.packet_type(), "received packet");
        let c = self.contact;
        match packet {
            Packet::Ack(ack) => self.apply("ack", Wake::Nothing, move |s| async move {
                s.receive_ack(c, &ack).await
            })?,
            Packet::Message(message) => self.verify_and_store(message),
            Packet::Offer(offer) => return Ok(Routed::Offer(offer)),
            Packet::Request(request) => return Ok(Routed::Request(request)),
            Packet::RetentionAck(ack) => {
                self.apply("retention ack", Wake::Nothing, move |s| async move {
                    s.receive_retention_ack(c, &ack).await
                })?
            }
            Packet::RetentionUpdate(update) => {
                self.apply("retention update", Wake::Subscriptions, move |s| async move {
                    s.receive_retention_update(c, &update).await
                })?
            }
            Packet::SubscriptionAck(ack) => {
                self.apply("subscription ack", Wake::Nothing, move |s| async move {
                    s.receive_subscription_ack(c, &ack).await
                })?
            }
            Packet::SubscriptionUpdate(update) => {
                self.apply("subscription update", Wake::Subscriptions, move |s| async move {
                    s.receive_subscription_update(c, &update).await
                })?
            }
            Packet::TransportAck(ack) => {
                self.apply("transport ack", Wake::Nothing, move |s| async move {
                    s.receive_transport_ack(c, &ack).await
                })?
            }
            Packet::TransportUpdate(update) => {
                self.apply("transport update", Wake::Transports, move |s| async move {
                    s.receive_transport_update(c, &update).await
                })?
            }
        }
        Ok(Routed::Handled)
    }

    /// Waits for every pending verification and for the store to apply
    /// everything routed so far.
    pub async fn drain(&mut self) -> Result<()> {
        while let Some(joined) = self.verifications.join_next().await {
            if let Err(e) = joined {
                warn!(contact = %self.contact, error = %e, "verification task failed");
            }
        }
        self.services.queue.barrier().await
    }

    fn reap(&mut self) {
        while let Some(joined) = self.verifications.try_join_next() {
            if let Err(e) = joined {
                warn!(contact = %self.contact, error = %e, "verification task failed");
            }
        }
    }

    /// Queues a store call. Store errors here are expected races and are
    /// logged, not fatal.
    fn apply<F, Fut>(&self, what: &'static str, wake: Wake, task: F) -> Result<()>
    where
        F: FnOnce(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = briar_store::Result<()>> + Send + 'static,
    {
        let contact = self.contact;
        let events = self.events.clone();
        self.services.queue.submit(move |store| async move {
            match task(store).await {
                Ok(()) => {
                    if let Some(events) = events {
                        wake.send(&events);
                    }
                }
                Err(e) => warn!(%contact, error = %e, "failed to apply {}", what),
            }
        })
    }

    fn verify_and_store(&mut self, message: UnverifiedMessage) {
        let contact = self.contact;
        let pool = self.services.verification.clone();
        let queue = self.services.queue.clone();
        let counters = Arc::clone(&self.counters);
        let events = self.events.clone();
        self.verifications.spawn(async move {
            let Some(message) = pool.verify(message).await else {
                Counters::bump(&counters.invalid_messages);
                return;
            };
            let id = message.id;
            let stored = queue
                .call(move |s| async move { s.receive_message(contact, &message).await })
                .await;
            match stored {
                Ok(ReceiveResult::Stored) => Counters::bump(&counters.messages_received),
                Ok(ReceiveResult::Duplicate) => Counters::bump(&counters.duplicate_messages),
                Err(e) => {
                    warn!(%contact, message = %id, error = %e, "failed to store message");
                    return;
                }
            }
            if let Some(events) = events {
                let _ = events.send(SessionEvent::BatchReceived);
            }
        });
    }
}
