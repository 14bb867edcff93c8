//! Outgoing packet generation shared by the duplex and simplex writers.

use tokio::io::AsyncWrite;
use tracing::debug;

use briar_core::{ContactId, PacketPayload};
use briar_store::SyncStore;

use super::{Counters, SyncServices};
use crate::error::Result;
use crate::packet_writer::PacketWriter;

pub(crate) struct Output<'a, S: ?Sized, W> {
    pub contact: ContactId,
    pub services: &'a SyncServices<S>,
    pub writer: &'a mut PacketWriter<W>,
    pub counters: &'a Counters,
    pub max_latency: u64,
}

impl<'a, S, W> Output<'a, S, W>
where
    S: SyncStore + ?Sized + 'static,
    W: AsyncWrite + Unpin,
{
    /// Writes `packet` if it fits. Anything generated but not written is
    /// produced again once its retransmission time comes.
    pub async fn put<P: PacketPayload + std::fmt::Debug>(&mut self, packet: &P) -> Result<bool> {
        if !self.writer.try_write(packet).await? {
            debug!(contact = %self.contact, packet_type = ?P::TYPE, "packet does not fit");
            return Ok(false);
        }
        Counters::bump(&self.counters.packets_written);
        debug!(contact = %self.contact, ?packet, "wrote packet");
        Ok(true)
    }

    /// Writes pending versioned acks and updates in priority order,
    /// stopping at the first that does not fit. Returns false if one
    /// did not.
    pub async fn write_updates(&mut self) -> Result<bool> {
        let c = self.contact;
        let latency = self.max_latency;
        let services = self.services;
        let queue = &services.queue;

        let acks = queue
            .call(move |s| async move { s.generate_transport_acks(c).await })
            .await?;
        for ack in acks.into_iter().flatten() {
            if !self.put(&ack).await? {
                return Ok(false);
            }
        }
        let updates = queue
            .call(move |s| async move { s.generate_transport_updates(c, latency).await })
            .await?;
        for update in updates.into_iter().flatten() {
            if !self.put(&update).await? {
                return Ok(false);
            }
        }

        if let Some(ack) = queue
            .call(move |s| async move { s.generate_subscription_ack(c).await })
            .await?
        {
            if !self.put(&ack).await? {
                return Ok(false);
            }
        }
        if let Some(update) = queue
            .call(move |s| async move { s.generate_subscription_update(c, latency).await })
            .await?
        {
            if !self.put(&update).await? {
                return Ok(false);
            }
        }
        if let Some(ack) = queue
            .call(move |s| async move { s.generate_retention_ack(c).await })
            .await?
        {
            if !self.put(&ack).await? {
                return Ok(false);
            }
        }
        if let Some(update) = queue
            .call(move |s| async move { s.generate_retention_update(c, latency).await })
            .await?
        {
            if !self.put(&update).await? {
                return Ok(false);
            }
        }
        self.writer.flush().await?;
        Ok(true)
    }

    /// Writes Acks until the store has nothing left to acknowledge or the
    /// next Ack would not fit.
    pub async fn write_acks(&mut self) -> Result<()> {
        let c = self.contact;
        let services = self.services;
        loop {
            let max = self.writer.max_messages_for_ack();
            if max == 0 {
                break;
            }
            let ack = services
                .queue
                .call(move |s| async move { s.generate_ack(c, max).await })
                .await?;
            match ack {
                Some(ack) => {
                    if !self.put(&ack).await? {
                        break;
                    }
                }
                None => break,
            }
        }
        self.writer.flush().await
    }

    /// Writes one serialized message if it fits.
    pub async fn put_message(&mut self, raw: &[u8]) -> Result<bool> {
        if !self.writer.fits(raw.len()) {
            return Ok(false);
        }
        self.writer.write_message(raw).await?;
        Counters::bump(&self.counters.packets_written);
        Counters::bump(&self.counters.messages_sent);
        Ok(true)
    }
}
