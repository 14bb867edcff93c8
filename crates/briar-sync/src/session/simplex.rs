//! Store-and-forward sessions over one-way transports.
//!
//! There is no back-channel, so no Offer/Request round trip: the outgoing
//! side writes whatever the store believes the peer lacks, and the incoming
//! side applies everything it reads. Redelivery across bursts is expected
//! and absorbed by the store.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info_span, Instrument};

use briar_core::constants::PACKET_HEADER_LENGTH;
use briar_store::SyncStore;

use super::incoming::{IncomingHandler, Routed};
use super::output::Output;
use super::{Counters, Lifecycle, SessionReport, SyncServices};
use crate::context::StreamContext;
use crate::error::{Result, SyncError};
use crate::packet_reader::PacketReader;
use crate::packet_writer::PacketWriter;

/// Writes one burst to a simplex sink.
pub struct SimplexOutgoing<S: ?Sized> {
    ctx: StreamContext,
    services: SyncServices<S>,
    max_latency: u64,
}

impl<S: SyncStore + ?Sized + 'static> SimplexOutgoing<S> {
    pub fn new(ctx: StreamContext, services: SyncServices<S>, max_latency: u64) -> Self {
        Self {
            ctx,
            services,
            max_latency,
        }
    }

    /// Fills at most `capacity` bytes of `writer`, then disposes.
    pub async fn run<W>(self, writer: W, capacity: u64) -> SessionReport
    where
        W: AsyncWrite + Unpin + Send,
    {
        let span = info_span!(
            "simplex_out",
            contact = %self.ctx.contact,
            transport = %self.ctx.transport
        );
        async move {
            let counters = Counters::default();
            let mut lifecycle =
                Lifecycle::new(self.ctx.clone(), Arc::clone(&self.services.registry));
            let mut writer = PacketWriter::new(writer, capacity);

            let result = match lifecycle.register().await {
                Ok(()) => self.write_all(&mut writer, &counters).await,
                Err(e) => Err(e),
            };

            let stream: &mut (dyn AsyncWrite + Unpin + Send) = writer.get_mut();
            lifecycle.dispose(Some(stream)).await;
            counters.report(&self.ctx, result)
        }
        .instrument(span)
        .await
    }

    async fn write_all<W>(&self, writer: &mut PacketWriter<W>, counters: &Counters) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut output = Output {
            contact: self.ctx.contact,
            services: &self.services,
            writer,
            counters,
            max_latency: self.max_latency,
        };
        if !output.write_updates().await? {
            return output.writer.flush().await;
        }
        output.write_acks().await?;

        let c = self.ctx.contact;
        let latency = self.max_latency;
        'batches: loop {
            let remaining = output.writer.remaining();
            if remaining <= PACKET_HEADER_LENGTH as u64 {
                break;
            }
            // The store counts frame headers, so whatever it marks sent fits.
            let max_length = remaining.min(self.services.config.max_batch_length as u64) as usize;
            let batch = self
                .services
                .queue
                .call(move |s| async move { s.generate_batch(c, max_length, latency).await })
                .await?;
            let Some(batch) = batch else {
                break;
            };
            for raw in &batch {
                if !output.put_message(raw).await? {
                    break 'batches;
                }
            }
            debug!(messages = batch.len(), "wrote batch");
        }
        output.writer.flush().await
    }
}

/// Reads one burst from a simplex source.
pub struct SimplexIncoming<S: ?Sized> {
    ctx: StreamContext,
    services: SyncServices<S>,
}

impl<S: SyncStore + ?Sized + 'static> SimplexIncoming<S> {
    pub fn new(ctx: StreamContext, services: SyncServices<S>) -> Self {
        Self { ctx, services }
    }

    /// Applies every packet up to end of stream, then disposes.
    pub async fn run<R>(self, reader: R) -> SessionReport
    where
        R: AsyncRead + Unpin + Send,
    {
        let span = info_span!(
            "simplex_in",
            contact = %self.ctx.contact,
            transport = %self.ctx.transport
        );
        async move {
            let counters = Arc::new(Counters::default());
            let mut lifecycle =
                Lifecycle::new(self.ctx.clone(), Arc::clone(&self.services.registry));

            let result = match lifecycle.register().await {
                Ok(()) => self.read_all(reader, &counters).await,
                Err(e) => Err(e),
            };

            lifecycle.dispose(None).await;
            counters.report(&self.ctx, result)
        }
        .instrument(span)
        .await
    }

    async fn read_all<R>(&self, reader: R, counters: &Arc<Counters>) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut reader = PacketReader::new(reader);
        let mut handler = IncomingHandler::new(
            self.ctx.contact,
            self.services.clone(),
            Arc::clone(counters),
            None,
        );
        while let Some(packet) = reader.read_packet().await? {
            match handler.route(packet)? {
                Routed::Handled => {}
                Routed::Offer(_) | Routed::Request(_) => {
                    return Err(SyncError::ProtocolViolation(
                        "offer or request over a simplex transport".into(),
                    ));
                }
            }
        }
        handler.drain().await
    }
}
