//! The live, bidirectional session.
//!
//! Two loops share one stream. The read loop hands store-bound packets to
//! the queue and messages to the verification pool; Offers and Requests go
//! to the write loop as [`SessionEvent`]s. The write loop drives
//! [`DuplexState`]. Whichever loop ends first ends the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info_span, warn, Instrument};

use briar_store::SyncStore;

use super::incoming::{IncomingHandler, Routed};
use super::output::Output;
use super::state::{DuplexState, SessionEvent, WriteAction, WritePhase};
use super::{Counters, Lifecycle, SessionEvents, SessionReport, SyncServices};
use crate::context::StreamContext;
use crate::error::{Result, SyncError};
use crate::packet_reader::PacketReader;
use crate::packet_writer::PacketWriter;

pub struct DuplexSession<S: ?Sized> {
    ctx: StreamContext,
    services: SyncServices<S>,
    max_latency: u64,
}

impl<S: SyncStore + ?Sized + 'static> DuplexSession<S> {
    pub fn new(ctx: StreamContext, services: SyncServices<S>, max_latency: u64) -> Self {
        Self {
            ctx,
            services,
            max_latency,
        }
    }

    /// Runs the session until the peer closes the stream, the contact is
    /// removed, or an error ends it. Always disposes before returning.
    pub async fn run<R, W>(self, reader: R, writer: W, events: SessionEvents) -> SessionReport
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let span = info_span!("duplex", contact = %self.ctx.contact, transport = %self.ctx.transport);
        self.run_inner(reader, writer, events).instrument(span).await
    }

    async fn run_inner<R, W>(self, reader: R, writer: W, events: SessionEvents) -> SessionReport
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let counters = Arc::new(Counters::default());
        let mut lifecycle = Lifecycle::new(self.ctx.clone(), Arc::clone(&self.services.registry));
        let mut writer = PacketWriter::new(writer, self.services.config.duplex_capacity);

        let result = match lifecycle.register().await {
            Ok(()) => self.sync(reader, &mut writer, events, &counters).await,
            Err(e) => Err(e),
        };

        let stream: &mut (dyn AsyncWrite + Unpin + Send) = writer.get_mut();
        lifecycle.dispose(Some(stream)).await;
        counters.report(&self.ctx, result)
    }

    async fn sync<R, W>(
        &self,
        reader: R,
        writer: &mut PacketWriter<W>,
        events: SessionEvents,
        counters: &Arc<Counters>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let (sender, receiver) = events.split();
        let peer_offer_pending = AtomicBool::new(false);

        let read = read_loop(
            PacketReader::new(reader),
            IncomingHandler::new(
                self.ctx.contact,
                self.services.clone(),
                Arc::clone(counters),
                Some(sender.clone()),
            ),
            sender,
            &peer_offer_pending,
        );
        let write = WriteSide {
            output: Output {
                contact: self.ctx.contact,
                services: &self.services,
                writer,
                counters,
                max_latency: self.max_latency,
            },
            state: DuplexState::new(),
            peer_offer_pending: &peer_offer_pending,
        }
        .run(receiver);

        tokio::select! {
            result = read => result,
            result = write => result,
        }
    }
}

async fn read_loop<R, S>(
    mut reader: PacketReader<R>,
    mut handler: IncomingHandler<S>,
    wake: UnboundedSender<SessionEvent>,
    peer_offer_pending: &AtomicBool,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    S: SyncStore + ?Sized + 'static,
{
    while let Some(packet) = reader.read_packet().await? {
        match handler.route(packet)? {
            Routed::Handled => {}
            Routed::Offer(offer) => {
                if peer_offer_pending.swap(true, Ordering::SeqCst) {
                    return Err(SyncError::ProtocolViolation(
                        "offer received before the previous one was answered".into(),
                    ));
                }
                let _ = wake.send(SessionEvent::OfferReceived(offer));
            }
            Routed::Request(request) => {
                let _ = wake.send(SessionEvent::RequestReceived(request));
            }
        }
    }
    debug!("peer closed the stream");
    handler.drain().await
}

struct WriteSide<'a, S: ?Sized, W> {
    output: Output<'a, S, W>,
    state: DuplexState,
    peer_offer_pending: &'a AtomicBool,
}

impl<'a, S, W> WriteSide<'a, S, W>
where
    S: SyncStore + ?Sized + 'static,
    W: AsyncWrite + Unpin + Send,
{
    async fn run(mut self, mut events: UnboundedReceiver<SessionEvent>) -> Result<()> {
        self.output.write_updates().await?;
        self.output.write_acks().await?;
        loop {
            if self.state.phase() == WritePhase::Closed {
                debug!("contact removed");
                return Ok(());
            }
            let event = if self.state.is_waiting() {
                match events.recv().await {
                    Some(event) => Some(event),
                    None => return Ok(()),
                }
            } else {
                events.try_recv().ok()
            };
            match event {
                Some(event) => {
                    if let Some(action) = self.state.handle(event)? {
                        self.perform(action).await?;
                    }
                }
                None => match self.state.phase() {
                    WritePhase::SendOffer => self.send_offer().await?,
                    WritePhase::SendBatches => self.send_batch().await?,
                    _ => {}
                },
            }
        }
    }

    async fn perform(&mut self, action: WriteAction) -> Result<()> {
        match action {
            WriteAction::SendAcks => self.output.write_acks().await,
            WriteAction::SendUpdates => self.output.write_updates().await.map(drop),
            WriteAction::AnswerOffer(offer) => self.answer_offer(offer).await,
            WriteAction::RecordRequest(selection) => {
                let c = self.output.contact;
                let recorded = self
                    .output
                    .services
                    .queue
                    .call(move |s| async move {
                        s.receive_request(c, &selection.requested, &selection.declined)
                            .await
                    })
                    .await;
                if let Err(e) = recorded {
                    warn!(error = %e, "failed to record request");
                }
                Ok(())
            }
            WriteAction::Close => Ok(()),
        }
    }

    async fn answer_offer(&mut self, offer: briar_core::Offer) -> Result<()> {
        let c = self.output.contact;
        let request = self
            .output
            .services
            .queue
            .call(move |s| async move { s.receive_offer(c, &offer).await })
            .await?;
        self.peer_offer_pending.store(false, Ordering::SeqCst);
        debug!(requested = request.requested_count(), "answering offer");
        self.output.writer.write(&request).await?;
        Counters::bump(&self.output.counters.packets_written);
        self.output.writer.flush().await
    }

    async fn send_offer(&mut self) -> Result<()> {
        let max = self.output.writer.max_messages_for_offer();
        let offer = if max == 0 {
            None
        } else {
            let c = self.output.contact;
            let latency = self.output.max_latency;
            self.output
                .services
                .queue
                .call(move |s| async move { s.generate_offer(c, max, latency).await })
                .await?
        };
        match offer {
            Some(offer) => {
                debug!(ids = offer.message_ids.len(), "offering");
                self.output.writer.write(&offer).await?;
                Counters::bump(&self.output.counters.packets_written);
                self.output.writer.flush().await?;
                self.state.offer_written(offer);
            }
            None => self.state.nothing_to_offer(),
        }
        Ok(())
    }

    async fn send_batch(&mut self) -> Result<()> {
        let c = self.output.contact;
        let requested = self.state.requested().to_vec();
        let max_length = self
            .output
            .writer
            .remaining()
            .min(self.output.services.config.max_batch_length as u64) as usize;
        let batch = self
            .output
            .services
            .queue
            .call(move |s| async move { s.generate_requested_batch(c, &requested, max_length).await })
            .await?;

        for raw in &batch.messages {
            if !self.output.put_message(raw).await? {
                // Out of capacity: whatever was not written is offered again.
                self.output.writer.flush().await?;
                self.state.batch_written(0, false);
                return Ok(());
            }
        }
        if !batch.is_empty() {
            debug!(messages = batch.messages.len(), "sent batch");
            self.output.writer.flush().await?;
        }
        self.state.batch_written(batch.consumed, !batch.is_empty());
        Ok(())
    }
}
