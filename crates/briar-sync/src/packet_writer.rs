//! Writes framed packets against a connection's byte budget.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use briar_core::constants::{MAX_PAYLOAD_LENGTH, PACKET_HEADER_LENGTH, PROTOCOL_VERSION};
use briar_core::packet;
use briar_core::{FormatError, PacketPayload, PacketType};

use crate::error::{Result, SyncError};

/// Frames and writes packets, refusing any packet that would overrun the
/// connection's capacity.
///
/// Capacity is measured, not predicted: the `max_messages_for_*` helpers
/// size the next Ack, Offer or Request from the bytes actually written so
/// far.
pub struct PacketWriter<W> {
    output: W,
    capacity: u64,
    written: u64,
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    pub fn new(output: W, capacity: u64) -> Self {
        Self {
            output,
            capacity,
            written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn remaining(&self) -> u64 {
        self.capacity.saturating_sub(self.written)
    }

    /// Whether a packet with a payload of `payload_length` bytes fits.
    pub fn fits(&self, payload_length: usize) -> bool {
        payload_length <= MAX_PAYLOAD_LENGTH
            && (PACKET_HEADER_LENGTH + payload_length) as u64 <= self.remaining()
    }

    pub fn max_messages_for_ack(&self) -> usize {
        packet::max_messages_for_ack(self.remaining())
    }

    pub fn max_messages_for_offer(&self) -> usize {
        packet::max_messages_for_offer(self.remaining())
    }

    pub fn max_messages_for_request(&self) -> usize {
        packet::max_messages_for_request(self.remaining())
    }

    /// Writes any list-shaped packet.
    pub async fn write<P: PacketPayload>(&mut self, packet: &P) -> Result<()> {
        let payload = packet.encode_payload()?;
        self.write_frame(P::TYPE, &payload).await
    }

    /// Writes `packet` if it fits, returning whether it was written.
    pub async fn try_write<P: PacketPayload>(&mut self, packet: &P) -> Result<bool> {
        let payload = packet.encode_payload()?;
        if !self.fits(payload.len()) {
            return Ok(false);
        }
        self.write_frame(P::TYPE, &payload).await?;
        Ok(true)
    }

    /// Writes one serialized message.
    pub async fn write_message(&mut self, raw: &[u8]) -> Result<()> {
        self.write_frame(PacketType::Message, raw).await
    }

    async fn write_frame(&mut self, packet_type: PacketType, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(FormatError::TooLong {
                length: payload.len() as u64,
                max: MAX_PAYLOAD_LENGTH,
            }
            .into());
        }
        let length = PACKET_HEADER_LENGTH + payload.len();
        if length as u64 > self.remaining() {
            return Err(SyncError::CapacityExceeded {
                length,
                remaining: self.remaining(),
            });
        }

        let mut header = [PROTOCOL_VERSION, packet_type as u8, 0, 0];
        header[2..].copy_from_slice(&(payload.len() as u16).to_be_bytes());
        self.output.write_all(&header).await?;
        self.output.write_all(payload).await?;
        self.written += length as u64;
        trace!(?packet_type, length, "wrote packet");
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.output.flush().await?;
        Ok(())
    }

    /// Flushes and closes the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.output.shutdown().await?;
        Ok(())
    }

    pub(crate) fn get_mut(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}
