//! Reads framed packets off a stream.
//!
//! A frame is a four-byte header `[version, type, length u16 BE]` followed by
//! `length` payload bytes.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use briar_core::constants::{MAX_PAYLOAD_LENGTH, PACKET_HEADER_LENGTH, PROTOCOL_VERSION};
use briar_core::{FormatError, Packet, PacketType};

use crate::error::{Result, SyncError};

/// Decodes one packet at a time from an async byte stream.
pub struct PacketReader<R> {
    input: R,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Reads the next packet, or `None` at a clean end of stream.
    ///
    /// End of stream inside a header or payload is a format error.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>> {
        let mut header = [0u8; PACKET_HEADER_LENGTH];
        let mut filled = 0;
        while filled < header.len() {
            let n = self.input.read(&mut header[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(FormatError::UnexpectedEof.into());
            }
            filled += n;
        }

        if header[0] != PROTOCOL_VERSION {
            return Err(FormatError::UnsupportedVersion(header[0]).into());
        }
        let packet_type = PacketType::try_from(header[1])?;
        let length = u16::from_be_bytes([header[2], header[3]]) as usize;
        if length > MAX_PAYLOAD_LENGTH {
            return Err(FormatError::TooLong {
                length: length as u64,
                max: MAX_PAYLOAD_LENGTH,
            }
            .into());
        }

        let mut payload = vec![0u8; length];
        self.input
            .read_exact(&mut payload)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => FormatError::UnexpectedEof.into(),
                _ => SyncError::Io(e),
            })?;

        trace!(?packet_type, length, "read packet");
        Ok(Some(Packet::decode(packet_type, Bytes::from(payload))?))
    }

    pub fn into_inner(self) -> R {
        self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use briar_core::{PacketPayload, SubscriptionAck};

    fn frame(packet_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![PROTOCOL_VERSION, packet_type];
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn test_reads_packets_until_eof() {
        let ack = SubscriptionAck { version: 5 };
        let mut bytes = frame(6, &ack.encode_payload().unwrap());
        bytes.extend(frame(6, &ack.encode_payload().unwrap()));
        let mut reader = PacketReader::new(&bytes[..]);

        for _ in 0..2 {
            assert_eq!(
                reader.read_packet().await.unwrap(),
                Some(Packet::SubscriptionAck(ack))
            );
        }
        assert_eq!(reader.read_packet().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_truncated_header_is_format_error() {
        let bytes = [PROTOCOL_VERSION, 6];
        let mut reader = PacketReader::new(&bytes[..]);
        assert!(matches!(
            reader.read_packet().await,
            Err(SyncError::Format(FormatError::UnexpectedEof))
        ));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_format_error() {
        let mut bytes = frame(6, &[0x0d, 0x02, 0x05, 0x10]);
        bytes.pop();
        let mut reader = PacketReader::new(&bytes[..]);
        assert!(matches!(
            reader.read_packet().await,
            Err(SyncError::Format(FormatError::UnexpectedEof))
        ));
    }

    #[tokio::test]
    async fn test_rejects_bad_header() {
        let bytes = frame(6, &[]);
        let mut wrong_version = bytes.clone();
        wrong_version[0] = 1;
        assert!(matches!(
            PacketReader::new(&wrong_version[..]).read_packet().await,
            Err(SyncError::Format(FormatError::UnsupportedVersion(1)))
        ));

        let unknown_type = frame(42, &[]);
        assert!(matches!(
            PacketReader::new(&unknown_type[..]).read_packet().await,
            Err(SyncError::Format(FormatError::UnknownPacketType(42)))
        ));

        let oversized = [PROTOCOL_VERSION, 6, 0xff, 0xff];
        assert!(matches!(
            PacketReader::new(&oversized[..]).read_packet().await,
            Err(SyncError::Format(FormatError::TooLong { .. }))
        ));
    }
}
