//! Golden wire vectors.
//!
//! Each vector is one complete frame, header included, as it appears on the
//! wire. Any implementation must produce these bytes for these packets and
//! decode them back to the same packets.

use briar_core::constants::{PACKET_HEADER_LENGTH, PROTOCOL_VERSION};
use briar_core::{
    Ack, MessageId, Packet, PacketPayload, PacketType, Request, RetentionAck, RetentionUpdate,
    SubscriptionAck, TransportAck,
};

use crate::fixtures::transport;

/// A golden wire vector.
#[derive(Debug, Clone)]
pub struct WireVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub packet: Packet,
    /// The framed bytes, hex encoded.
    pub frame_hex: &'static str,
}

impl WireVector {
    pub fn frame(&self) -> Vec<u8> {
        hex::decode(self.frame_hex).expect("vector hex is valid")
    }
}

/// Get all golden wire vectors.
pub fn all_vectors() -> Vec<WireVector> {
    vec![
        WireVector {
            name: "Request selecting items 0 and 2 of 3",
            packet: Packet::Request(Request::from_bits([true, false, true])),
            frame_hex: "000300070d02050a01a010",
        },
        WireVector {
            name: "RetentionAck version 1",
            packet: Packet::RetentionAck(RetentionAck { version: 1 }),
            frame_hex: "000400040d020110",
        },
        WireVector {
            name: "RetentionUpdate at time 0, version 2",
            packet: Packet::RetentionUpdate(RetentionUpdate {
                retention_time: 0,
                version: 2,
            }),
            frame_hex: "000500060d0200020210",
        },
        WireVector {
            // 300 needs the 16-bit integer tag
            name: "SubscriptionAck version 300",
            packet: Packet::SubscriptionAck(SubscriptionAck { version: 300 }),
            frame_hex: "000600050d03012c10",
        },
        WireVector {
            name: "TransportAck for tcp, version 1",
            packet: Packet::TransportAck(TransportAck {
                transport_id: transport("tcp"),
                version: 1,
            }),
            frame_hex: "000800090d0703746370020110",
        },
        WireVector {
            name: "Ack of one id",
            packet: Packet::Ack(Ack {
                message_ids: vec![MessageId::from_bytes([0x11; 32])],
            }),
            frame_hex: concat!(
                "00000026",
                "0d0d0a20",
                "1111111111111111111111111111111111111111111111111111111111111111",
                "1010"
            ),
        },
    ]
}

/// Frames a packet the way `PacketWriter` does.
pub fn encode_frame(packet: &Packet) -> briar_core::Result<Vec<u8>> {
    let payload = match packet {
        Packet::Ack(p) => p.encode_payload()?,
        Packet::Message(m) => m.raw.to_vec(),
        Packet::Offer(p) => p.encode_payload()?,
        Packet::Request(p) => p.encode_payload()?,
        Packet::RetentionAck(p) => p.encode_payload()?,
        Packet::RetentionUpdate(p) => p.encode_payload()?,
        Packet::SubscriptionAck(p) => p.encode_payload()?,
        Packet::SubscriptionUpdate(p) => p.encode_payload()?,
        Packet::TransportAck(p) => p.encode_payload()?,
        Packet::TransportUpdate(p) => p.encode_payload()?,
    };
    let mut frame = Vec::with_capacity(PACKET_HEADER_LENGTH + payload.len());
    frame.push(PROTOCOL_VERSION);
    frame.push(packet.packet_type() as u8);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes one frame, requiring it to be consumed exactly.
pub fn decode_frame(frame: &[u8]) -> briar_core::Result<Packet> {
    use briar_core::FormatError;

    if frame.len() < PACKET_HEADER_LENGTH {
        return Err(FormatError::UnexpectedEof);
    }
    if frame[0] != PROTOCOL_VERSION {
        return Err(FormatError::UnsupportedVersion(frame[0]));
    }
    let packet_type = PacketType::try_from(frame[1])?;
    let length = u16::from_be_bytes([frame[2], frame[3]]) as usize;
    let payload = &frame[PACKET_HEADER_LENGTH..];
    if payload.len() != length {
        return Err(FormatError::UnexpectedEof);
    }
    Packet::decode(packet_type, bytes::Bytes::copy_from_slice(payload))
}
