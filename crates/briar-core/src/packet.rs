//! The closed set of sync packets and their payload layouts.
//!
//! Every payload except a message's is a list of fields; a payload must be
//! consumed exactly, and all size limits are decode failures.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use bytes::Bytes;

use crate::codec::{length_prefix_length, Reader, Writer};
use crate::constants::{
    MAX_PACKET_LENGTH, MAX_PAYLOAD_LENGTH, MAX_PROPERTIES_PER_TRANSPORT, MAX_PROPERTY_LENGTH,
    MAX_SUBSCRIPTIONS, MAX_TRANSPORT_ID_LENGTH, PACKET_HEADER_LENGTH, UNIQUE_ID_LENGTH,
};
use crate::error::{FormatError, Result};
use crate::message::{Group, UnverifiedMessage};
use crate::types::{MessageId, TransportId};

/// Packet type byte, the second byte of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Ack = 0,
    Message = 1,
    Offer = 2,
    Request = 3,
    RetentionAck = 4,
    RetentionUpdate = 5,
    SubscriptionAck = 6,
    SubscriptionUpdate = 7,
    TransportAck = 8,
    TransportUpdate = 9,
}

impl TryFrom<u8> for PacketType {
    type Error = FormatError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => PacketType::Ack,
            1 => PacketType::Message,
            2 => PacketType::Offer,
            3 => PacketType::Request,
            4 => PacketType::RetentionAck,
            5 => PacketType::RetentionUpdate,
            6 => PacketType::SubscriptionAck,
            7 => PacketType::SubscriptionUpdate,
            8 => PacketType::TransportAck,
            9 => PacketType::TransportUpdate,
            other => return Err(FormatError::UnknownPacketType(other)),
        })
    }
}

/// A packet whose payload is laid out as a list of fields.
pub trait PacketPayload: Sized {
    const TYPE: PacketType;

    fn write_payload<W: Write>(&self, w: &mut Writer<W>) -> Result<()>;

    fn read_payload<R: Read>(r: &mut Reader<R>) -> Result<Self>;

    fn encode_payload(&self) -> Result<Vec<u8>> {
        let mut w = Writer::new(Vec::new());
        self.write_payload(&mut w)?;
        w.close()
    }

    fn decode_payload(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let packet = Self::read_payload(&mut r)?;
        if !r.eof()? {
            return Err(FormatError::TrailingData);
        }
        Ok(packet)
    }
}

/// Transport properties, kept sorted so encoding is deterministic.
pub type TransportProperties = BTreeMap<String, String>;

/// Message ids the sender has stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub message_ids: Vec<MessageId>,
}

/// Message ids the sender could send. A manifest, not a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub message_ids: Vec<MessageId>,
}

/// A bitmap over the most recent Offer: bit i selects the i-th offered id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    bitmap: Bytes,
    length: usize,
}

/// An Offer's ids, split by whether the peer asked for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub requested: Vec<MessageId>,
    pub declined: Vec<MessageId>,
}

/// A Request whose bitmap does not cover the Offer it answers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("request covers {request} ids but the offer had {offer}")]
pub struct RequestMismatch {
    pub request: usize,
    pub offer: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionAck {
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionUpdate {
    /// Oldest message timestamp the sender still wants, in milliseconds.
    pub retention_time: u64,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionAck {
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub groups: Vec<Group>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportAck {
    pub transport_id: TransportId,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportUpdate {
    pub transport_id: TransportId,
    pub properties: TransportProperties,
    pub version: u64,
}

/// Any decoded packet. Callers match on it exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Ack(Ack),
    Message(UnverifiedMessage),
    Offer(Offer),
    Request(Request),
    RetentionAck(RetentionAck),
    RetentionUpdate(RetentionUpdate),
    SubscriptionAck(SubscriptionAck),
    SubscriptionUpdate(SubscriptionUpdate),
    TransportAck(TransportAck),
    TransportUpdate(TransportUpdate),
}

impl Packet {
    /// Decodes a payload of the given type.
    pub fn decode(packet_type: PacketType, payload: Bytes) -> Result<Self> {
        Ok(match packet_type {
            PacketType::Ack => Packet::Ack(Ack::decode_payload(&payload)?),
            PacketType::Message => Packet::Message(UnverifiedMessage::read(payload)?),
            PacketType::Offer => Packet::Offer(Offer::decode_payload(&payload)?),
            PacketType::Request => Packet::Request(Request::decode_payload(&payload)?),
            PacketType::RetentionAck => {
                Packet::RetentionAck(RetentionAck::decode_payload(&payload)?)
            }
            PacketType::RetentionUpdate => {
                Packet::RetentionUpdate(RetentionUpdate::decode_payload(&payload)?)
            }
            PacketType::SubscriptionAck => {
                Packet::SubscriptionAck(SubscriptionAck::decode_payload(&payload)?)
            }
            PacketType::SubscriptionUpdate => {
                Packet::SubscriptionUpdate(SubscriptionUpdate::decode_payload(&payload)?)
            }
            PacketType::TransportAck => {
                Packet::TransportAck(TransportAck::decode_payload(&payload)?)
            }
            PacketType::TransportUpdate => {
                Packet::TransportUpdate(TransportUpdate::decode_payload(&payload)?)
            }
        })
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Ack(_) => PacketType::Ack,
            Packet::Message(_) => PacketType::Message,
            Packet::Offer(_) => PacketType::Offer,
            Packet::Request(_) => PacketType::Request,
            Packet::RetentionAck(_) => PacketType::RetentionAck,
            Packet::RetentionUpdate(_) => PacketType::RetentionUpdate,
            Packet::SubscriptionAck(_) => PacketType::SubscriptionAck,
            Packet::SubscriptionUpdate(_) => PacketType::SubscriptionUpdate,
            Packet::TransportAck(_) => PacketType::TransportAck,
            Packet::TransportUpdate(_) => PacketType::TransportUpdate,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ack and Offer
// ─────────────────────────────────────────────────────────────────────────────

fn write_ids<W: Write>(w: &mut Writer<W>, ids: &[MessageId], what: &str) -> Result<()> {
    if ids.is_empty() {
        return Err(FormatError::InvalidField(format!("empty {}", what)));
    }
    w.write_list_start()?;
    w.write_list_start()?;
    for id in ids {
        w.write_bytes(id.as_bytes())?;
    }
    w.write_list_end()?;
    w.write_list_end()
}

fn read_ids<R: Read>(r: &mut Reader<R>, what: &str) -> Result<Vec<MessageId>> {
    r.read_list_start()?;
    r.read_list_start()?;
    let mut ids = Vec::new();
    while !r.has_list_end()? {
        ids.push(MessageId(r.read_unique_id()?));
    }
    r.read_list_end()?;
    if ids.is_empty() {
        return Err(FormatError::InvalidField(format!("empty {}", what)));
    }
    r.read_list_end()?;
    Ok(ids)
}

impl PacketPayload for Ack {
    const TYPE: PacketType = PacketType::Ack;

    fn write_payload<W: Write>(&self, w: &mut Writer<W>) -> Result<()> {
        write_ids(w, &self.message_ids, "ack")
    }

    fn read_payload<R: Read>(r: &mut Reader<R>) -> Result<Self> {
        Ok(Self {
            message_ids: read_ids(r, "ack")?,
        })
    }
}

impl PacketPayload for Offer {
    const TYPE: PacketType = PacketType::Offer;

    fn write_payload<W: Write>(&self, w: &mut Writer<W>) -> Result<()> {
        write_ids(w, &self.message_ids, "offer")
    }

    fn read_payload<R: Read>(r: &mut Reader<R>) -> Result<Self> {
        Ok(Self {
            message_ids: read_ids(r, "offer")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

impl Request {
    /// Builds a request from one flag per offered id, in offer order.
    pub fn from_bits(bits: impl IntoIterator<Item = bool>) -> Self {
        let mut bitmap = Vec::new();
        let mut length = 0;
        for bit in bits {
            if length % 8 == 0 {
                bitmap.push(0u8);
            }
            if bit {
                if let Some(byte) = bitmap.last_mut() {
                    *byte |= 0x80 >> (length % 8);
                }
            }
            length += 1;
        }
        Self {
            bitmap: Bytes::from(bitmap),
            length,
        }
    }

    /// Number of offered ids this request covers.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether the i-th offered id is requested. Bits are MSB-first.
    pub fn is_requested(&self, index: usize) -> bool {
        index < self.length && self.bitmap[index / 8] & (0x80 >> (index % 8)) != 0
    }

    pub fn requested_count(&self) -> usize {
        self.bitmap.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Splits `offer` by this request's bits.
    pub fn select(&self, offer: &Offer) -> std::result::Result<Selection, RequestMismatch> {
        if self.length != offer.message_ids.len() {
            return Err(RequestMismatch {
                request: self.length,
                offer: offer.message_ids.len(),
            });
        }
        let mut selection = Selection::default();
        for (i, id) in offer.message_ids.iter().enumerate() {
            if self.is_requested(i) {
                selection.requested.push(*id);
            } else {
                selection.declined.push(*id);
            }
        }
        Ok(selection)
    }
}

impl PacketPayload for Request {
    const TYPE: PacketType = PacketType::Request;

    fn write_payload<W: Write>(&self, w: &mut Writer<W>) -> Result<()> {
        if self.length == 0 {
            return Err(FormatError::InvalidField("empty request".into()));
        }
        let padding = self.bitmap.len() * 8 - self.length;
        w.write_list_start()?;
        w.write_integer(padding as i64)?;
        w.write_bytes(&self.bitmap)?;
        w.write_list_end()
    }

    fn read_payload<R: Read>(r: &mut Reader<R>) -> Result<Self> {
        r.read_list_start()?;
        let padding = r.read_integer()?;
        if !(0..8).contains(&padding) {
            return Err(FormatError::InvalidField(format!("padding {}", padding)));
        }
        let bitmap = r.read_bytes(MAX_PAYLOAD_LENGTH)?;
        r.read_list_end()?;

        let last = *bitmap
            .last()
            .ok_or_else(|| FormatError::InvalidField("empty request".into()))?;
        let padding = padding as usize;
        if last & ((1u8 << padding) - 1) != 0 {
            return Err(FormatError::NonCanonical("request padding bits set"));
        }
        let length = bitmap.len() * 8 - padding;
        Ok(Self {
            bitmap: Bytes::from(bitmap),
            length,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Versioned updates and their acks
// ─────────────────────────────────────────────────────────────────────────────

fn write_version<W: Write>(w: &mut Writer<W>, version: u64) -> Result<()> {
    let version = i64::try_from(version)
        .map_err(|_| FormatError::InvalidField(format!("version {}", version)))?;
    w.write_integer(version)
}

fn read_version<R: Read>(r: &mut Reader<R>) -> Result<u64> {
    let version = r.read_integer()?;
    u64::try_from(version).map_err(|_| FormatError::InvalidField(format!("version {}", version)))
}

fn read_transport_id<R: Read>(r: &mut Reader<R>) -> Result<TransportId> {
    let id = r.read_string(MAX_TRANSPORT_ID_LENGTH)?;
    TransportId::new(id).map_err(|e| FormatError::InvalidField(e.to_string()))
}

impl PacketPayload for RetentionAck {
    const TYPE: PacketType = PacketType::RetentionAck;

    fn write_payload<W: Write>(&self, w: &mut Writer<W>) -> Result<()> {
        w.write_list_start()?;
        write_version(w, self.version)?;
        w.write_list_end()
    }

    fn read_payload<R: Read>(r: &mut Reader<R>) -> Result<Self> {
        r.read_list_start()?;
        let version = read_version(r)?;
        r.read_list_end()?;
        Ok(Self { version })
    }
}

impl PacketPayload for RetentionUpdate {
    const TYPE: PacketType = PacketType::RetentionUpdate;

    fn write_payload<W: Write>(&self, w: &mut Writer<W>) -> Result<()> {
        w.write_list_start()?;
        write_version(w, self.retention_time)?;
        write_version(w, self.version)?;
        w.write_list_end()
    }

    fn read_payload<R: Read>(r: &mut Reader<R>) -> Result<Self> {
        r.read_list_start()?;
        let retention_time = read_version(r)?;
        let version = read_version(r)?;
        r.read_list_end()?;
        Ok(Self {
            retention_time,
            version,
        })
    }
}

impl PacketPayload for SubscriptionAck {
    const TYPE: PacketType = PacketType::SubscriptionAck;

    fn write_payload<W: Write>(&self, w: &mut Writer<W>) -> Result<()> {
        w.write_list_start()?;
        write_version(w, self.version)?;
        w.write_list_end()
    }

    fn read_payload<R: Read>(r: &mut Reader<R>) -> Result<Self> {
        r.read_list_start()?;
        let version = read_version(r)?;
        r.read_list_end()?;
        Ok(Self { version })
    }
}

impl PacketPayload for SubscriptionUpdate {
    const TYPE: PacketType = PacketType::SubscriptionUpdate;

    fn write_payload<W: Write>(&self, w: &mut Writer<W>) -> Result<()> {
        if self.groups.len() > MAX_SUBSCRIPTIONS {
            return Err(FormatError::TooLong {
                length: self.groups.len() as u64,
                max: MAX_SUBSCRIPTIONS,
            });
        }
        w.write_list_start()?;
        w.write_list_start()?;
        for group in &self.groups {
            group.write(w)?;
        }
        w.write_list_end()?;
        write_version(w, self.version)?;
        w.write_list_end()
    }

    fn read_payload<R: Read>(r: &mut Reader<R>) -> Result<Self> {
        r.read_list_start()?;
        r.read_list_start()?;
        let mut groups = Vec::new();
        while !r.has_list_end()? {
            if groups.len() == MAX_SUBSCRIPTIONS {
                return Err(FormatError::TooLong {
                    length: groups.len() as u64 + 1,
                    max: MAX_SUBSCRIPTIONS,
                });
            }
            groups.push(Group::read(r)?);
        }
        r.read_list_end()?;
        let version = read_version(r)?;
        r.read_list_end()?;
        Ok(Self { groups, version })
    }
}

impl PacketPayload for TransportAck {
    const TYPE: PacketType = PacketType::TransportAck;

    fn write_payload<W: Write>(&self, w: &mut Writer<W>) -> Result<()> {
        w.write_list_start()?;
        w.write_string(self.transport_id.as_str())?;
        write_version(w, self.version)?;
        w.write_list_end()
    }

    fn read_payload<R: Read>(r: &mut Reader<R>) -> Result<Self> {
        r.read_list_start()?;
        let transport_id = read_transport_id(r)?;
        let version = read_version(r)?;
        r.read_list_end()?;
        Ok(Self {
            transport_id,
            version,
        })
    }
}

impl PacketPayload for TransportUpdate {
    const TYPE: PacketType = PacketType::TransportUpdate;

    fn write_payload<W: Write>(&self, w: &mut Writer<W>) -> Result<()> {
        if self.properties.len() > MAX_PROPERTIES_PER_TRANSPORT {
            return Err(FormatError::TooLong {
                length: self.properties.len() as u64,
                max: MAX_PROPERTIES_PER_TRANSPORT,
            });
        }
        w.write_list_start()?;
        w.write_string(self.transport_id.as_str())?;
        w.write_map_start()?;
        for (key, value) in &self.properties {
            w.write_string(key)?;
            w.write_string(value)?;
        }
        w.write_map_end()?;
        write_version(w, self.version)?;
        w.write_list_end()
    }

    fn read_payload<R: Read>(r: &mut Reader<R>) -> Result<Self> {
        r.read_list_start()?;
        let transport_id = read_transport_id(r)?;
        let mut properties = TransportProperties::new();
        r.read_map_start()?;
        while !r.has_map_end()? {
            if properties.len() == MAX_PROPERTIES_PER_TRANSPORT {
                return Err(FormatError::TooLong {
                    length: properties.len() as u64 + 1,
                    max: MAX_PROPERTIES_PER_TRANSPORT,
                });
            }
            let key = r.read_string(MAX_PROPERTY_LENGTH)?;
            let value = r.read_string(MAX_PROPERTY_LENGTH)?;
            if properties.insert(key, value).is_some() {
                return Err(FormatError::InvalidField("duplicate property".into()));
            }
        }
        r.read_map_end()?;
        let version = read_version(r)?;
        r.read_list_end()?;
        Ok(Self {
            transport_id,
            properties,
            version,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capacity
// ─────────────────────────────────────────────────────────────────────────────

/// Bytes one id occupies inside an Ack or Offer: raw8 tag, length, id.
pub const ID_ENTRY_LENGTH: usize = 2 + UNIQUE_ID_LENGTH;

/// Outer and inner list delimiters of an Ack or Offer payload.
const ID_LIST_OVERHEAD: usize = 4;

/// List delimiters and the int8 padding field of a Request payload.
const REQUEST_OVERHEAD: usize = 4;

fn usable(capacity: u64) -> usize {
    capacity.min(MAX_PACKET_LENGTH as u64) as usize
}

/// How many ids an Ack framed into at most `capacity` bytes can carry.
pub fn max_messages_for_ack(capacity: u64) -> usize {
    usable(capacity).saturating_sub(PACKET_HEADER_LENGTH + ID_LIST_OVERHEAD) / ID_ENTRY_LENGTH
}

/// How many ids an Offer framed into at most `capacity` bytes can carry.
pub fn max_messages_for_offer(capacity: u64) -> usize {
    max_messages_for_ack(capacity)
}

/// How many offered ids a Request framed into at most `capacity` bytes can
/// cover.
pub fn max_messages_for_request(capacity: u64) -> usize {
    let available = usable(capacity).saturating_sub(PACKET_HEADER_LENGTH + REQUEST_OVERHEAD);
    // Largest bitmap whose raw value (tag, length prefix, bytes) fits.
    let bitmap = (1..=available)
        .rev()
        .take(5)
        .find(|&b| length_prefix_length(b) + b <= available)
        .unwrap_or(0);
    bitmap * 8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientId;
    use proptest::prelude::*;

    fn ids(n: usize) -> Vec<MessageId> {
        (0..n)
            .map(|i| {
                let mut b = [0u8; 32];
                b[..8].copy_from_slice(&(i as u64).to_be_bytes());
                MessageId(b)
            })
            .collect()
    }

    #[test]
    fn test_packet_type_bytes() {
        assert_eq!(PacketType::try_from(3).unwrap(), PacketType::Request);
        assert_eq!(PacketType::TransportUpdate as u8, 9);
        assert!(matches!(
            PacketType::try_from(10),
            Err(FormatError::UnknownPacketType(10))
        ));
    }

    #[test]
    fn test_request_layout() {
        let request = Request::from_bits([true, false, true]);
        assert_eq!(request.len(), 3);
        let payload = request.encode_payload().unwrap();
        // list, int8 padding 5, raw8 of one byte 0b1010_0000, end
        assert_eq!(hex::encode(&payload), "0d02050a01a010");
        assert_eq!(Request::decode_payload(&payload).unwrap(), request);
    }

    #[test]
    fn test_request_padding_bits_must_be_clear() {
        let payload = hex::decode("0d02050a01a410").unwrap();
        assert!(matches!(
            Request::decode_payload(&payload),
            Err(FormatError::NonCanonical(_))
        ));
        let payload = hex::decode("0d02080a01a010").unwrap();
        assert!(matches!(
            Request::decode_payload(&payload),
            Err(FormatError::InvalidField(_))
        ));
        let payload = hex::decode("0d02000a0010").unwrap();
        assert!(Request::decode_payload(&payload).is_err());
    }

    #[test]
    fn test_request_must_match_offer_length() {
        let offer = Offer {
            message_ids: ids(3),
        };
        let request = Request::from_bits([true; 9]);
        assert_eq!(
            request.select(&offer),
            Err(RequestMismatch {
                request: 9,
                offer: 3
            })
        );
    }

    #[test]
    fn test_empty_ack_is_rejected() {
        assert!(matches!(
            Ack::decode_payload(&hex::decode("0d0d1010").unwrap()),
            Err(FormatError::InvalidField(_))
        ));
        assert!(Ack { message_ids: vec![] }.encode_payload().is_err());
    }

    #[test]
    fn test_ack_with_trailing_data_is_rejected() {
        let mut payload = Ack {
            message_ids: ids(1),
        }
        .encode_payload()
        .unwrap();
        payload.push(0x11);
        assert!(matches!(
            Ack::decode_payload(&payload),
            Err(FormatError::TrailingData)
        ));
    }

    #[test]
    fn test_negative_version_is_rejected() {
        // list, int8 -1, end
        let payload = hex::decode("0d02ff10").unwrap();
        assert!(SubscriptionAck::decode_payload(&payload).is_err());
        let payload = hex::decode("0d020110").unwrap();
        assert_eq!(
            SubscriptionAck::decode_payload(&payload).unwrap(),
            SubscriptionAck { version: 1 }
        );
    }

    #[test]
    fn test_transport_update_decodes() {
        let mut properties = TransportProperties::new();
        properties.insert("address".into(), "10.0.0.1".into());
        properties.insert("port".into(), "1234".into());
        let update = TransportUpdate {
            transport_id: TransportId::new("tcp").unwrap(),
            properties,
            version: 7,
        };
        let payload = update.encode_payload().unwrap();
        assert_eq!(TransportUpdate::decode_payload(&payload).unwrap(), update);
    }

    #[test]
    fn test_transport_update_property_limit() {
        let mut w = Writer::new(Vec::new());
        w.write_list_start().unwrap();
        w.write_string("tcp").unwrap();
        w.write_map_start().unwrap();
        for i in 0..=MAX_PROPERTIES_PER_TRANSPORT {
            w.write_string(&format!("k{}", i)).unwrap();
            w.write_string("v").unwrap();
        }
        w.write_map_end().unwrap();
        w.write_integer(1).unwrap();
        w.write_list_end().unwrap();
        let payload = w.close().unwrap();
        assert!(matches!(
            TransportUpdate::decode_payload(&payload),
            Err(FormatError::TooLong { .. })
        ));
    }

    #[test]
    fn test_empty_transport_id_is_rejected() {
        let payload = hex::decode("0d0700020110").unwrap();
        assert!(matches!(
            TransportAck::decode_payload(&payload),
            Err(FormatError::InvalidField(_))
        ));
    }

    #[test]
    fn test_subscription_update_group_limit() {
        let group = Group::new(ClientId::from_bytes([1; 32]), &b"g"[..]);
        let update = SubscriptionUpdate {
            groups: vec![group; MAX_SUBSCRIPTIONS + 1],
            version: 1,
        };
        assert!(update.encode_payload().is_err());
    }

    #[test]
    fn test_one_id_boundary() {
        let capacity = (PACKET_HEADER_LENGTH + ID_LIST_OVERHEAD + ID_ENTRY_LENGTH) as u64;
        assert_eq!(max_messages_for_ack(capacity), 1);
        assert_eq!(max_messages_for_ack(capacity - 1), 0);
        let payload = Ack {
            message_ids: ids(1),
        }
        .encode_payload()
        .unwrap();
        assert_eq!((PACKET_HEADER_LENGTH + payload.len()) as u64, capacity);
    }

    proptest! {
        #[test]
        fn prop_selection_matches_bits(bits in prop::collection::vec(any::<bool>(), 1..200)) {
            let offer = Offer { message_ids: ids(bits.len()) };
            let request = Request::from_bits(bits.iter().copied());
            let decoded = Request::decode_payload(&request.encode_payload().unwrap()).unwrap();
            let selection = decoded.select(&offer).unwrap();
            let expected: Vec<MessageId> = offer.message_ids.iter().zip(&bits)
                .filter(|(_, bit)| **bit).map(|(id, _)| *id).collect();
            prop_assert_eq!(selection.requested.len() + selection.declined.len(), bits.len());
            prop_assert_eq!(selection.requested, expected);
        }

        #[test]
        fn prop_single_bit_selects_one_id(k in 1usize..100, i in 0usize..100) {
            let i = i % k;
            let offer = Offer { message_ids: ids(k) };
            let request = Request::from_bits((0..k).map(|j| j == i));
            let selection = request.select(&offer).unwrap();
            prop_assert_eq!(selection.requested, vec![offer.message_ids[i]]);
        }

        #[test]
        fn prop_ack_packing_respects_capacity(capacity in 0u64..40_000) {
            let n = max_messages_for_ack(capacity);
            if n > 0 {
                let payload = Ack { message_ids: ids(n) }.encode_payload().unwrap();
                prop_assert!((PACKET_HEADER_LENGTH + payload.len()) as u64 <= capacity);
                prop_assert!(payload.len() <= MAX_PAYLOAD_LENGTH);
                let one_more = Ack { message_ids: ids(n + 1) }.encode_payload().unwrap();
                prop_assert!(
                    (PACKET_HEADER_LENGTH + one_more.len()) as u64 > capacity
                        || one_more.len() > MAX_PAYLOAD_LENGTH
                );
            }
        }

        #[test]
        fn prop_request_packing_respects_capacity(capacity in 0u64..40_000) {
            let n = max_messages_for_request(capacity);
            if n > 0 {
                let payload = Request::from_bits(vec![true; n]).encode_payload().unwrap();
                prop_assert!((PACKET_HEADER_LENGTH + payload.len()) as u64 <= capacity);
                prop_assert!(payload.len() <= MAX_PAYLOAD_LENGTH);
                let wider = Request::from_bits(vec![true; n + 8]).encode_payload().unwrap();
                prop_assert!(
                    (PACKET_HEADER_LENGTH + wider.len()) as u64 > capacity
                        || wider.len() > MAX_PAYLOAD_LENGTH
                );
            }
        }
    }
}
