//! # Briar Core
//!
//! Pure primitives for the Briar sync engine: the tagged wire codec, the
//! message format, and the closed set of sync packets.
//!
//! This crate contains no async code, no storage, no networking. Everything
//! here is computation over bytes and keys.
//!
//! ## Key Types
//!
//! - [`Reader`] / [`Writer`] - Streaming decoder and encoder for tagged values
//! - [`Packet`] - One decoded sync packet
//! - [`UnverifiedMessage`] / [`Message`] - A message before and after its
//!   signature is checked
//! - [`MessageId`], [`GroupId`], [`ContactId`], [`TransportId`] - Identifiers
//!
//! ## Canonical encoding
//!
//! Integers and length prefixes always use their narrowest width, and the
//! reader rejects anything wider. See the [`codec`] module for the tag table.

pub mod codec;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod message;
pub mod packet;
pub mod types;
pub mod validation;

pub use codec::{
    Consumer, CopyingConsumer, CountingConsumer, DigestingConsumer, Reader, Value, ValueKind,
    Writer,
};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{FormatError, Result, VerificationError};
pub use message::{Author, Group, Message, MessageFactory, UnverifiedMessage};
pub use packet::{
    Ack, Offer, Packet, PacketPayload, PacketType, Request, RequestMismatch, RetentionAck,
    RetentionUpdate, Selection, SubscriptionAck, SubscriptionUpdate, TransportAck,
    TransportProperties, TransportUpdate,
};
pub use types::{ClientId, ContactId, GroupId, InvalidTransportId, MessageId, TransportId};
pub use validation::{MessageVerifier, SignatureVerifier};
