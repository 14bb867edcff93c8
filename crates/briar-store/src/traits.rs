//! SyncStore trait: the generate/receive contract sessions consult.
//!
//! Sessions never touch storage directly. Every call goes through the
//! sequential store queue, so an implementation sees one call at a time and
//! in submission order, but it must still be safe to share across tasks.

use async_trait::async_trait;
use bytes::Bytes;

use briar_core::{
    Ack, ContactId, Message, MessageId, Offer, Request, RetentionAck, RetentionUpdate,
    SubscriptionAck, SubscriptionUpdate, TransportAck, TransportUpdate,
};

use crate::error::Result;

/// Result of receiving a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveResult {
    /// The message was new and has been stored.
    Stored,
    /// The message was already held (not an error).
    Duplicate,
}

/// Messages produced for an outstanding Request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// Serialized messages, in request order.
    pub messages: Vec<Bytes>,
    /// How many leading requested ids were dealt with, sent or skipped as no
    /// longer sendable. The rest are still outstanding.
    pub consumed: usize,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total serialized length of the batch.
    pub fn length(&self) -> usize {
        self.messages.iter().map(Bytes::len).sum()
    }
}

/// The SyncStore trait: async interface sessions use to produce outgoing
/// packets and consume incoming ones.
///
/// `max_latency` is the transport's maximum latency in milliseconds. Anything
/// sent over such a transport is not sent again until it has had time to be
/// acknowledged.
///
/// # Design Notes
///
/// - **Idempotent receives**: receiving the same message twice returns
///   `Duplicate`; a versioned update no newer than the last applied one is a
///   no-op.
/// - **Generation records what it produced**: a generated Ack no longer
///   holds its ids, a generated update is not regenerated until it expires.
#[async_trait]
pub trait SyncStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Generate
    // ─────────────────────────────────────────────────────────────────────────

    /// Ids received from `c` that still need acknowledging, at most
    /// `max_messages` of them.
    async fn generate_ack(&self, c: ContactId, max_messages: usize) -> Result<Option<Ack>>;

    /// Sendable messages for `c` whose retransmission time has come, up to
    /// `max_length` bytes in total counting each message's frame header.
    /// Everything returned is marked sent. Used where there is no
    /// back-channel.
    async fn generate_batch(
        &self,
        c: ContactId,
        max_length: usize,
        max_latency: u64,
    ) -> Result<Option<Vec<Bytes>>>;

    /// Ids of sendable messages for `c` that have not been offered recently.
    async fn generate_offer(
        &self,
        c: ContactId,
        max_messages: usize,
        max_latency: u64,
    ) -> Result<Option<Offer>>;

    /// Messages for the leading ids of `requested`, up to `max_length`
    /// framed bytes.
    async fn generate_requested_batch(
        &self,
        c: ContactId,
        requested: &[MessageId],
        max_length: usize,
    ) -> Result<Batch>;

    async fn generate_retention_ack(&self, c: ContactId) -> Result<Option<RetentionAck>>;

    async fn generate_retention_update(
        &self,
        c: ContactId,
        max_latency: u64,
    ) -> Result<Option<RetentionUpdate>>;

    async fn generate_subscription_ack(&self, c: ContactId) -> Result<Option<SubscriptionAck>>;

    async fn generate_subscription_update(
        &self,
        c: ContactId,
        max_latency: u64,
    ) -> Result<Option<SubscriptionUpdate>>;

    async fn generate_transport_acks(&self, c: ContactId) -> Result<Option<Vec<TransportAck>>>;

    async fn generate_transport_updates(
        &self,
        c: ContactId,
        max_latency: u64,
    ) -> Result<Option<Vec<TransportUpdate>>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Receive
    // ─────────────────────────────────────────────────────────────────────────

    async fn receive_ack(&self, c: ContactId, ack: &Ack) -> Result<()>;

    /// Stores a verified message and schedules its acknowledgement.
    async fn receive_message(&self, c: ContactId, message: &Message) -> Result<ReceiveResult>;

    /// Answers an Offer. Ids already held are scheduled for acknowledgement
    /// and not requested.
    async fn receive_offer(&self, c: ContactId, offer: &Offer) -> Result<Request>;

    /// Records the peer's answer to our Offer. Declined ids are ones the peer
    /// already has.
    async fn receive_request(
        &self,
        c: ContactId,
        requested: &[MessageId],
        declined: &[MessageId],
    ) -> Result<()>;

    async fn receive_retention_ack(&self, c: ContactId, ack: &RetentionAck) -> Result<()>;

    async fn receive_retention_update(&self, c: ContactId, update: &RetentionUpdate)
        -> Result<()>;

    async fn receive_subscription_ack(&self, c: ContactId, ack: &SubscriptionAck) -> Result<()>;

    async fn receive_subscription_update(
        &self,
        c: ContactId,
        update: &SubscriptionUpdate,
    ) -> Result<()>;

    async fn receive_transport_ack(&self, c: ContactId, ack: &TransportAck) -> Result<()>;

    async fn receive_transport_update(&self, c: ContactId, update: &TransportUpdate)
        -> Result<()>;
}
