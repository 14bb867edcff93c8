//! In-memory implementation of the SyncStore trait.
//!
//! Holds everything a session needs to reconcile with a contact: which
//! messages the contact has seen, which of theirs we still owe an ack, and
//! the versioned subscription, transport and retention state in both
//! directions. Nothing is persisted.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use briar_core::constants::PACKET_HEADER_LENGTH;
use briar_core::{
    Ack, ContactId, Group, GroupId, Message, MessageId, Offer, Request, RetentionAck,
    RetentionUpdate, SubscriptionAck, SubscriptionUpdate, TransportAck, TransportId,
    TransportProperties, TransportUpdate,
};

use crate::error::{Result, StoreError};
use crate::traits::{Batch, ReceiveResult, SyncStore};

type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
    clock: Clock,
}

#[derive(Default)]
struct MemoryStoreInner {
    messages: HashMap<MessageId, StoredMessage>,

    /// Arrival order, so offers and batches come out deterministically.
    order: Vec<MessageId>,

    /// Local subscriptions and the contacts each group is visible to.
    subscriptions: BTreeMap<GroupId, Subscription>,
    subscription_version: u64,

    local_transports: BTreeMap<TransportId, LocalTransport>,

    retention_time: u64,
    retention_version: u64,

    contacts: HashMap<ContactId, ContactState>,
}

struct StoredMessage {
    group: GroupId,
    timestamp: i64,
    raw: Bytes,
}

struct Subscription {
    group: Group,
    visible: BTreeSet<ContactId>,
}

struct LocalTransport {
    properties: TransportProperties,
    version: u64,
}

#[derive(Default)]
struct ContactState {
    statuses: HashMap<MessageId, Status>,

    /// Ids received from the contact that we have not acked yet.
    to_ack: BTreeSet<MessageId>,

    /// Ids the contact has acked.
    acked: HashSet<MessageId>,

    remote_subscriptions: Vec<Group>,
    subscriptions: UpdateState,

    remote_retention_time: u64,
    retention: UpdateState,

    remote_transports: BTreeMap<TransportId, TransportProperties>,
    transports: BTreeMap<TransportId, UpdateState>,
}

#[derive(Default, Clone, Copy)]
struct Status {
    /// The contact is known to hold the message.
    seen: bool,
    /// Not offered or sent again before this time (ms).
    expiry: u64,
}

/// Version bookkeeping for one kind of update, in both directions.
#[derive(Default)]
struct UpdateState {
    /// Highest version received from the contact.
    remote_version: u64,
    ack_pending: bool,
    /// Highest local version the contact has acked.
    acked_version: u64,
    sent_version: u64,
    expiry: u64,
}

impl UpdateState {
    /// Applies a remote version. Returns false for stale versions.
    fn receive(&mut self, version: u64) -> bool {
        if version <= self.remote_version {
            return false;
        }
        self.remote_version = version;
        self.ack_pending = true;
        true
    }

    fn take_ack(&mut self) -> Option<u64> {
        if !self.ack_pending {
            return None;
        }
        self.ack_pending = false;
        Some(self.remote_version)
    }

    fn acknowledge(&mut self, version: u64, local_version: u64) {
        if version > self.acked_version && version <= local_version {
            self.acked_version = version;
        }
    }

    fn is_due(&self, local_version: u64, now: u64) -> bool {
        local_version > self.acked_version
            && (local_version != self.sent_version || now >= self.expiry)
    }

    fn mark_sent(&mut self, local_version: u64, now: u64, max_latency: u64) {
        self.sent_version = local_version;
        self.expiry = retransmit_after(now, max_latency);
    }
}

/// Anything sent is given a round trip before it may be sent again.
fn retransmit_after(now: u64, max_latency: u64) -> u64 {
    now.saturating_add(max_latency.saturating_mul(2))
}

fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::with_clock(system_clock)
    }

    /// Create a store reading the time (ms) from `clock`.
    pub fn with_clock(clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
            clock: Box::new(clock),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local operations
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_contact(&self, c: ContactId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.contacts.contains_key(&c) {
            return Err(StoreError::DuplicateContact(c));
        }
        inner.contacts.insert(c, ContactState::default());
        Ok(())
    }

    /// Forgets a contact and everything exchanged with it.
    pub fn remove_contact(&self, c: ContactId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .contacts
            .remove(&c)
            .ok_or(StoreError::UnknownContact(c))?;
        for sub in inner.subscriptions.values_mut() {
            sub.visible.remove(&c);
        }
        Ok(())
    }

    /// Subscribes to a group. Idempotent.
    pub fn subscribe(&self, group: Group) -> GroupId {
        let mut inner = self.inner.write().unwrap();
        let id = group.id();
        if !inner.subscriptions.contains_key(&id) {
            inner.subscriptions.insert(
                id,
                Subscription {
                    group,
                    visible: BTreeSet::new(),
                },
            );
            inner.subscription_version += 1;
        }
        id
    }

    /// Replaces the set of contacts a group is visible to.
    pub fn set_visibility(&self, group: GroupId, contacts: &[ContactId]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(c) = contacts.iter().find(|c| !inner.contacts.contains_key(*c)) {
            return Err(StoreError::UnknownContact(*c));
        }
        let sub = inner
            .subscriptions
            .get_mut(&group)
            .ok_or(StoreError::UnknownGroup(group))?;
        sub.visible = contacts.iter().copied().collect();
        inner.subscription_version += 1;
        Ok(())
    }

    /// Stores a message created locally.
    pub fn add_local_message(&self, message: &Message) -> Result<ReceiveResult> {
        let mut inner = self.inner.write().unwrap();
        inner.store_message(message)
    }

    pub fn set_local_transport_properties(
        &self,
        id: TransportId,
        properties: TransportProperties,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let transport = inner.local_transports.entry(id).or_insert(LocalTransport {
            properties: TransportProperties::new(),
            version: 0,
        });
        transport.properties = properties;
        transport.version += 1;
        Ok(())
    }

    /// Sets the oldest timestamp (ms) of messages we still want to receive.
    pub fn set_retention_time(&self, retention_time: u64) {
        let mut inner = self.inner.write().unwrap();
        inner.retention_time = retention_time;
        inner.retention_version += 1;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    pub fn has_message(&self, id: &MessageId) -> bool {
        self.inner.read().unwrap().messages.contains_key(id)
    }

    pub fn raw_message(&self, id: &MessageId) -> Option<Bytes> {
        let inner = self.inner.read().unwrap();
        inner.messages.get(id).map(|m| m.raw.clone())
    }

    pub fn message_count(&self) -> usize {
        self.inner.read().unwrap().messages.len()
    }

    /// Ids the contact has acknowledged.
    pub fn acked_by(&self, c: ContactId) -> Result<BTreeSet<MessageId>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.contact(c)?.acked.iter().copied().collect())
    }

    pub fn remote_subscriptions(&self, c: ContactId) -> Result<Vec<Group>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.contact(c)?.remote_subscriptions.clone())
    }

    pub fn remote_subscription_version(&self, c: ContactId) -> Result<u64> {
        let inner = self.inner.read().unwrap();
        Ok(inner.contact(c)?.subscriptions.remote_version)
    }

    pub fn remote_transport_properties(
        &self,
        c: ContactId,
    ) -> Result<BTreeMap<TransportId, TransportProperties>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.contact(c)?.remote_transports.clone())
    }

    pub fn remote_retention_time(&self, c: ContactId) -> Result<u64> {
        let inner = self.inner.read().unwrap();
        Ok(inner.contact(c)?.remote_retention_time)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn contact(&self, c: ContactId) -> Result<&ContactState> {
        self.contacts.get(&c).ok_or(StoreError::UnknownContact(c))
    }

    fn contact_mut(&mut self, c: ContactId) -> Result<&mut ContactState> {
        self.contacts.get_mut(&c).ok_or(StoreError::UnknownContact(c))
    }

    fn store_message(&mut self, message: &Message) -> Result<ReceiveResult> {
        if !self.subscriptions.contains_key(&message.group) {
            return Err(StoreError::UnknownGroup(message.group));
        }
        if self.messages.contains_key(&message.id) {
            return Ok(ReceiveResult::Duplicate);
        }
        self.messages.insert(
            message.id,
            StoredMessage {
                group: message.group,
                timestamp: message.timestamp,
                raw: message.raw.clone(),
            },
        );
        self.order.push(message.id);
        Ok(ReceiveResult::Stored)
    }

    /// Whether `id` may go to `c` at all, ignoring retransmission timers.
    fn is_sendable(&self, c: ContactId, contact: &ContactState, id: &MessageId) -> bool {
        let Some(message) = self.messages.get(id) else {
            return false;
        };
        if contact.statuses.get(id).is_some_and(|s| s.seen) {
            return false;
        }
        let visible = self
            .subscriptions
            .get(&message.group)
            .is_some_and(|s| s.visible.contains(&c));
        let wanted = contact
            .remote_subscriptions
            .iter()
            .any(|g| g.id() == message.group);
        visible && wanted && message.timestamp >= contact.remote_retention_time as i64
    }

    /// Sendable ids whose retransmission timer has expired, in arrival order.
    fn due_messages(&self, c: ContactId, now: u64) -> Result<Vec<MessageId>> {
        let contact = self.contact(c)?;
        Ok(self
            .order
            .iter()
            .filter(|id| self.is_sendable(c, contact, id))
            .filter(|id| contact.statuses.get(*id).map_or(0, |s| s.expiry) <= now)
            .copied()
            .collect())
    }

    fn mark_sent(&mut self, c: ContactId, ids: &[MessageId], expiry: u64) -> Result<()> {
        let contact = self.contact_mut(c)?;
        for id in ids {
            contact.statuses.entry(*id).or_default().expiry = expiry;
        }
        Ok(())
    }

    fn visible_groups(&self, c: ContactId) -> Vec<Group> {
        self.subscriptions
            .values()
            .filter(|s| s.visible.contains(&c))
            .map(|s| s.group.clone())
            .collect()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn generate_ack(&self, c: ContactId, max_messages: usize) -> Result<Option<Ack>> {
        let mut inner = self.inner.write().unwrap();
        let contact = inner.contact_mut(c)?;
        let acked: Vec<MessageId> = contact.to_ack.iter().take(max_messages).copied().collect();
        if acked.is_empty() {
            return Ok(None);
        }
        for id in &acked {
            contact.to_ack.remove(id);
        }
        Ok(Some(Ack { message_ids: acked }))
    }

    async fn generate_batch(
        &self,
        c: ContactId,
        max_length: usize,
        max_latency: u64,
    ) -> Result<Option<Vec<Bytes>>> {
        let now = (self.clock)();
        let mut inner = self.inner.write().unwrap();
        let mut sent = Vec::new();
        let mut messages = Vec::new();
        let mut remaining = max_length;
        for id in inner.due_messages(c, now)? {
            let raw = &inner.messages[&id].raw;
            let framed = PACKET_HEADER_LENGTH + raw.len();
            if framed > remaining {
                continue;
            }
            remaining -= framed;
            messages.push(raw.clone());
            sent.push(id);
        }
        if messages.is_empty() {
            return Ok(None);
        }
        inner.mark_sent(c, &sent, retransmit_after(now, max_latency))?;
        debug!(contact = %c, count = messages.len(), "generated batch");
        Ok(Some(messages))
    }

    async fn generate_offer(
        &self,
        c: ContactId,
        max_messages: usize,
        max_latency: u64,
    ) -> Result<Option<Offer>> {
        let now = (self.clock)();
        let mut inner = self.inner.write().unwrap();
        let mut offered = inner.due_messages(c, now)?;
        offered.truncate(max_messages);
        if offered.is_empty() {
            return Ok(None);
        }
        inner.mark_sent(c, &offered, retransmit_after(now, max_latency))?;
        Ok(Some(Offer {
            message_ids: offered,
        }))
    }

    async fn generate_requested_batch(
        &self,
        c: ContactId,
        requested: &[MessageId],
        max_length: usize,
    ) -> Result<Batch> {
        let inner = self.inner.read().unwrap();
        let contact = inner.contact(c)?;
        let mut batch = Batch::default();
        let mut remaining = max_length;
        for id in requested {
            if inner.is_sendable(c, contact, id) {
                let raw = &inner.messages[id].raw;
                let framed = PACKET_HEADER_LENGTH + raw.len();
                if framed > remaining {
                    break;
                }
                remaining -= framed;
                batch.messages.push(raw.clone());
            }
            batch.consumed += 1;
        }
        Ok(batch)
    }

    async fn generate_retention_ack(&self, c: ContactId) -> Result<Option<RetentionAck>> {
        let mut inner = self.inner.write().unwrap();
        let contact = inner.contact_mut(c)?;
        Ok(contact
            .retention
            .take_ack()
            .map(|version| RetentionAck { version }))
    }

    async fn generate_retention_update(
        &self,
        c: ContactId,
        max_latency: u64,
    ) -> Result<Option<RetentionUpdate>> {
        let now = (self.clock)();
        let mut inner = self.inner.write().unwrap();
        let (retention_time, version) = (inner.retention_time, inner.retention_version);
        let contact = inner.contact_mut(c)?;
        if !contact.retention.is_due(version, now) {
            return Ok(None);
        }
        contact.retention.mark_sent(version, now, max_latency);
        Ok(Some(RetentionUpdate {
            retention_time,
            version,
        }))
    }

    async fn generate_subscription_ack(&self, c: ContactId) -> Result<Option<SubscriptionAck>> {
        let mut inner = self.inner.write().unwrap();
        let contact = inner.contact_mut(c)?;
        Ok(contact
            .subscriptions
            .take_ack()
            .map(|version| SubscriptionAck { version }))
    }

    async fn generate_subscription_update(
        &self,
        c: ContactId,
        max_latency: u64,
    ) -> Result<Option<SubscriptionUpdate>> {
        let now = (self.clock)();
        let mut inner = self.inner.write().unwrap();
        let version = inner.subscription_version;
        let groups = inner.visible_groups(c);
        let contact = inner.contact_mut(c)?;
        if !contact.subscriptions.is_due(version, now) {
            return Ok(None);
        }
        contact.subscriptions.mark_sent(version, now, max_latency);
        Ok(Some(SubscriptionUpdate { groups, version }))
    }

    async fn generate_transport_acks(&self, c: ContactId) -> Result<Option<Vec<TransportAck>>> {
        let mut inner = self.inner.write().unwrap();
        let contact = inner.contact_mut(c)?;
        let acks: Vec<TransportAck> = contact
            .transports
            .iter_mut()
            .filter_map(|(id, state)| {
                state.take_ack().map(|version| TransportAck {
                    transport_id: id.clone(),
                    version,
                })
            })
            .collect();
        Ok((!acks.is_empty()).then_some(acks))
    }

    async fn generate_transport_updates(
        &self,
        c: ContactId,
        max_latency: u64,
    ) -> Result<Option<Vec<TransportUpdate>>> {
        let now = (self.clock)();
        let mut guard = self.inner.write().unwrap();
        let inner = &mut *guard;
        let contact = inner
            .contacts
            .get_mut(&c)
            .ok_or(StoreError::UnknownContact(c))?;
        let mut updates = Vec::new();
        for (id, local) in &inner.local_transports {
            let state = contact.transports.entry(id.clone()).or_default();
            if state.is_due(local.version, now) {
                state.mark_sent(local.version, now, max_latency);
                updates.push(TransportUpdate {
                    transport_id: id.clone(),
                    properties: local.properties.clone(),
                    version: local.version,
                });
            }
        }
        Ok((!updates.is_empty()).then_some(updates))
    }

    async fn receive_ack(&self, c: ContactId, ack: &Ack) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let contact = inner.contact_mut(c)?;
        for id in &ack.message_ids {
            contact.statuses.entry(*id).or_default().seen = true;
            contact.acked.insert(*id);
        }
        Ok(())
    }

    async fn receive_message(&self, c: ContactId, message: &Message) -> Result<ReceiveResult> {
        let mut inner = self.inner.write().unwrap();
        inner.contact(c)?;
        let result = inner.store_message(message)?;
        let contact = inner.contact_mut(c)?;
        contact.to_ack.insert(message.id);
        contact.statuses.entry(message.id).or_default().seen = true;
        Ok(result)
    }

    async fn receive_offer(&self, c: ContactId, offer: &Offer) -> Result<Request> {
        let mut guard = self.inner.write().unwrap();
        let inner = &mut *guard;
        let contact = inner
            .contacts
            .get_mut(&c)
            .ok_or(StoreError::UnknownContact(c))?;
        let mut bits = Vec::with_capacity(offer.message_ids.len());
        for id in &offer.message_ids {
            let held = inner.messages.contains_key(id);
            if held {
                contact.statuses.entry(*id).or_default().seen = true;
                contact.to_ack.insert(*id);
            }
            bits.push(!held);
        }
        Ok(Request::from_bits(bits))
    }

    async fn receive_request(
        &self,
        c: ContactId,
        _requested: &[MessageId],
        declined: &[MessageId],
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let contact = inner.contact_mut(c)?;
        for id in declined {
            contact.statuses.entry(*id).or_default().seen = true;
        }
        Ok(())
    }

    async fn receive_retention_ack(&self, c: ContactId, ack: &RetentionAck) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let local = inner.retention_version;
        inner
            .contact_mut(c)?
            .retention
            .acknowledge(ack.version, local);
        Ok(())
    }

    async fn receive_retention_update(
        &self,
        c: ContactId,
        update: &RetentionUpdate,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let contact = inner.contact_mut(c)?;
        if contact.retention.receive(update.version) {
            contact.remote_retention_time = update.retention_time;
        }
        Ok(())
    }

    async fn receive_subscription_ack(&self, c: ContactId, ack: &SubscriptionAck) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let local = inner.subscription_version;
        inner
            .contact_mut(c)?
            .subscriptions
            .acknowledge(ack.version, local);
        Ok(())
    }

    async fn receive_subscription_update(
        &self,
        c: ContactId,
        update: &SubscriptionUpdate,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let contact = inner.contact_mut(c)?;
        if contact.subscriptions.receive(update.version) {
            contact.remote_subscriptions = update.groups.clone();
        } else {
            debug!(contact = %c, version = update.version, "stale subscription update");
        }
        Ok(())
    }

    async fn receive_transport_ack(&self, c: ContactId, ack: &TransportAck) -> Result<()> {
        let mut guard = self.inner.write().unwrap();
        let inner = &mut *guard;
        let local = inner
            .local_transports
            .get(&ack.transport_id)
            .ok_or_else(|| StoreError::UnknownTransport(ack.transport_id.clone()))?;
        let contact = inner
            .contacts
            .get_mut(&c)
            .ok_or(StoreError::UnknownContact(c))?;
        contact
            .transports
            .entry(ack.transport_id.clone())
            .or_default()
            .acknowledge(ack.version, local.version);
        Ok(())
    }

    async fn receive_transport_update(
        &self,
        c: ContactId,
        update: &TransportUpdate,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let contact = inner.contact_mut(c)?;
        let state = contact
            .transports
            .entry(update.transport_id.clone())
            .or_default();
        if state.receive(update.version) {
            contact
                .remote_transports
                .insert(update.transport_id.clone(), update.properties.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use briar_core::{ClientId, MessageFactory};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    const ALICE: ContactId = ContactId(1);

    fn group(name: &str) -> Group {
        Group::new(ClientId::from_bytes([9; 32]), name.as_bytes().to_vec())
    }

    fn message(group: &Group, body: &str, timestamp: i64) -> Message {
        MessageFactory
            .create_anonymous(None, group, timestamp, body.as_bytes())
            .unwrap()
    }

    /// A store sharing `forum` with ALICE, who is subscribed to it too.
    async fn shared_store(clock: Arc<AtomicU64>) -> (MemoryStore, Group) {
        let store = MemoryStore::with_clock(move || clock.load(Ordering::SeqCst));
        let forum = group("forum");
        store.add_contact(ALICE).unwrap();
        let id = store.subscribe(forum.clone());
        store.set_visibility(id, &[ALICE]).unwrap();
        store
            .receive_subscription_update(
                ALICE,
                &SubscriptionUpdate {
                    groups: vec![forum.clone()],
                    version: 1,
                },
            )
            .await
            .unwrap();
        (store, forum)
    }

    #[tokio::test]
    async fn test_receive_message_requires_subscription() {
        let store = MemoryStore::new();
        store.add_contact(ALICE).unwrap();
        let m = message(&group("elsewhere"), "hi", 1);
        assert!(matches!(
            store.receive_message(ALICE, &m).await,
            Err(StoreError::UnknownGroup(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_message_is_idempotent_and_acked_once() {
        let (store, forum) = shared_store(Arc::new(AtomicU64::new(0))).await;
        let m = message(&forum, "hi", 1);

        assert_eq!(
            store.receive_message(ALICE, &m).await.unwrap(),
            ReceiveResult::Stored
        );
        assert_eq!(
            store.receive_message(ALICE, &m).await.unwrap(),
            ReceiveResult::Duplicate
        );

        let ack = store.generate_ack(ALICE, 10).await.unwrap().unwrap();
        assert_eq!(ack.message_ids, vec![m.id]);
        assert!(store.generate_ack(ALICE, 10).await.unwrap().is_none());

        // Received from ALICE, so never offered back.
        assert!(store.generate_offer(ALICE, 10, 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offer_waits_for_retransmission_time() {
        let clock = Arc::new(AtomicU64::new(1_000));
        let (store, forum) = shared_store(clock.clone()).await;
        let m = message(&forum, "hi", 1);
        store.add_local_message(&m).unwrap();

        let offer = store.generate_offer(ALICE, 10, 100).await.unwrap().unwrap();
        assert_eq!(offer.message_ids, vec![m.id]);
        assert!(store.generate_offer(ALICE, 10, 100).await.unwrap().is_none());

        clock.store(1_200, Ordering::SeqCst);
        assert!(store.generate_offer(ALICE, 10, 100).await.unwrap().is_some());

        store
            .receive_ack(ALICE, &Ack { message_ids: vec![m.id] })
            .await
            .unwrap();
        clock.store(10_000, Ordering::SeqCst);
        assert!(store.generate_offer(ALICE, 10, 100).await.unwrap().is_none());
        assert!(store.acked_by(ALICE).unwrap().contains(&m.id));
    }

    #[tokio::test]
    async fn test_nothing_sendable_to_uninterested_contact() {
        let store = MemoryStore::new();
        let forum = group("forum");
        store.add_contact(ALICE).unwrap();
        let id = store.subscribe(forum.clone());
        store.set_visibility(id, &[ALICE]).unwrap();
        store.add_local_message(&message(&forum, "hi", 1)).unwrap();

        // ALICE has not told us she subscribes to the forum.
        assert!(store.generate_offer(ALICE, 10, 100).await.unwrap().is_none());
        assert!(store.generate_batch(ALICE, 1 << 20, 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_receive_offer_requests_only_missing() {
        let (store, forum) = shared_store(Arc::new(AtomicU64::new(0))).await;
        let held = message(&forum, "held", 1);
        let missing = message(&forum, "missing", 2);
        store.add_local_message(&held).unwrap();

        let offer = Offer {
            message_ids: vec![missing.id, held.id],
        };
        let request = store.receive_offer(ALICE, &offer).await.unwrap();
        let selection = request.select(&offer).unwrap();
        assert_eq!(selection.requested, vec![missing.id]);
        assert_eq!(selection.declined, vec![held.id]);

        let ack = store.generate_ack(ALICE, 10).await.unwrap().unwrap();
        assert_eq!(ack.message_ids, vec![held.id]);
    }

    #[tokio::test]
    async fn test_requested_batch_respects_length() {
        let (store, forum) = shared_store(Arc::new(AtomicU64::new(0))).await;
        let a = message(&forum, "first", 1);
        let b = message(&forum, "second", 2);
        store.add_local_message(&a).unwrap();
        store.add_local_message(&b).unwrap();
        let unknown = MessageId::from_bytes([7; 32]);

        let requested = [unknown, a.id, b.id];
        let batch = store
            .generate_requested_batch(ALICE, &requested, PACKET_HEADER_LENGTH + a.len())
            .await
            .unwrap();
        assert_eq!(batch.messages, vec![a.raw.clone()]);
        assert_eq!(batch.consumed, 2);

        let batch = store
            .generate_requested_batch(ALICE, &requested[batch.consumed..], 1 << 20)
            .await
            .unwrap();
        assert_eq!(batch.messages, vec![b.raw.clone()]);
        assert_eq!(batch.consumed, 1);
    }

    #[tokio::test]
    async fn test_batch_only_marks_what_fits_framed() {
        let clock = Arc::new(AtomicU64::new(0));
        let (store, forum) = shared_store(Arc::clone(&clock)).await;
        let a = message(&forum, "first!", 1);
        let b = message(&forum, "second", 2);
        assert_eq!(a.len(), b.len());
        store.add_local_message(&a).unwrap();
        store.add_local_message(&b).unwrap();

        // Room for both bodies but not for both frame headers.
        let just_short = 2 * (PACKET_HEADER_LENGTH + a.len()) - 1;
        let first = store
            .generate_batch(ALICE, just_short, 1_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, vec![a.raw.clone()]);

        // The message left out is still due right away.
        let second = store
            .generate_batch(ALICE, 1 << 20, 1_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, vec![b.raw.clone()]);
    }

    #[tokio::test]
    async fn test_declined_ids_are_not_offered_again() {
        let clock = Arc::new(AtomicU64::new(0));
        let (store, forum) = shared_store(clock.clone()).await;
        let m = message(&forum, "hi", 1);
        store.add_local_message(&m).unwrap();

        store.generate_offer(ALICE, 10, 100).await.unwrap().unwrap();
        store.receive_request(ALICE, &[], &[m.id]).await.unwrap();
        clock.store(10_000, Ordering::SeqCst);
        assert!(store.generate_offer(ALICE, 10, 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_subscription_updates_are_ignored() {
        let store = MemoryStore::new();
        store.add_contact(ALICE).unwrap();
        let update = |version, name: &str| SubscriptionUpdate {
            groups: vec![group(name)],
            version,
        };

        store
            .receive_subscription_update(ALICE, &update(2, "two"))
            .await
            .unwrap();
        assert_eq!(
            store.generate_subscription_ack(ALICE).await.unwrap(),
            Some(SubscriptionAck { version: 2 })
        );

        for (version, name) in [(3, "three"), (1, "one"), (2, "again")] {
            store
                .receive_subscription_update(ALICE, &update(version, name))
                .await
                .unwrap();
        }
        assert_eq!(store.remote_subscriptions(ALICE).unwrap(), vec![group("three")]);
        assert_eq!(store.remote_subscription_version(ALICE).unwrap(), 3);
        assert_eq!(
            store.generate_subscription_ack(ALICE).await.unwrap(),
            Some(SubscriptionAck { version: 3 })
        );
        assert!(store.generate_subscription_ack(ALICE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscription_update_resent_until_acked() {
        let clock = Arc::new(AtomicU64::new(0));
        let (store, forum) = shared_store(clock.clone()).await;

        let update = store
            .generate_subscription_update(ALICE, 100)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.groups, vec![forum]);
        assert!(store
            .generate_subscription_update(ALICE, 100)
            .await
            .unwrap()
            .is_none());

        clock.store(200, Ordering::SeqCst);
        assert!(store
            .generate_subscription_update(ALICE, 100)
            .await
            .unwrap()
            .is_some());

        store
            .receive_subscription_ack(
                ALICE,
                &SubscriptionAck {
                    version: update.version,
                },
            )
            .await
            .unwrap();
        clock.store(10_000, Ordering::SeqCst);
        assert!(store
            .generate_subscription_update(ALICE, 100)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_transport_updates_and_acks() {
        let store = MemoryStore::new();
        store.add_contact(ALICE).unwrap();
        let tcp = TransportId::new("tcp").unwrap();
        let mut properties = TransportProperties::new();
        properties.insert("port".into(), "4000".into());
        store
            .set_local_transport_properties(tcp.clone(), properties.clone())
            .unwrap();

        let updates = store
            .generate_transport_updates(ALICE, 1_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].properties, properties);

        store
            .receive_transport_update(ALICE, &updates[0])
            .await
            .unwrap();
        assert_eq!(
            store.remote_transport_properties(ALICE).unwrap()[&tcp],
            properties
        );
        let acks = store.generate_transport_acks(ALICE).await.unwrap().unwrap();
        assert_eq!(
            acks,
            vec![TransportAck {
                transport_id: tcp,
                version: 1
            }]
        );
        assert!(store.generate_transport_acks(ALICE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retention_filters_old_messages() {
        let (store, forum) = shared_store(Arc::new(AtomicU64::new(0))).await;
        let old = message(&forum, "old", 10);
        let new = message(&forum, "new", 1_000);
        store.add_local_message(&old).unwrap();
        store.add_local_message(&new).unwrap();

        store
            .receive_retention_update(
                ALICE,
                &RetentionUpdate {
                    retention_time: 500,
                    version: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(store.remote_retention_time(ALICE).unwrap(), 500);

        let batch = store.generate_batch(ALICE, 1 << 20, 100).await.unwrap();
        assert_eq!(batch, Some(vec![new.raw.clone()]));
    }

    #[tokio::test]
    async fn test_unknown_contact() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.generate_ack(ContactId(9), 1).await,
            Err(StoreError::UnknownContact(ContactId(9)))
        ));
        store.add_contact(ALICE).unwrap();
        store.remove_contact(ALICE).unwrap();
        assert!(store.remote_subscriptions(ALICE).is_err());
    }
}
