//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use briar_core::{
    ClientId, ContactId, Group, GroupId, Keypair, Message, MessageFactory, TransportId,
};
use briar_store::MemoryStore;
use briar_sync::StreamContext;

/// Secret handed to every test session.
pub const TEST_SECRET: [u8; 32] = [0xa5; 32];

/// A peer with a keypair and its own memory store.
pub struct TestPeer {
    pub name: String,
    pub keypair: Keypair,
    pub store: Arc<MemoryStore>,
}

impl TestPeer {
    /// Create a peer with a deterministic keypair.
    pub fn new(name: &str, seed: u8) -> Self {
        Self::with_store(name, seed, MemoryStore::new())
    }

    pub fn with_store(name: &str, seed: u8, store: MemoryStore) -> Self {
        Self {
            name: name.to_string(),
            keypair: Keypair::from_seed(&[seed; 32]),
            store: Arc::new(store),
        }
    }

    /// Subscribe to `group` and make it visible to `contacts`, adding any
    /// contact the store does not know yet.
    pub fn share(&self, group: &Group, contacts: &[ContactId]) -> GroupId {
        for c in contacts {
            let _ = self.store.add_contact(*c);
        }
        let id = self.store.subscribe(group.clone());
        self.store
            .set_visibility(id, contacts)
            .expect("contacts were just added");
        id
    }

    /// Create a signed message without storing it.
    pub fn make_message(&self, group: &Group, timestamp: i64, body: &[u8]) -> Message {
        MessageFactory
            .create_pseudonymous(None, group, &self.name, &self.keypair, timestamp, body)
            .expect("message within limits")
    }

    /// Create a signed message and store it as local.
    pub fn post(&self, group: &Group, timestamp: i64, body: &[u8]) -> Message {
        let message = self.make_message(group, timestamp, body);
        self.store
            .add_local_message(&message)
            .expect("group is subscribed");
        message
    }
}

/// The group most tests share.
pub fn forum() -> Group {
    group("forum")
}

pub fn group(descriptor: &str) -> Group {
    Group::new(
        ClientId::from_bytes([0x42; 32]),
        descriptor.as_bytes().to_vec(),
    )
}

pub fn transport(name: &str) -> TransportId {
    TransportId::new(name).expect("valid transport id")
}

/// A fresh context for `contact` over `transport`.
pub fn context(contact: ContactId, transport_name: &str) -> StreamContext {
    StreamContext::new(contact, transport(transport_name), TEST_SECRET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use briar_store::ReceiveResult;

    #[test]
    fn test_post_stores_message() {
        let alice = TestPeer::new("alice", 1);
        alice.share(&forum(), &[ContactId(2)]);
        let m = alice.post(&forum(), 1000, b"hello");
        assert!(alice.store.has_message(&m.id));
        assert_eq!(
            alice.store.add_local_message(&m).unwrap(),
            ReceiveResult::Duplicate
        );
    }

    #[test]
    fn test_peers_have_distinct_keys() {
        let a = TestPeer::new("a", 1);
        let b = TestPeer::new("b", 2);
        assert_ne!(a.keypair.public_key(), b.keypair.public_key());
    }
}
