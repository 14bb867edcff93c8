//! Tracks which (contact, transport) pairs have a live session.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use briar_core::{ContactId, TransportId};

/// Registry of active connections.
///
/// A session registers on start and unregisters from its disposal path; a
/// higher-level poller reads the registry to decide when to reconnect.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Registers a connection. Returns false if the pair is already
    /// connected.
    async fn register_connection(&self, contact: ContactId, transport: &TransportId) -> bool;

    async fn unregister_connection(&self, contact: ContactId, transport: &TransportId);

    async fn is_connected(&self, contact: ContactId, transport: &TransportId) -> bool;

    /// Contacts currently connected over `transport`.
    async fn connected_contacts(&self, transport: &TransportId) -> Vec<ContactId>;
}

/// In-process registry.
#[derive(Default)]
pub struct InMemoryRegistry {
    connections: RwLock<HashSet<(ContactId, TransportId)>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryRegistry {
    async fn register_connection(&self, contact: ContactId, transport: &TransportId) -> bool {
        self.connections
            .write()
            .await
            .insert((contact, transport.clone()))
    }

    async fn unregister_connection(&self, contact: ContactId, transport: &TransportId) {
        self.connections
            .write()
            .await
            .remove(&(contact, transport.clone()));
    }

    async fn is_connected(&self, contact: ContactId, transport: &TransportId) -> bool {
        self.connections
            .read()
            .await
            .contains(&(contact, transport.clone()))
    }

    async fn connected_contacts(&self, transport: &TransportId) -> Vec<ContactId> {
        let mut contacts: Vec<ContactId> = self
            .connections
            .read()
            .await
            .iter()
            .filter(|(_, t)| t == transport)
            .map(|(c, _)| *c)
            .collect();
        contacts.sort();
        contacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_registration_is_refused() {
        let registry = InMemoryRegistry::new();
        let tcp = TransportId::new("tcp").unwrap();
        let bt = TransportId::new("bt").unwrap();

        assert!(registry.register_connection(ContactId(1), &tcp).await);
        assert!(!registry.register_connection(ContactId(1), &tcp).await);
        assert!(registry.register_connection(ContactId(1), &bt).await);
        assert!(registry.register_connection(ContactId(2), &tcp).await);
        assert_eq!(
            registry.connected_contacts(&tcp).await,
            vec![ContactId(1), ContactId(2)]
        );

        registry.unregister_connection(ContactId(1), &tcp).await;
        assert!(!registry.is_connected(ContactId(1), &tcp).await);
        assert!(registry.is_connected(ContactId(1), &bt).await);
        assert_eq!(registry.len().await, 2);
    }
}
