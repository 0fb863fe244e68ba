//! Connection registry: live connections and their identity/subscription state.
//!
//! The registry owns every [`ConnectionEntry`]. Entries are keyed by
//! [`ConnectionId`] and only mutated through [`ConnectionRegistry`] methods.
//! Locks are held for plain map operations only, never across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use dishpatch_core::{ConnectionId, OrderId, UserId};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use super::connection::ConnectionHandle;

/// One live connection as seen by the fan-out path.
///
/// Cloning is cheap; clones handed out by [`ConnectionRegistry::snapshot`]
/// are point-in-time copies and do not observe later mutations.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    /// Transport handle.
    pub handle: Arc<ConnectionHandle>,
    /// Set by an `auth` control message; last one wins.
    pub user_id: Option<UserId>,
    /// Set by a `subscribe` control message; last one wins.
    pub subscribed_order_id: Option<OrderId>,
}

impl ConnectionEntry {
    fn new(handle: Arc<ConnectionHandle>) -> Self {
        Self {
            handle,
            user_id: None,
            subscribed_order_id: None,
        }
    }

    /// Connection identity.
    pub fn id(&self) -> &ConnectionId {
        self.handle.id()
    }
}

/// Aggregate counts for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Live connections.
    pub connections: usize,
    /// Connections with a user identity.
    pub authenticated: usize,
    /// Connections with an order subscription.
    pub subscribed: usize,
}

/// Authoritative map from live connections to their entries.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new unauthenticated, unsubscribed connection.
    ///
    /// Re-admitting an id replaces the previous entry.
    pub fn admit(&self, handle: Arc<ConnectionHandle>) -> ConnectionEntry {
        let entry = ConnectionEntry::new(handle);
        let _ = self
            .entries
            .write()
            .insert(entry.id().clone(), entry.clone());
        debug!(conn_id = %entry.id(), "connection admitted");
        entry
    }

    /// Set or overwrite the user bound to a connection.
    ///
    /// Returns `false` (and changes nothing) if the connection is unknown.
    pub fn authenticate(&self, id: &ConnectionId, user_id: UserId) -> bool {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(id) {
            entry.user_id = Some(user_id);
            true
        } else {
            debug!(conn_id = %id, %user_id, "auth for unknown connection ignored");
            false
        }
    }

    /// Set or overwrite the order a connection follows.
    ///
    /// Returns `false` (and changes nothing) if the connection is unknown.
    pub fn subscribe(&self, id: &ConnectionId, order_id: OrderId) -> bool {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(id) {
            entry.subscribed_order_id = Some(order_id);
            true
        } else {
            debug!(conn_id = %id, %order_id, "subscribe for unknown connection ignored");
            false
        }
    }

    /// Drop a connection's entry. Safe to call repeatedly or for unknown ids.
    pub fn remove(&self, id: &ConnectionId) -> Option<ConnectionEntry> {
        self.entries.write().remove(id)
    }

    /// Copy of one entry.
    pub fn get(&self, id: &ConnectionId) -> Option<ConnectionEntry> {
        self.entries.read().get(id).cloned()
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<ConnectionEntry> {
        self.entries.read().values().cloned().collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Connection, identity, and subscription counts.
    pub fn stats(&self) -> RegistryStats {
        let entries = self.entries.read();
        RegistryStats {
            connections: entries.len(),
            authenticated: entries.values().filter(|e| e.user_id.is_some()).count(),
            subscribed: entries
                .values()
                .filter(|e| e.subscribed_order_id.is_some())
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::connection::tests::make_handle;

    fn admit(registry: &ConnectionRegistry, id: &str) -> ConnectionId {
        let (handle, _rx) = make_handle(id, 4);
        registry.admit(handle).id().clone()
    }

    #[test]
    fn admit_starts_unauthenticated_and_unsubscribed() {
        let registry = ConnectionRegistry::new();
        let id = admit(&registry, "c1");
        let entry = registry.get(&id).unwrap();
        assert!(entry.user_id.is_none());
        assert!(entry.subscribed_order_id.is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn authenticate_overwrites() {
        let registry = ConnectionRegistry::new();
        let id = admit(&registry, "c1");
        assert!(registry.authenticate(&id, UserId::new(1)));
        assert!(registry.authenticate(&id, UserId::new(2)));
        assert_eq!(registry.get(&id).unwrap().user_id, Some(UserId::new(2)));
    }

    #[test]
    fn subscribe_overwrites() {
        let registry = ConnectionRegistry::new();
        let id = admit(&registry, "c1");
        assert!(registry.subscribe(&id, OrderId::new(10)));
        assert!(registry.subscribe(&id, OrderId::new(11)));
        assert_eq!(
            registry.get(&id).unwrap().subscribed_order_id,
            Some(OrderId::new(11))
        );
    }

    #[test]
    fn mutations_on_unknown_connection_are_noops() {
        let registry = ConnectionRegistry::new();
        let ghost = ConnectionId::from("ghost");
        assert!(!registry.authenticate(&ghost, UserId::new(1)));
        assert!(!registry.subscribe(&ghost, OrderId::new(1)));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = admit(&registry, "c1");
        let other = admit(&registry, "c2");

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.remove(&ConnectionId::from("never")).is_none());

        assert_eq!(registry.len(), 1);
        assert!(registry.get(&other).is_some());
    }

    #[test]
    fn remove_unpopulated_entry() {
        let registry = ConnectionRegistry::new();
        let id = admit(&registry, "c1");
        assert!(registry.remove(&id).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn entries_are_keyed_by_identity() {
        let registry = ConnectionRegistry::new();
        let a = admit(&registry, "a");
        let b = admit(&registry, "b");
        let _ = registry.authenticate(&a, UserId::new(5));
        assert!(registry.get(&b).unwrap().user_id.is_none());
    }

    #[test]
    fn snapshot_is_point_in_time() {
        let registry = ConnectionRegistry::new();
        let a = admit(&registry, "a");
        let _ = admit(&registry, "b");

        let snap = registry.snapshot();
        let _ = registry.remove(&a);
        let _ = admit(&registry, "c");
        let _ = registry.subscribe(&ConnectionId::from("b"), OrderId::new(9));

        assert_eq!(snap.len(), 2);
        assert!(snap.iter().all(|e| e.subscribed_order_id.is_none()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn stats_counts_state() {
        let registry = ConnectionRegistry::new();
        let a = admit(&registry, "a");
        let b = admit(&registry, "b");
        let _ = admit(&registry, "c");
        let _ = registry.authenticate(&a, UserId::new(1));
        let _ = registry.subscribe(&a, OrderId::new(1));
        let _ = registry.subscribe(&b, OrderId::new(2));

        assert_eq!(
            registry.stats(),
            RegistryStats {
                connections: 3,
                authenticated: 1,
                subscribed: 2,
            }
        );
    }

    #[test]
    fn concurrent_mutation_during_snapshot_iteration() {
        let registry = Arc::new(ConnectionRegistry::new());
        for i in 0..50 {
            let _ = admit(&registry, &format!("c{i}"));
        }
        let writer = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    let _ = registry.remove(&ConnectionId::from(format!("c{i}").as_str()));
                    let _ = admit(&registry, &format!("n{i}"));
                }
            })
        };
        for _ in 0..50 {
            let snap = registry.snapshot();
            assert!(snap.len() <= 100);
        }
        writer.join().unwrap();
        assert_eq!(registry.len(), 50);
    }
}
