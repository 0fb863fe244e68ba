//! Recipient selection for outbound events.

use std::collections::HashSet;
use std::sync::Arc;

use dishpatch_core::{ConnectionId, OrderId, OrderRecord, UserId};

use super::connection::ConnectionHandle;
use super::registry::ConnectionEntry;

/// Who should receive an event about one order.
///
/// A connection matches when it follows `order_id` **or** is authenticated as
/// `owner`. Both clauses are independent: owners hear about their orders
/// without subscribing, and guests following an order hear about it without
/// authenticating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audience {
    order_id: OrderId,
    owner: Option<UserId>,
    exclude: Option<ConnectionId>,
}

impl Audience {
    /// Subscribers of the order plus every connection of its owner.
    pub fn for_order(order: &OrderRecord) -> Self {
        Self {
            order_id: order.id,
            owner: Some(order.user_id),
            exclude: None,
        }
    }

    /// Subscribers of the order only.
    pub fn subscribers(order_id: OrderId) -> Self {
        Self {
            order_id,
            owner: None,
            exclude: None,
        }
    }

    /// Leave one connection out (e.g. the sender of a relayed message).
    #[must_use]
    pub fn excluding(mut self, id: ConnectionId) -> Self {
        self.exclude = Some(id);
        self
    }

    /// Whether `entry` belongs to this audience.
    pub fn matches(&self, entry: &ConnectionEntry) -> bool {
        if self.exclude.as_ref() == Some(entry.id()) {
            return false;
        }
        entry.subscribed_order_id == Some(self.order_id)
            || self.owner.is_some_and(|owner| entry.user_id == Some(owner))
    }
}

/// Select the handles in `snapshot` that belong to `audience`.
///
/// Pure: no I/O, no registry access. Each connection appears at most once
/// even when it matches both clauses or is repeated in the input.
pub fn resolve(snapshot: &[ConnectionEntry], audience: &Audience) -> Vec<Arc<ConnectionHandle>> {
    let mut seen = HashSet::new();
    snapshot
        .iter()
        .filter(|entry| audience.matches(entry))
        .filter(|entry| seen.insert(entry.id().clone()))
        .map(|entry| entry.handle.clone())
        .collect()
}
