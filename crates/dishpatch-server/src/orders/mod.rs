//! Order store collaborator and the order HTTP surface.
//!
//! The store is the source of truth for order state. The fan-out path never
//! writes to it; the status route writes first, then notifies.

pub mod routes;

use std::collections::HashMap;

use async_trait::async_trait;
use dishpatch_core::{DriverLocation, OrderId, OrderRecord, OrderStatus};
use parking_lot::RwLock;
use thiserror::Error;

/// Order store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An order with this id already exists.
    #[error("order {0} already exists")]
    Duplicate(OrderId),
    /// The backing store could not serve the request.
    #[error("order store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence boundary for orders.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Current record, or `None` if unknown.
    async fn get(&self, id: OrderId) -> Result<Option<OrderRecord>, StoreError>;

    /// Persist a status change and return the updated record, or `None` if unknown.
    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        driver_location: Option<DriverLocation>,
    ) -> Result<Option<OrderRecord>, StoreError>;

    /// Add a new order.
    async fn insert(&self, order: OrderRecord) -> Result<(), StoreError>;
}

/// Process-local order store.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, OrderRecord>>,
}

impl InMemoryOrderStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `orders`; later duplicates replace earlier ones.
    pub fn with_orders(orders: impl IntoIterator<Item = OrderRecord>) -> Self {
        let orders = orders.into_iter().map(|o| (o.id, o)).collect();
        Self {
            orders: RwLock::new(orders),
        }
    }

    /// Number of stored orders.
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, id: OrderId) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.orders.read().get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        driver_location: Option<DriverLocation>,
    ) -> Result<Option<OrderRecord>, StoreError> {
        let mut orders = self.orders.write();
        Ok(orders.get_mut(&id).map(|order| {
            order.apply_status(status, driver_location);
            order.clone()
        }))
    }

    async fn insert(&self, order: OrderRecord) -> Result<(), StoreError> {
        let mut orders = self.orders.write();
        if orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate(order.id));
        }
        let _ = orders.insert(order.id, order);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dishpatch_core::UserId;

    fn order(id: i64) -> OrderRecord {
        OrderRecord::new(OrderId::new(id), UserId::new(1), OrderStatus::Pending)
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = InMemoryOrderStore::new();
        store.insert(order(1)).await.unwrap();
        let got = store.get(OrderId::new(1)).await.unwrap().unwrap();
        assert_eq!(got.status, OrderStatus::Pending);
        assert!(store.get(OrderId::new(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = InMemoryOrderStore::with_orders([order(1)]);
        let err = store.insert(order(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(id) if id == OrderId::new(1)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn update_status_persists_and_returns_record() {
        let store = InMemoryOrderStore::with_orders([order(1)]);
        let here = DriverLocation { lat: 1.5, lng: 2.5 };
        let updated = store
            .update_status(OrderId::new(1), OrderStatus::OutForDelivery, Some(here))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, OrderStatus::OutForDelivery);
        assert_eq!(updated.driver_location, Some(here));
        assert!(updated.updated_at.is_some());

        let stored = store.get(OrderId::new(1)).await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn update_unknown_order_returns_none() {
        let store = InMemoryOrderStore::new();
        let result = store
            .update_status(OrderId::new(9), OrderStatus::Ready, None)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.is_empty());
    }
}
