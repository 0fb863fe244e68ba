//! Entry point the order-management path calls after persisting a change.

use std::sync::Arc;

use dishpatch_core::OrderRecord;
use metrics::counter;
use tracing::{debug, info};

use crate::metrics::ORDER_UPDATES_TOTAL;
use crate::realtime::dispatcher::{DispatchReport, dispatch};
use crate::realtime::protocol::ServerEvent;
use crate::realtime::registry::ConnectionRegistry;
use crate::realtime::resolver::{Audience, resolve};

/// Fans order updates out to the connections that care about them.
#[derive(Clone)]
pub struct OrderNotifier {
    registry: Arc<ConnectionRegistry>,
}

impl OrderNotifier {
    /// Notifier over a shared registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Push `order` as an `order_update` to its subscribers and owner.
    ///
    /// The record is trusted as given and is not re-fetched. Recipients are
    /// taken from a snapshot at call time; connections that subscribe
    /// afterwards miss this update.
    pub fn notify(&self, order: &OrderRecord) -> DispatchReport {
        counter!(ORDER_UPDATES_TOTAL).increment(1);
        let snapshot = self.registry.snapshot();
        let targets = resolve(&snapshot, &Audience::for_order(order));
        if targets.is_empty() {
            debug!(order_id = %order.id, user_id = %order.user_id, "no recipients for order update");
            return DispatchReport::default();
        }
        let report = dispatch(&targets, &ServerEvent::OrderUpdate(order.clone()));
        info!(
            order_id = %order.id,
            status = %order.status,
            recipients = targets.len(),
            delivered = report.delivered,
            "order update fanned out"
        );
        report
    }

    /// Registry this notifier reads.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::connection::tests::make_handle;
    use dishpatch_core::{OrderId, OrderStatus, UserId};

    fn order(id: i64, user_id: i64, status: OrderStatus) -> OrderRecord {
        OrderRecord::new(OrderId::new(id), UserId::new(user_id), status)
    }

    #[test]
    fn subscribed_and_authenticated_client_gets_one_update() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (h1, mut rx) = make_handle("h1", 4);
        let id = registry.admit(h1).id().clone();
        let _ = registry.authenticate(&id, UserId::new(5));
        let _ = registry.subscribe(&id, OrderId::new(100));

        let notifier = OrderNotifier::new(registry);
        let report = notifier.notify(&order(100, 5, OrderStatus::Preparing));

        assert_eq!(report.delivered, 1);
        let msg = rx.try_recv().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "order_update");
        assert_eq!(parsed["data"]["status"], "preparing");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn idle_client_gets_nothing() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (h2, mut rx) = make_handle("h2", 4);
        let _ = registry.admit(h2);

        let report = OrderNotifier::new(registry).notify(&order(100, 5, OrderStatus::Ready));

        assert_eq!(report.attempted(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn removed_client_is_not_attempted() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (h1, _rx) = make_handle("h1", 4);
        let id = registry.admit(h1).id().clone();
        let _ = registry.subscribe(&id, OrderId::new(100));
        let _ = registry.remove(&id);

        let report = OrderNotifier::new(registry).notify(&order(100, 5, OrderStatus::Delivered));
        assert_eq!(report.attempted(), 0);
    }

    #[test]
    fn notify_with_empty_registry() {
        let notifier = OrderNotifier::new(Arc::new(ConnectionRegistry::new()));
        assert_eq!(
            notifier.notify(&order(1, 1, OrderStatus::Pending)),
            DispatchReport::default()
        );
        assert!(notifier.registry().is_empty());
    }
}
