//! Delivery chat relay between parties following the same order.

use chrono::Utc;
use dishpatch_core::{ConnectionId, OrderId};
use tracing::debug;

use super::dispatcher::{DispatchReport, dispatch};
use super::protocol::{DeliveryMessage, ServerEvent};
use super::registry::ConnectionRegistry;
use super::resolver::{Audience, resolve};

/// Relay a chat line to every other connection subscribed to `order_id`.
///
/// The sender's user id is attached when its connection is authenticated.
/// Nothing is stored; parties that are offline miss the line.
pub fn relay_delivery_message(
    registry: &ConnectionRegistry,
    sender: &ConnectionId,
    order_id: OrderId,
    message: String,
) -> DispatchReport {
    let sender_user_id = registry.get(sender).and_then(|entry| entry.user_id);
    let event = ServerEvent::DeliveryMessage(DeliveryMessage {
        order_id,
        message,
        sender_user_id,
        timestamp: Utc::now(),
    });

    let audience = Audience::subscribers(order_id).excluding(sender.clone());
    let targets = resolve(&registry.snapshot(), &audience);
    let report = dispatch(&targets, &event);
    debug!(conn_id = %sender, %order_id, delivered = report.delivered, "relayed delivery message");
    report
}
