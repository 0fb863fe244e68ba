//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use dishpatch_core::ConnectionId;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::chat::relay_delivery_message;
use super::connection::ConnectionHandle;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::protocol::{ClientMessage, parse_client_message};
use super::registry::ConnectionRegistry;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_CONTROL_MESSAGES_REJECTED_TOTAL, WS_CONTROL_MESSAGES_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// How long the writer gets to flush a Close frame after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-session tuning.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Outbound frames buffered before sends fail.
    pub send_queue_capacity: usize,
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Client silence tolerated before closing.
    pub heartbeat_timeout: Duration,
    /// Largest control message applied; longer payloads are discarded.
    pub max_message_size: usize,
}

/// Run a WebSocket session for a connected client.
///
/// 1. Admits the connection into the registry
/// 2. Applies inbound control messages to the registry entry
/// 3. Forwards outbound frames and periodic Ping frames
/// 4. Closes on client close, transport error, heartbeat timeout, or when
///    `close` is cancelled (server shutdown cancels every session token)
/// 5. Removes the registry entry exactly once
#[instrument(skip_all, fields(conn_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    registry: Arc<ConnectionRegistry>,
    config: SessionConfig,
    close: CancellationToken,
) {
    let conn_id = ConnectionId::new();
    let _ = tracing::Span::current().record("conn_id", conn_id.as_str());

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity.max(1));
    let connection = Arc::new(ConnectionHandle::new(conn_id.clone(), send_tx, close.clone()));

    let connection_start = Instant::now();
    let _ = registry.admit(connection.clone());
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Outbound forwarder with periodic Ping frames.
    let outbound_close = close.clone();
    let ping_every = config.heartbeat_interval;
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_every);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_close.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let heartbeat = tokio::spawn({
        let connection = connection.clone();
        let close = close.clone();
        async move {
            let result = run_heartbeat(
                connection.clone(),
                config.heartbeat_interval,
                config.heartbeat_timeout,
                close,
            )
            .await;
            if result == HeartbeatResult::TimedOut {
                warn!("client unresponsive, disconnecting");
                connection.close();
            }
        }
    });

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = close.cancelled() => {
                debug!("session closing");
                break;
            }
        };

        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "transport error");
                break;
            }
            None => break,
        };

        connection.mark_alive();
        match msg {
            Message::Text(text) => {
                handle_text(&registry, &conn_id, config.max_message_size, text.as_str());
            }
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => handle_text(&registry, &conn_id, config.max_message_size, text),
                Err(_) => {
                    warn!(len = data.len(), "discarding non-UTF8 binary frame");
                    counter!(WS_CONTROL_MESSAGES_REJECTED_TOTAL).increment(1);
                }
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Clean up
    close.cancel();
    let _ = registry.remove(&conn_id);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut outbound)
        .await
        .is_err()
    {
        outbound.abort();
    }
    heartbeat.abort();

    info!(
        dropped = connection.drop_count(),
        age_secs = connection.age().as_secs(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
}

/// Apply one inbound text frame. Malformed or oversized frames are logged
/// and dropped; the connection stays open and nothing is sent back.
fn handle_text(
    registry: &ConnectionRegistry,
    conn_id: &ConnectionId,
    max_len: usize,
    text: &str,
) {
    if text.len() > max_len {
        warn!(len = text.len(), max_len, "discarding oversized control message");
        counter!(WS_CONTROL_MESSAGES_REJECTED_TOTAL).increment(1);
        return;
    }
    let message = match parse_client_message(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, len = text.len(), "discarding malformed control message");
            counter!(WS_CONTROL_MESSAGES_REJECTED_TOTAL).increment(1);
            return;
        }
    };
    counter!(WS_CONTROL_MESSAGES_TOTAL, "type" => message.kind()).increment(1);

    match message {
        ClientMessage::Auth { user_id } => {
            if registry.authenticate(conn_id, user_id) {
                debug!(%user_id, "connection authenticated");
            }
        }
        ClientMessage::Subscribe { order_id } => {
            if registry.subscribe(conn_id, order_id) {
                debug!(%order_id, "connection subscribed");
            }
        }
        ClientMessage::DeliveryMessage { order_id, message } => {
            let _ = relay_delivery_message(registry, conn_id, order_id, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::connection::tests::make_handle;
    use dishpatch_core::{OrderId, UserId};

    const LIMIT: usize = 1024;

    fn registry_with(id: &str) -> (ConnectionRegistry, ConnectionId) {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = make_handle(id, 4);
        let conn_id = registry.admit(handle).id().clone();
        (registry, conn_id)
    }

    #[test]
    fn auth_then_subscribe_updates_entry() {
        let (registry, id) = registry_with("c1");
        handle_text(&registry, &id, LIMIT, r#"{"type":"auth","userId":5}"#);
        handle_text(&registry, &id, LIMIT, r#"{"type":"subscribe","orderId":100}"#);

        let entry = registry.get(&id).unwrap();
        assert_eq!(entry.user_id, Some(UserId::new(5)));
        assert_eq!(entry.subscribed_order_id, Some(OrderId::new(100)));
    }

    #[test]
    fn garbage_leaves_entry_untouched() {
        let (registry, id) = registry_with("c1");
        handle_text(&registry, &id, LIMIT, "not json");
        handle_text(&registry, &id, LIMIT, r#"{"type":"bogus"}"#);
        handle_text(&registry, &id, LIMIT, r#"{"type":"auth","userId":0}"#);

        let entry = registry.get(&id).unwrap();
        assert!(entry.user_id.is_none());
        assert!(entry.subscribed_order_id.is_none());

        handle_text(&registry, &id, LIMIT, r#"{"type":"subscribe","orderId":3}"#);
        assert_eq!(
            registry.get(&id).unwrap().subscribed_order_id,
            Some(OrderId::new(3))
        );
    }

    #[test]
    fn oversized_message_is_discarded_and_later_messages_apply() {
        let (registry, id) = registry_with("c1");
        let padding = "x".repeat(LIMIT);
        let oversized = format!(r#"{{"type":"subscribe","orderId":9,"pad":"{padding}"}}"#);
        handle_text(&registry, &id, LIMIT, &oversized);
        assert!(registry.get(&id).unwrap().subscribed_order_id.is_none());

        handle_text(&registry, &id, LIMIT, r#"{"type":"subscribe","orderId":100}"#);
        assert_eq!(
            registry.get(&id).unwrap().subscribed_order_id,
            Some(OrderId::new(100))
        );
    }

    #[test]
    fn message_at_limit_is_applied() {
        let (registry, id) = registry_with("c1");
        let text = r#"{"type":"auth","userId":5}"#;
        handle_text(&registry, &id, text.len(), text);
        assert_eq!(registry.get(&id).unwrap().user_id, Some(UserId::new(5)));
    }

    #[test]
    fn control_message_for_removed_connection_is_ignored() {
        let (registry, id) = registry_with("c1");
        let _ = registry.remove(&id);
        handle_text(&registry, &id, LIMIT, r#"{"type":"auth","userId":5}"#);
        assert!(registry.is_empty());
    }

    #[test]
    fn delivery_message_is_relayed() {
        let registry = ConnectionRegistry::new();
        let (sender, _rx_sender) = make_handle("sender", 4);
        let (peer, mut rx_peer) = make_handle("peer", 4);
        let sender_id = registry.admit(sender).id().clone();
        let peer_id = registry.admit(peer).id().clone();
        let _ = registry.subscribe(&peer_id, OrderId::new(4));

        handle_text(
            &registry,
            &sender_id,
            LIMIT,
            r#"{"type":"delivery_message","orderId":4,"message":"here"}"#,
        );
        assert!(rx_peer.try_recv().is_ok());
    }
}
