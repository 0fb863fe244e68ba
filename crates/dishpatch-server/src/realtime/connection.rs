//! Transport handle for one live WebSocket client.
//!
//! The handle is the only thing the fan-out path knows about a socket: it can
//! enqueue a text frame, report whether the socket is still writable, and ask
//! the session to close. Identity and subscription state live in the registry
//! entry, never here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dishpatch_core::ConnectionId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Why a frame could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The outbound queue is at capacity (slow reader).
    #[error("outbound queue full")]
    Full,
    /// The session's writer has gone away.
    #[error("connection closed")]
    Closed,
}

/// Sending half of a connected client.
pub struct ConnectionHandle {
    id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// Cancelled when the session is closing.
    close: CancellationToken,
    connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat tick.
    is_alive: AtomicBool,
    dropped_messages: AtomicU64,
}

impl ConnectionHandle {
    /// Create a handle around a session's outbound queue and close token.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>, close: CancellationToken) -> Self {
        Self {
            id,
            tx,
            close,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection identity.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Whether the socket can accept a frame right now.
    ///
    /// False once the session started closing or its writer is gone.
    pub fn is_ready(&self) -> bool {
        !self.close.is_cancelled() && !self.tx.is_closed()
    }

    /// Enqueue a text frame without waiting.
    ///
    /// Failures bump the dropped-message counter; the caller decides whether
    /// to log. Never blocks.
    pub fn send(&self, message: Arc<String>) -> Result<(), SendError> {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(match e {
                    TrySendError::Full(_) => SendError::Full,
                    TrySendError::Closed(_) => SendError::Closed,
                })
            }
        }
    }

    /// Ask the session to close the socket. Idempotent.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Total frames that could not be enqueued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record client activity (pong, ping, or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the client was active since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Handle plus the receiving end of its queue.
    pub(crate) fn make_handle(
        id: &str,
        capacity: usize,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = ConnectionHandle::new(ConnectionId::from(id), tx, CancellationToken::new());
        (Arc::new(handle), rx)
    }

    #[test]
    fn new_handle_is_ready_and_alive() {
        let (conn, _rx) = make_handle("c1", 4);
        assert_eq!(conn.id().as_str(), "c1");
        assert!(conn.is_ready());
        assert!(conn.check_alive());
    }

    #[tokio::test]
    async fn send_enqueues_frame() {
        let (conn, mut rx) = make_handle("c1", 4);
        conn.send(Arc::new("hello".into())).unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
        assert_eq!(conn.drop_count(), 0);
    }

    #[test]
    fn send_to_full_queue_fails() {
        let (conn, _rx) = make_handle("c1", 1);
        conn.send(Arc::new("one".into())).unwrap();
        assert_eq!(conn.send(Arc::new("two".into())), Err(SendError::Full));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn send_after_writer_gone_fails() {
        let (conn, rx) = make_handle("c1", 4);
        drop(rx);
        assert!(!conn.is_ready());
        assert_eq!(conn.send(Arc::new("x".into())), Err(SendError::Closed));
    }

    #[test]
    fn close_is_idempotent_and_unreadies() {
        let (conn, _rx) = make_handle("c1", 4);
        conn.close();
        conn.close();
        assert!(!conn.is_ready());
    }

    #[test]
    fn check_alive_resets_flag() {
        let (conn, _rx) = make_handle("c1", 4);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn age_grows_from_creation() {
        let (conn, _rx) = make_handle("c1", 4);
        std::thread::sleep(Duration::from_millis(20));
        assert!(conn.age() >= Duration::from_millis(20));
    }
}
