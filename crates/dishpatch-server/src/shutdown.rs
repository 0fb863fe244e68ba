//! Server-wide shutdown: one root `CancellationToken` for the listener and a
//! child token per WebSocket session.

use std::time::Duration;

use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long `graceful_shutdown` waits when no timeout is given.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the root token. Cancelling it stops `axum::serve` and closes every
/// session, since each session's close token is a child of the root.
pub struct ShutdownCoordinator {
    root: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator with a fresh root token.
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    /// Root token; the listener waits on it.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Close token for one session. Cancelled by shutdown, but cancelling it
    /// only ends that session.
    pub fn session_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Cancel the root token. Idempotent.
    pub fn shutdown(&self) {
        if !self.root.is_cancelled() {
            info!("shutdown requested");
        }
        self.root.cancel();
    }

    /// Whether shutdown has started. New upgrades are refused from here on.
    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancel the root, then wait up to `timeout` for `handles`.
    /// Tasks still running at the deadline are aborted.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();

        let aborts: Vec<AbortHandle> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_ok()
        {
            info!(tasks = aborts.len(), "all server tasks finished");
            return;
        }

        let stuck = aborts.iter().filter(|a| !a.is_finished()).count();
        warn!(stuck, ?timeout, "shutdown deadline reached, aborting remaining tasks");
        for handle in &aborts {
            handle.abort();
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
