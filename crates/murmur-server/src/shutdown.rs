//! Coordinated shutdown for the server and its per-connection tasks.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns the root cancellation token every long-lived task watches.
///
/// Each websocket session takes a child token, so cancelling the root
/// tears down every keepalive and bridge listener in one step while a
/// single session can still be cancelled on its own.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// New coordinator with an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// The root token, for tasks tied to the whole server lifetime.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A child token for one session's tasks.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been triggered.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Trigger shutdown and wait up to `timeout` for `handles` to finish.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Duration) {
        self.shutdown();
        let drain = futures::future::join_all(handles);
        match tokio::time::timeout(timeout, drain).await {
            Ok(_) => info!("all tasks finished cleanly"),
            Err(_) => warn!(?timeout, "shutdown timeout elapsed with tasks still running"),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
