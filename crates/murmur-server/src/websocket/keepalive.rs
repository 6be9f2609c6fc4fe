//! Periodic liveness pings per connection.

use std::sync::Arc;
use std::time::Duration;

use murmur_core::PING_FRAME;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::connection::ConnectionHandle;

/// Why the keepalive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveOutcome {
    /// The session's token was cancelled.
    Cancelled,
    /// A ping could not be queued; the transport is gone.
    TransportGone,
}

/// Send `{"type":"ping"}` every `interval` until cancelled or the
/// transport dies.
///
/// A failed send only ends this task; the session's receive loop
/// notices the dead transport on its own and runs the cleanup.
pub async fn run_keepalive(
    connection: Arc<ConnectionHandle>,
    interval: Duration,
    cancel: CancellationToken,
) -> KeepaliveOutcome {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; the client just got a welcome,
    // so skip it.
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !connection.send_text(Arc::new(PING_FRAME.to_string())) {
                    debug!(conn_id = %connection.id, "keepalive send failed, stopping");
                    return KeepaliveOutcome::TransportGone;
                }
            }
            () = cancel.cancelled() => {
                debug!(conn_id = %connection.id, "keepalive cancelled");
                return KeepaliveOutcome::Cancelled;
            }
        }
    }
}
