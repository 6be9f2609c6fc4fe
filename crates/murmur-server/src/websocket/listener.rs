//! Drains a broker subscription into the owning connection.

use std::sync::Arc;

use metrics::counter;
use murmur_broker::Subscription;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::connection::ConnectionHandle;
use crate::metrics as names;

/// Why the bridge listener stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// The session's token was cancelled.
    Cancelled,
    /// The subscription stream ended on its own.
    StreamEnded,
    /// A payload could not be queued; the transport is gone.
    ForwardFailed,
}

/// Forward every payload from `subscription` to the connection, verbatim.
///
/// Payloads are opaque here: whatever was published to the group channel
/// goes to the socket untouched.
pub async fn run_listener(
    connection: Arc<ConnectionHandle>,
    mut subscription: Subscription,
    cancel: CancellationToken,
) -> ListenerOutcome {
    loop {
        tokio::select! {
            payload = subscription.next() => {
                let Some(payload) = payload else {
                    debug!(conn_id = %connection.id, "subscription stream ended");
                    return ListenerOutcome::StreamEnded;
                };
                counter!(names::BRIDGE_FORWARD_TOTAL).increment(1);
                if !connection.send_text(Arc::new(payload)) {
                    debug!(conn_id = %connection.id, "forward failed, stopping listener");
                    return ListenerOutcome::ForwardFailed;
                }
            }
            () = cancel.cancelled() => {
                debug!(conn_id = %connection.id, "listener cancelled");
                return ListenerOutcome::Cancelled;
            }
        }
    }
}
