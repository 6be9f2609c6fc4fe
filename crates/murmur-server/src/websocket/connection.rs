//! Per-socket connection handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use murmur_core::GroupKey;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Frame queued for the writer task that owns the socket sink.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// Text payload, shared so fan-out never clones per recipient.
    Text(Arc<String>),
    /// Close the transport with the given code. Ends the writer.
    Close(u16),
}

/// One live client socket.
///
/// The session owns the receive side; the registry and the per-connection
/// tasks hold `Arc` references to this handle. All sends go through a
/// bounded channel drained by the writer task, so a stalled client can
/// never block a broadcast.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection id.
    pub id: Uuid,
    /// Address the socket was accepted from.
    pub client_ip: String,
    /// Group this connection joined.
    pub group: GroupKey,
    tx: mpsc::Sender<OutboundFrame>,
    connected_at: Instant,
    dropped_frames: AtomicU64,
}

impl ConnectionHandle {
    /// Handle for a freshly accepted socket.
    #[must_use]
    pub fn new(client_ip: String, group: GroupKey, tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            id: Uuid::now_v7(),
            client_ip,
            group,
            tx,
            connected_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Queue a text frame without blocking.
    ///
    /// Returns `false` when the queue is full or the writer is gone; the
    /// dropped-frame counter increments on failure.
    pub fn send_text(&self, payload: Arc<String>) -> bool {
        if self.tx.try_send(OutboundFrame::Text(payload)).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize `value` and queue it as a text frame.
    pub fn send_json<T: Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send_text(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Queue a close frame. Returns `false` when the writer is gone.
    pub fn close(&self, code: u16) -> bool {
        self.tx.try_send(OutboundFrame::Close(code)).is_ok()
    }

    /// Frames dropped because the queue was full or closed.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// How long this connection has been up.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
