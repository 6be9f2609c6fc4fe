//! In-process broker over tokio broadcast channels.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::{Broker, BrokerError, Subscription};

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Broker for single-process deployments and tests.
///
/// Each channel is a broadcast fan-out; publishing to a channel with no
/// subscribers is a silent no-op, matching the network broker.
pub struct MemoryBroker {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl MemoryBroker {
    /// Broker with the default per-channel buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Broker with an explicit per-channel buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn close(&self) {
        self.channels.lock().clear();
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        // send() errors only when there are no receivers, which is fine.
        let _ = self.sender(channel).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let rx = self.sender(channel).subscribe();
        let channel = channel.to_string();
        let stream = BroadcastStream::new(rx).filter_map(move |item| {
            futures::future::ready(match item {
                Ok(payload) => Some(payload),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(channel = %channel, skipped, "memory broker subscriber lagged");
                    None
                }
            })
        });
        Ok(Subscription::new(stream))
    }
}
