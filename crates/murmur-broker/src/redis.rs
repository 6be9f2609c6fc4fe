//! Redis-backed broker.

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{Broker, BrokerError, Subscription};

/// Broker backed by Redis pub/sub.
///
/// The publish side goes through one lazily-built [`ConnectionManager`]
/// shared by every caller; it reconnects on its own after transient
/// failures. Each subscription opens a dedicated pub/sub connection, so
/// tearing one down never disturbs the others. A connection in
/// subscriber mode cannot multiplex commands, hence the split.
pub struct RedisBroker {
    url: String,
    manager: Mutex<Option<ConnectionManager>>,
}

impl RedisBroker {
    /// Broker for the given `redis://` URL. No connection is made until
    /// first use.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            manager: Mutex::new(None),
        }
    }

    async fn manager(&self) -> Result<ConnectionManager, BrokerError> {
        let mut guard = self.manager.lock().await;
        if let Some(manager) = guard.as_ref() {
            return Ok(manager.clone());
        }
        let client = Client::open(self.url.as_str())
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        debug!(url = %self.url, "redis connection established");
        *guard = Some(manager.clone());
        Ok(manager)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        let _ = self.manager().await?;
        Ok(())
    }

    async fn close(&self) {
        if self.manager.lock().await.take().is_some() {
            debug!(url = %self.url, "redis connection released");
        }
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        let mut conn = self.manager().await?;
        let () = conn
            .publish(channel, payload)
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let client = Client::open(self.url.as_str())
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;
        debug!(channel, "redis subscription opened");
        let stream = pubsub.into_on_message().filter_map(|msg| {
            futures::future::ready(match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(error = %e, "dropping non-UTF8 pub/sub payload");
                    None
                }
            })
        });
        Ok(Subscription::new(stream))
    }
}
