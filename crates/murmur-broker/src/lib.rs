//! Pub/sub transport behind the relay's cross-process fan-out.
//!
//! The server talks to a [`Broker`] trait object; [`RedisBroker`] backs
//! multi-process deployments and [`MemoryBroker`] backs single-process
//! runs and tests.

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use memory::MemoryBroker;
pub use redis::RedisBroker;

/// Errors from the pub/sub transport.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Could not reach or authenticate with the broker.
    #[error("broker connect failed: {0}")]
    Connect(String),

    /// A publish was attempted and the broker refused it.
    #[error("publish failed: {0}")]
    Publish(String),

    /// A subscription could not be established.
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

/// Cross-process publish/subscribe transport.
///
/// Implementations connect lazily: `connect` is idempotent and the
/// first publish or subscribe establishes the link when it has not been
/// called. Payloads are opaque strings; the broker never inspects them.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Establish the broker link. Safe to call more than once.
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Release broker resources. Safe to call without a prior connect.
    async fn close(&self);

    /// Publish `payload` to `channel`. Zero subscribers is not an error.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError>;

    /// Open a dedicated subscription to `channel`.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError>;
}

/// Stream of payloads for one channel.
///
/// Yields until the channel is torn down; dropping the subscription
/// releases the underlying broker resources.
pub struct Subscription {
    stream: BoxStream<'static, String>,
}

impl Subscription {
    /// Wrap a payload stream.
    pub fn new(stream: impl Stream<Item = String> + Send + 'static) -> Self {
        Self {
            stream: stream.boxed(),
        }
    }

    /// Wait for the next payload; `None` once the channel is gone.
    pub async fn next(&mut self) -> Option<String> {
        self.stream.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscription_drains_a_finite_stream() {
        let mut sub = Subscription::new(futures::stream::iter(vec![
            "a".to_string(),
            "b".to_string(),
        ]));
        assert_eq!(sub.next().await.as_deref(), Some("a"));
        assert_eq!(sub.next().await.as_deref(), Some("b"));
        assert_eq!(sub.next().await, None);
    }

    #[test]
    fn broker_error_display() {
        assert!(BrokerError::Connect("refused".into())
            .to_string()
            .contains("refused"));
        assert!(BrokerError::Publish("closed".into())
            .to_string()
            .contains("publish"));
    }
}
