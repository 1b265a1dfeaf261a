use anyhow::Result;
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Connection to a durable-queue broker.
///
/// Each queue loop obtains its own subscription; subscribing twice with the same
/// consumer name must not create a second consumer.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Declares a durable queue. Idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<()>;

    /// Subscribes a named durable consumer with manual acknowledgement.
    async fn subscribe(&self, queue: &str, consumer_name: &str)
        -> Result<Box<dyn QueueSubscription>>;

    /// Publishes persistently; returns once the broker has stored the message.
    async fn publish(&self, queue: &str, body: Bytes) -> Result<()>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait QueueSubscription: Send + Sync {
    /// Fetches up to `max_messages`, waiting at most `expires` for the first one.
    ///
    /// An error means the subscription is no longer usable.
    async fn fetch(&self, max_messages: usize, expires: Duration) -> Result<Vec<Delivery>>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(&self) -> Result<()>;

    /// Negative acknowledgement: the broker redelivers the message.
    async fn nak(&self) -> Result<()>;
}

/// One message handed out by a subscription, owned until acked or nak'ed.
pub struct Delivery {
    pub queue: String,
    pub body: Bytes,
    pub headers: Option<HeaderMap>,
    acker: Box<dyn DeliveryAcker>,
}

impl Delivery {
    pub fn new(
        queue: impl Into<String>,
        body: Bytes,
        headers: Option<HeaderMap>,
        acker: Box<dyn DeliveryAcker>,
    ) -> Self {
        Self {
            queue: queue.into(),
            body,
            headers,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nak(&self) -> Result<()> {
        self.acker.nak().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("queue", &self.queue)
            .field("body_bytes", &self.body.len())
            .finish()
    }
}
