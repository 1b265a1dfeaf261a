use crate::domain::LiveUpdatePublisher;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::instrument;

/// Core NATS publish on `<prefix>.<topic>`; no JetStream persistence.
pub struct NatsLiveUpdatePublisher {
    client: async_nats::Client,
    prefix: String,
}

impl NatsLiveUpdatePublisher {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    pub fn subject_for(&self, topic: &str) -> String {
        format!("{}.{}", self.prefix, topic)
    }
}

#[async_trait]
impl LiveUpdatePublisher for NatsLiveUpdatePublisher {
    #[instrument(skip(self, payload), fields(topic = %topic))]
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(&payload).context("failed to encode live update")?;
        self.client
            .publish(self.subject_for(topic), Bytes::from(body))
            .await
            .with_context(|| format!("failed to publish live update on {topic}"))
    }
}
