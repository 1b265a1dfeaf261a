use crate::broker::{BrokerConnection, Delivery, DeliveryAcker, QueueSubscription};
use crate::nats::inject_trace_context;
use anyhow::{anyhow, Context, Result};
use async_nats::jetstream::{self, consumer, stream};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, error, instrument};

/// JetStream-backed broker: one work-queue stream per queue, with a single
/// subject named after the queue, consumed by durable pull consumers.
#[derive(Clone)]
pub struct NatsBroker {
    jetstream: jetstream::Context,
}

impl NatsBroker {
    pub fn new(jetstream: jetstream::Context) -> Self {
        Self { jetstream }
    }
}

fn stream_config(queue: &str) -> stream::Config {
    stream::Config {
        name: queue.to_string(),
        subjects: vec![queue.to_string()],
        description: Some(format!("work queue {queue}")),
        retention: stream::RetentionPolicy::WorkQueue,
        storage: stream::StorageType::File,
        ..Default::default()
    }
}

#[async_trait]
impl BrokerConnection for NatsBroker {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        self.jetstream
            .get_or_create_stream(stream_config(queue))
            .await
            .with_context(|| format!("failed to declare stream {queue}"))?;
        debug!(queue = %queue, "stream declared");
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        consumer_name: &str,
    ) -> Result<Box<dyn QueueSubscription>> {
        let stream = self
            .jetstream
            .get_stream(queue)
            .await
            .with_context(|| format!("failed to get stream {queue}"))?;

        let consumer: consumer::PullConsumer = stream
            .get_or_create_consumer(
                consumer_name,
                consumer::pull::Config {
                    durable_name: Some(consumer_name.to_string()),
                    ack_policy: consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("failed to create consumer {consumer_name} on {queue}"))?;

        debug!(queue = %queue, consumer = %consumer_name, "durable consumer ready");

        Ok(Box::new(NatsQueueSubscription {
            queue: queue.to_string(),
            consumer,
        }))
    }

    #[instrument(skip(self, body), fields(queue = %queue, payload_size = body.len()))]
    async fn publish(&self, queue: &str, body: Bytes) -> Result<()> {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);

        let ack = self
            .jetstream
            .publish_with_headers(queue.to_string(), headers, body)
            .await
            .with_context(|| format!("failed to publish to {queue}"))?;

        ack.await
            .with_context(|| format!("failed to receive JetStream ack from {queue}"))?;
        Ok(())
    }
}

pub struct NatsQueueSubscription {
    queue: String,
    consumer: consumer::PullConsumer,
}

#[async_trait]
impl QueueSubscription for NatsQueueSubscription {
    async fn fetch(&self, max_messages: usize, expires: Duration) -> Result<Vec<Delivery>> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(max_messages)
            .expires(expires)
            .messages()
            .await
            .with_context(|| format!("failed to fetch from {}", self.queue))?;

        let mut deliveries = Vec::new();
        while let Some(message) = messages.next().await {
            match message {
                Ok(message) => {
                    let body = message.payload.clone();
                    let headers = message.headers.clone();
                    deliveries.push(Delivery::new(
                        self.queue.clone(),
                        body,
                        headers,
                        Box::new(NatsDeliveryAcker { message }),
                    ));
                }
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "error receiving message");
                }
            }
        }

        Ok(deliveries)
    }
}

struct NatsDeliveryAcker {
    message: jetstream::Message,
}

#[async_trait]
impl DeliveryAcker for NatsDeliveryAcker {
    async fn ack(&self) -> Result<()> {
        self.message
            .ack()
            .await
            .map_err(|e| anyhow!("failed to acknowledge message: {e}"))
    }

    async fn nak(&self) -> Result<()> {
        self.message
            .ack_with(jetstream::AckKind::Nak(None))
            .await
            .map_err(|e| anyhow!("failed to reject message: {e}"))
    }
}
