use anyhow::{Context, Result};
use async_nats::jetstream;
use std::time::Duration;
use tracing::info;

/// Core NATS connection plus its JetStream context.
#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    /// Connects, retrying in the background while the server is unreachable.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis() as u64, "connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .retry_on_initial_connect()
            .event_callback(|event| async move {
                info!(event = %event, "NATS connection event");
            })
            .connect(url)
            .await
            .context("failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        info!("connected to NATS");
        Ok(Self { client, jetstream })
    }

    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Flushes pending publishes; the connection closes once every clone is dropped.
    pub async fn close(&self) -> Result<()> {
        info!("closing NATS connection");
        self.client
            .flush()
            .await
            .context("failed to flush NATS connection")
    }
}
