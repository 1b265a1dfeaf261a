use crate::domain::InFlightTracker;
use anyhow::{Context, Result};
use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info};

/// Marks keys in a KV bucket whose entries expire after the bucket's max age,
/// so a request that was queued but never processed can be queued again later.
pub struct NatsInFlightTracker {
    store: kv::Store,
}

impl NatsInFlightTracker {
    pub async fn new(jetstream: &jetstream::Context, bucket: &str, ttl: Duration) -> Result<Self> {
        let store = match jetstream.get_key_value(bucket).await {
            Ok(store) => store,
            Err(_) => {
                info!(bucket = %bucket, ttl_secs = ttl.as_secs(), "creating in-flight bucket");
                jetstream
                    .create_key_value(kv::Config {
                        bucket: bucket.to_string(),
                        description: "in-flight update requests".to_string(),
                        max_age: ttl,
                        history: 1,
                        ..Default::default()
                    })
                    .await
                    .with_context(|| format!("failed to create KV bucket {bucket}"))?
            }
        };

        Ok(Self { store })
    }
}

#[async_trait]
impl InFlightTracker for NatsInFlightTracker {
    async fn check_and_mark_in_flight(&self, key: &str) -> Result<bool> {
        match self.store.create(key, Bytes::from_static(b"1")).await {
            Ok(_) => Ok(false),
            Err(e) if e.kind() == kv::CreateErrorKind::AlreadyExists => {
                debug!(key = %key, "already in flight");
                Ok(true)
            }
            Err(e) => Err(e).with_context(|| format!("failed to mark {key} in flight")),
        }
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.store
            .delete(key)
            .await
            .with_context(|| format!("failed to release {key}"))?;
        debug!(key = %key, "released in-flight mark");
        Ok(())
    }
}
