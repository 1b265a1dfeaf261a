use common::broker::{BrokerConnection, Envelope};
use common::domain::{DomainError, DomainResult, InFlightTracker, UpdateKind, UpdateRequest};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProduceOutcome {
    Queued,
    /// An identical request is still pending; not an error.
    AlreadyQueued,
}

/// Queue names for each kind of update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateQueues {
    pub apps: String,
    pub packages: String,
    pub players: String,
    pub groups: String,
}

impl UpdateQueues {
    pub fn queue_for(&self, kind: UpdateKind) -> &str {
        match kind {
            UpdateKind::App => &self.apps,
            UpdateKind::Package => &self.packages,
            UpdateKind::Player => &self.players,
            UpdateKind::Group => &self.groups,
        }
    }

    fn all(&self) -> [&str; 4] {
        [&self.apps, &self.packages, &self.players, &self.groups]
    }
}

pub struct UpdateRequestProducer {
    broker: Arc<dyn BrokerConnection>,
    in_flight: Arc<dyn InFlightTracker>,
    queues: UpdateQueues,
}

impl UpdateRequestProducer {
    pub fn new(
        broker: Arc<dyn BrokerConnection>,
        in_flight: Arc<dyn InFlightTracker>,
        queues: UpdateQueues,
    ) -> Self {
        Self {
            broker,
            in_flight,
            queues,
        }
    }

    /// Declares every target queue, including those no local handler consumes.
    pub async fn declare_queues(&self) -> anyhow::Result<()> {
        for queue in self.queues.all() {
            self.broker.declare_queue(queue).await?;
        }
        Ok(())
    }

    /// Requests from the change feed skip deduplication; everything else is
    /// queued at most once per in-flight window.
    #[instrument(skip(self), fields(kind = request.kind.as_str(), id = request.id))]
    pub async fn produce(&self, request: UpdateRequest) -> DomainResult<ProduceOutcome> {
        request.validate()?;

        let dedup_key = match request.change_number {
            Some(_) => None,
            None => {
                let key = request.dedup_key();
                if self.in_flight.check_and_mark_in_flight(&key).await? {
                    debug!("update request already queued");
                    return Ok(ProduceOutcome::AlreadyQueued);
                }
                Some(key)
            }
        };

        let result = self.publish(&request).await;
        if let (Err(_), Some(key)) = (&result, &dedup_key) {
            // The mark must not outlive a request that never reached the queue.
            if let Err(e) = self.in_flight.release(key).await {
                warn!(error = %e, key = %key, "failed to release in-flight mark");
            }
        }
        result
    }

    async fn publish(&self, request: &UpdateRequest) -> DomainResult<ProduceOutcome> {
        let queue = self.queues.queue_for(request.kind);
        let body = Envelope::wrap(queue, request)
            .and_then(|envelope| envelope.encode())
            .map_err(|e| DomainError::InvalidUpdateRequest(e.to_string()))?;

        self.broker
            .publish(queue, body)
            .await
            .map_err(|e| DomainError::PublishError(format!("{queue}: {e:#}")))?;

        debug!(queue = %queue, "update request queued");
        Ok(ProduceOutcome::Queued)
    }
}
