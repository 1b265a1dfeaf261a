use crate::broker::{BrokerConnection, Envelope};
use crate::queue::{Exhaustion, RetryDecision, RetryPolicy};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of routing an envelope through the delay/retry subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDisposition {
    Dropped(Exhaustion),
    Requeued { queue: String, attempt: u32 },
    Delayed { attempt: u32, until: DateTime<Utc> },
}

/// Publishes failed envelopes either back to their original queue or onto the
/// shared delay queue, using the original queue's [`RetryPolicy`].
pub struct DelayRetrier {
    broker: Arc<dyn BrokerConnection>,
    delay_queue: String,
    policies: HashMap<String, RetryPolicy>,
    default_policy: RetryPolicy,
}

impl DelayRetrier {
    pub fn new(
        broker: Arc<dyn BrokerConnection>,
        delay_queue: impl Into<String>,
        policies: HashMap<String, RetryPolicy>,
        default_policy: RetryPolicy,
    ) -> Self {
        Self {
            broker,
            delay_queue: delay_queue.into(),
            policies,
            default_policy,
        }
    }

    pub fn delay_queue(&self) -> &str {
        &self.delay_queue
    }

    pub fn policy_for(&self, queue: &str) -> RetryPolicy {
        self.policies
            .get(queue)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Called after a `TransientFailure`: bumps the attempt and reschedules.
    pub async fn retry(&self, envelope: Envelope) -> Result<RetryDisposition> {
        let policy = self.policy_for(&envelope.original_queue);
        let decision = policy.plan_retry(envelope, Utc::now());
        self.apply(decision).await
    }

    /// One pass of an envelope sitting in the delay queue.
    pub async fn pass(&self, envelope: Envelope) -> Result<RetryDisposition> {
        let policy = self.policy_for(&envelope.original_queue);
        let decision = policy.reevaluate(envelope, Utc::now());
        self.apply(decision).await
    }

    async fn apply(&self, decision: RetryDecision) -> Result<RetryDisposition> {
        match decision {
            RetryDecision::Drop(exhaustion) => {
                info!(reason = %exhaustion, "dropping envelope, retry bounds exceeded");
                Ok(RetryDisposition::Dropped(exhaustion))
            }
            RetryDecision::Requeue(envelope) => {
                let queue = envelope.original_queue.clone();
                let attempt = envelope.attempt;
                self.publish(&queue, &envelope).await?;
                debug!(queue = %queue, attempt, "envelope requeued");
                Ok(RetryDisposition::Requeued { queue, attempt })
            }
            RetryDecision::Delay(envelope) => {
                let attempt = envelope.attempt;
                let until = envelope.next_attempt_at.unwrap_or_else(Utc::now);
                self.publish(&self.delay_queue, &envelope).await?;
                debug!(
                    queue = %envelope.original_queue,
                    attempt,
                    next_attempt_at = %until,
                    "envelope delayed"
                );
                Ok(RetryDisposition::Delayed { attempt, until })
            }
        }
    }

    async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<()> {
        let body = envelope.encode().context("failed to encode envelope")?;
        self.broker
            .publish(queue, body)
            .await
            .with_context(|| format!("failed to publish envelope to {queue}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerConnection;
    use serde_json::json;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            max_attempts: 3,
            max_age: Duration::ZERO,
        }
    }

    fn retrier(broker: MockBrokerConnection) -> DelayRetrier {
        let mut policies = HashMap::new();
        policies.insert("catalog_apps".to_string(), policy());
        DelayRetrier::new(Arc::new(broker), "catalog_delay", policies, RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_retry_publishes_to_delay_queue() {
        let mut broker = MockBrokerConnection::new();
        broker
            .expect_publish()
            .withf(|queue: &str, _body: &bytes::Bytes| queue == "catalog_delay")
            .times(1)
            .returning(|_, body| {
                let envelope = Envelope::decode(&body).unwrap();
                assert_eq!(envelope.attempt, 2);
                assert!(envelope.next_attempt_at.is_some());
                Ok(())
            });

        let disposition = retrier(broker)
            .retry(Envelope::new("catalog_apps", json!({})))
            .await
            .unwrap();

        assert!(matches!(disposition, RetryDisposition::Delayed { attempt: 2, .. }));
    }

    #[tokio::test]
    async fn test_retry_drops_when_attempts_exhausted() {
        let mut broker = MockBrokerConnection::new();
        broker.expect_publish().never();

        let mut envelope = Envelope::new("catalog_apps", json!({}));
        envelope.attempt = 3;

        let disposition = retrier(broker).retry(envelope).await.unwrap();
        assert_eq!(
            disposition,
            RetryDisposition::Dropped(Exhaustion::Attempts {
                attempt: 4,
                max_attempts: 3
            })
        );
    }

    #[tokio::test]
    async fn test_pass_requeues_due_envelope_to_original_queue() {
        let mut broker = MockBrokerConnection::new();
        broker
            .expect_publish()
            .withf(|queue: &str, _body: &bytes::Bytes| queue == "catalog_apps")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut envelope = Envelope::new("catalog_apps", json!({}));
        envelope.attempt = 2;
        envelope.next_attempt_at = Some(Utc::now() - chrono::Duration::seconds(1));

        let disposition = retrier(broker).pass(envelope).await.unwrap();
        assert_eq!(
            disposition,
            RetryDisposition::Requeued {
                queue: "catalog_apps".to_string(),
                attempt: 2
            }
        );
    }

    #[tokio::test]
    async fn test_pass_loops_pending_envelope_back_to_delay_queue() {
        let mut broker = MockBrokerConnection::new();
        broker
            .expect_publish()
            .withf(|queue: &str, _body: &bytes::Bytes| queue == "catalog_delay")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut envelope = Envelope::new("catalog_apps", json!({}));
        envelope.attempt = 2;
        envelope.next_attempt_at = Some(Utc::now() + chrono::Duration::seconds(30));

        let disposition = retrier(broker).pass(envelope).await.unwrap();
        assert!(matches!(disposition, RetryDisposition::Delayed { attempt: 2, .. }));
    }

    #[tokio::test]
    async fn test_publish_failure_is_returned() {
        let mut broker = MockBrokerConnection::new();
        broker
            .expect_publish()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("broker down")));

        let result = retrier(broker)
            .retry(Envelope::new("catalog_apps", json!({})))
            .await;

        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_queue_uses_default_policy() {
        let retrier = retrier(MockBrokerConnection::new());
        assert_eq!(retrier.policy_for("catalog_apps"), policy());
        assert_eq!(retrier.policy_for("elsewhere"), RetryPolicy::default());
    }
}
