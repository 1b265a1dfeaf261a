use crate::broker::{BrokerConnection, Delivery, DeliveryAcker, QueueSubscription};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// Process-local broker with work-queue semantics, for tests.
///
/// Messages are either ready or in flight; a nak puts an in-flight message back at
/// the end of its queue.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, QueueState>,
    consumers: HashSet<(String, String)>,
    next_id: u64,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<(u64, Bytes)>,
    in_flight: HashMap<u64, Bytes>,
    published: usize,
    acked: usize,
    naked: usize,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ready plus in-flight messages.
    pub fn depth(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.ready.len() + q.in_flight.len())
    }

    pub fn published_count(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.published)
    }

    pub fn acked_count(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.acked)
    }

    pub fn naked_count(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.naked)
    }

    /// Distinct durable consumers registered on a queue.
    pub fn consumer_count(&self, queue: &str) -> usize {
        self.lock()
            .consumers
            .iter()
            .filter(|(q, _)| q == queue)
            .count()
    }

    fn with_queue<T: Default>(&self, queue: &str, f: impl FnOnce(&QueueState) -> T) -> T {
        self.lock().queues.get(queue).map(f).unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test thread panicked mid-update.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BrokerConnection for InMemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        self.lock().queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        consumer_name: &str,
    ) -> Result<Box<dyn QueueSubscription>> {
        let mut state = self.lock();
        if !state.queues.contains_key(queue) {
            return Err(anyhow!("queue {queue} is not declared"));
        }
        state
            .consumers
            .insert((queue.to_string(), consumer_name.to_string()));

        Ok(Box::new(InMemorySubscription {
            broker: self.clone(),
            queue: queue.to_string(),
        }))
    }

    async fn publish(&self, queue: &str, body: Bytes) -> Result<()> {
        {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            let queue_state = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| anyhow!("queue {queue} is not declared"))?;
            queue_state.ready.push_back((id, body));
            queue_state.published += 1;
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

struct InMemorySubscription {
    broker: InMemoryBroker,
    queue: String,
}

impl InMemorySubscription {
    fn take_ready(&self, max_messages: usize) -> Vec<Delivery> {
        let mut state = self.broker.lock();
        let Some(queue_state) = state.queues.get_mut(&self.queue) else {
            return Vec::new();
        };

        let mut deliveries = Vec::new();
        while deliveries.len() < max_messages {
            let Some((id, body)) = queue_state.ready.pop_front() else {
                break;
            };
            queue_state.in_flight.insert(id, body.clone());
            deliveries.push(Delivery::new(
                self.queue.clone(),
                body,
                None,
                Box::new(InMemoryAcker {
                    broker: self.broker.clone(),
                    queue: self.queue.clone(),
                    id,
                }),
            ));
        }
        deliveries
    }
}

#[async_trait]
impl QueueSubscription for InMemorySubscription {
    async fn fetch(&self, max_messages: usize, expires: Duration) -> Result<Vec<Delivery>> {
        let deadline = tokio::time::Instant::now() + expires;
        loop {
            // Registered before the check so a publish in between is not missed.
            let notified = self.broker.inner.notify.notified();

            let deliveries = self.take_ready(max_messages.max(1));
            if !deliveries.is_empty() {
                return Ok(deliveries);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }
}

struct InMemoryAcker {
    broker: InMemoryBroker,
    queue: String,
    id: u64,
}

#[async_trait]
impl DeliveryAcker for InMemoryAcker {
    async fn ack(&self) -> Result<()> {
        let mut state = self.broker.lock();
        if let Some(queue_state) = state.queues.get_mut(&self.queue) {
            if queue_state.in_flight.remove(&self.id).is_some() {
                queue_state.acked += 1;
            }
        }
        Ok(())
    }

    async fn nak(&self) -> Result<()> {
        {
            let mut state = self.broker.lock();
            if let Some(queue_state) = state.queues.get_mut(&self.queue) {
                if let Some(body) = queue_state.in_flight.remove(&self.id) {
                    queue_state.ready.push_back((self.id, body));
                    queue_state.naked += 1;
                }
            }
        }
        self.broker.inner.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_fetch_ack() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").await.unwrap();
        broker.publish("q", Bytes::from_static(b"one")).await.unwrap();

        let subscription = broker.subscribe("q", "c").await.unwrap();
        let deliveries = subscription
            .fetch(10, Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(deliveries.len(), 1);
        assert_eq!(broker.depth("q"), 1);
        deliveries[0].ack().await.unwrap();
        assert_eq!(broker.depth("q"), 0);
        assert_eq!(broker.acked_count("q"), 1);
    }

    #[tokio::test]
    async fn test_nak_requeues() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").await.unwrap();
        broker.publish("q", Bytes::from_static(b"one")).await.unwrap();

        let subscription = broker.subscribe("q", "c").await.unwrap();
        let first = subscription.fetch(1, Duration::from_millis(10)).await.unwrap();
        first[0].nak().await.unwrap();

        let again = subscription.fetch(1, Duration::from_millis(10)).await.unwrap();
        assert_eq!(again[0].body, Bytes::from_static(b"one"));
        assert_eq!(broker.naked_count("q"), 1);
    }

    #[tokio::test]
    async fn test_fetch_times_out_empty() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").await.unwrap();
        let subscription = broker.subscribe("q", "c").await.unwrap();

        let deliveries = subscription.fetch(5, Duration::from_millis(5)).await.unwrap();
        assert!(deliveries.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_wakes_on_publish() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").await.unwrap();
        let subscription = broker.subscribe("q", "c").await.unwrap();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish("q", Bytes::from_static(b"late")).await.unwrap();
        });

        let deliveries = subscription.fetch(1, Duration::from_secs(2)).await.unwrap();
        assert_eq!(deliveries.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_to_undeclared_queue_fails() {
        let broker = InMemoryBroker::new();
        assert!(broker.publish("missing", Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_resubscribe_does_not_duplicate_consumer() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").await.unwrap();
        broker.subscribe("q", "c").await.unwrap();
        broker.subscribe("q", "c").await.unwrap();
        assert_eq!(broker.consumer_count("q"), 1);
    }
}
