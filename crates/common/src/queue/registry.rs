use crate::queue::{
    ConsumeLoggingLayer, ConsumeRequest, ConsumeTracingLayer, HandlerOutcome, RetryPolicy,
};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tower::util::BoxCloneService;
use tower::{Service, ServiceBuilder};

/// A queue handler after the runtime's middleware has been applied.
pub type QueueHandler = BoxCloneService<ConsumeRequest, HandlerOutcome, anyhow::Error>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("queue already registered: {0}")]
    DuplicateQueue(String),

    #[error("queue name is reserved for the delay queue: {0}")]
    ReservedQueue(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDefinition {
    pub name: String,
    /// Durable consumer name; stable across reconnects
    pub consumer_name: String,
    /// Deliveries fetched per round trip (prefetch)
    pub batch_size: usize,
    pub batch_wait: Duration,
    pub retry: RetryPolicy,
}

impl QueueDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            consumer_name: format!("{name}-consumer"),
            name,
            batch_size: 10,
            batch_wait: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_consumer_name(mut self, consumer_name: impl Into<String>) -> Self {
        self.consumer_name = consumer_name.into();
        self
    }

    pub fn with_batch(mut self, batch_size: usize, batch_wait: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_wait = batch_wait;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// The shared delay queue and its polling slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayQueueDefinition {
    pub queue: QueueDefinition,
    /// Sleep before each delivery is re-evaluated
    pub slice: Duration,
}

impl DelayQueueDefinition {
    pub fn new(name: impl Into<String>, slice: Duration) -> Self {
        Self {
            queue: QueueDefinition::new(name),
            slice,
        }
    }
}

pub(crate) struct RegisteredQueue {
    pub(crate) definition: QueueDefinition,
    pub(crate) handler: QueueHandler,
}

/// Explicit queue name → handler registry, built at startup and handed to
/// [`QueueRuntime`](crate::queue::QueueRuntime).
pub struct QueueRegistry {
    pub(crate) queues: Vec<RegisteredQueue>,
    pub(crate) delay: DelayQueueDefinition,
}

impl QueueRegistry {
    pub fn new(delay: DelayQueueDefinition) -> Self {
        Self {
            queues: Vec::new(),
            delay,
        }
    }

    /// Registers a handler; tracing and logging layers are applied here.
    pub fn register_queue<S>(
        &mut self,
        definition: QueueDefinition,
        handler: S,
    ) -> Result<(), RegistryError>
    where
        S: Service<ConsumeRequest, Response = HandlerOutcome, Error = anyhow::Error>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        if definition.name == self.delay.queue.name {
            return Err(RegistryError::ReservedQueue(definition.name));
        }
        if self.queues.iter().any(|q| q.definition.name == definition.name) {
            return Err(RegistryError::DuplicateQueue(definition.name));
        }

        let handler = ServiceBuilder::new()
            .layer(ConsumeTracingLayer::new())
            .layer(ConsumeLoggingLayer::new())
            .service(handler);

        self.queues.push(RegisteredQueue {
            definition,
            handler: BoxCloneService::new(handler),
        });
        Ok(())
    }

    pub fn queue_names(&self) -> Vec<&str> {
        self.queues
            .iter()
            .map(|q| q.definition.name.as_str())
            .collect()
    }

    pub fn delay_queue(&self) -> &DelayQueueDefinition {
        &self.delay
    }

    pub fn retry_policies(&self) -> HashMap<String, RetryPolicy> {
        self.queues
            .iter()
            .map(|q| (q.definition.name.clone(), q.definition.retry))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
