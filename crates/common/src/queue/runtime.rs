use crate::broker::{BrokerConnection, Delivery, Envelope, QueueSubscription};
use crate::queue::{
    ConsumeRequest, DelayRetrier, HandlerOutcome, QueueHandler, QueueRegistry, ReconnectPolicy,
};
use anyhow::{Context, Result};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

/// Runs one consumer loop per registered queue plus the delay queue loop.
pub struct QueueRuntime {
    broker: Arc<dyn BrokerConnection>,
    registry: QueueRegistry,
    reconnect: ReconnectPolicy,
}

impl QueueRuntime {
    pub fn new(
        broker: Arc<dyn BrokerConnection>,
        registry: QueueRegistry,
        reconnect: ReconnectPolicy,
    ) -> Self {
        Self {
            broker,
            registry,
            reconnect,
        }
    }

    /// Consumes until `ctx` is cancelled. Individual queue loops survive
    /// broker failures by re-subscribing, so this only returns on shutdown.
    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        let QueueRuntime {
            broker,
            registry,
            reconnect,
        } = self;

        let retrier = Arc::new(DelayRetrier::new(
            broker.clone(),
            registry.delay.queue.name.clone(),
            registry.retry_policies(),
            registry.delay.queue.retry,
        ));

        // Declared up front so a retry never publishes into a missing queue.
        let names = registry
            .queue_names()
            .into_iter()
            .chain(std::iter::once(registry.delay.queue.name.as_str()))
            .map(str::to_string)
            .collect::<Vec<_>>();
        for name in &names {
            if let Err(e) = broker.declare_queue(name).await {
                warn!(queue = %name, error = %e, "failed to declare queue, loop will retry");
            }
        }

        let mut tasks = JoinSet::new();
        for queue in registry.queues {
            let worker = QueueWorker {
                broker: broker.clone(),
                queue: queue.definition.name,
                consumer_name: queue.definition.consumer_name,
                batch_size: queue.definition.batch_size,
                batch_wait: queue.definition.batch_wait,
                processor: Processor::Handler(queue.handler),
                retrier: retrier.clone(),
                reconnect,
            };
            tasks.spawn(worker.run(ctx.clone()));
        }

        let delay = registry.delay;
        let worker = QueueWorker {
            broker: broker.clone(),
            queue: delay.queue.name,
            consumer_name: delay.queue.consumer_name,
            batch_size: delay.queue.batch_size,
            batch_wait: delay.queue.batch_wait,
            processor: Processor::Delay { slice: delay.slice },
            retrier,
            reconnect,
        };
        tasks.spawn(worker.run(ctx.clone()));

        info!(queues = ?names, "queue runtime started");

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "queue loop terminated abnormally");
            }
        }

        info!("queue runtime stopped");
        Ok(())
    }
}

enum Processor {
    Handler(QueueHandler),
    Delay { slice: Duration },
}

/// Methods take `&mut self`: the boxed handler is `Send` but not `Sync`.
struct QueueWorker {
    broker: Arc<dyn BrokerConnection>,
    queue: String,
    consumer_name: String,
    batch_size: usize,
    batch_wait: Duration,
    processor: Processor,
    retrier: Arc<DelayRetrier>,
    reconnect: ReconnectPolicy,
}

impl QueueWorker {
    async fn run(mut self, ctx: CancellationToken) {
        let mut failures = 0u32;

        while !ctx.is_cancelled() {
            match self.subscribe().await {
                Ok(subscription) => {
                    match self.consume(subscription.as_ref(), &ctx, &mut failures).await {
                        Ok(()) => break,
                        Err(e) => {
                            failures = failures.saturating_add(1);
                            warn!(queue = %self.queue, error = %e, "subscription lost");
                        }
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(queue = %self.queue, error = %e, failures, "failed to subscribe");
                }
            }

            let delay = self.reconnect.delay_for(failures);
            debug!(queue = %self.queue, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(queue = %self.queue, "queue loop stopped");
    }

    async fn subscribe(&mut self) -> Result<Box<dyn QueueSubscription>> {
        self.broker
            .declare_queue(&self.queue)
            .await
            .with_context(|| format!("failed to declare queue {}", self.queue))?;
        self.broker
            .subscribe(&self.queue, &self.consumer_name)
            .await
            .with_context(|| format!("failed to subscribe to queue {}", self.queue))
    }

    /// Returns `Ok` on shutdown and `Err` when the subscription must be rebuilt.
    async fn consume(
        &mut self,
        subscription: &dyn QueueSubscription,
        ctx: &CancellationToken,
        failures: &mut u32,
    ) -> Result<()> {
        info!(queue = %self.queue, consumer = %self.consumer_name, "consuming");

        loop {
            let deliveries = tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                fetched = subscription.fetch(self.batch_size, self.batch_wait) => fetched?,
            };
            *failures = 0;

            let mut pending = deliveries.into_iter();
            while let Some(delivery) = pending.next() {
                if ctx.is_cancelled() {
                    release(std::iter::once(delivery).chain(pending)).await;
                    return Ok(());
                }
                self.process(delivery).await;
            }
        }
    }

    async fn process(&mut self, delivery: Delivery) {
        match self.processor {
            Processor::Handler(ref handler) => {
                let handler = handler.clone();
                self.handle(handler, delivery).await;
            }
            Processor::Delay { slice } => self.pass_delayed(slice, delivery).await,
        }
    }

    async fn handle(&mut self, handler: QueueHandler, delivery: Delivery) {
        let Some(envelope) = self.decode(&delivery).await else {
            return;
        };

        let request = ConsumeRequest::new(
            self.queue.clone(),
            envelope.clone(),
            delivery.headers.clone(),
        );
        let outcome = match AssertUnwindSafe(handler.oneshot(request))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => HandlerOutcome::TransientFailure(format!("{e:#}")),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(queue = %self.queue, panic = %message, "handler panicked");
                HandlerOutcome::TransientFailure(message)
            }
        };

        match outcome {
            HandlerOutcome::Success => settle(&delivery, true).await,
            HandlerOutcome::Abandon(_) => settle(&delivery, true).await,
            HandlerOutcome::TransientFailure(_) => match self.retrier.retry(envelope).await {
                Ok(disposition) => {
                    debug!(queue = %self.queue, ?disposition, "retry scheduled");
                    settle(&delivery, true).await;
                }
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "failed to schedule retry");
                    settle(&delivery, false).await;
                }
            },
        }
    }

    async fn pass_delayed(&mut self, slice: Duration, delivery: Delivery) {
        tokio::time::sleep(slice).await;

        let Some(envelope) = self.decode(&delivery).await else {
            return;
        };

        match self.retrier.pass(envelope).await {
            Ok(_) => settle(&delivery, true).await,
            Err(e) => {
                error!(queue = %self.queue, error = %e, "failed to route delayed envelope");
                settle(&delivery, false).await;
            }
        }
    }

    /// Malformed bodies are acknowledged so they are never redelivered.
    async fn decode(&mut self, delivery: &Delivery) -> Option<Envelope> {
        match Envelope::decode(&delivery.body) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                error!(queue = %self.queue, error = %e, "dropping malformed envelope");
                settle(delivery, true).await;
                None
            }
        }
    }
}

async fn settle(delivery: &Delivery, ack: bool) {
    let result = if ack {
        delivery.ack().await
    } else {
        delivery.nak().await
    };
    if let Err(e) = result {
        warn!(queue = %delivery.queue, ack, error = %e, "failed to settle delivery");
    }
}

/// Fetched but unprocessed deliveries go back to the broker on shutdown.
async fn release(deliveries: impl Iterator<Item = Delivery>) {
    for delivery in deliveries {
        settle(&delivery, false).await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}
