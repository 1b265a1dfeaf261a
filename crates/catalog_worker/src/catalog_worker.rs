use crate::consumers::{
    ChangeConsumerService, PlayerConsumerService, PriceConsumerService, ProductConsumerService,
};
use crate::domain::{
    ChangeService, PlayerService, PriceService, PriceServiceConfig, ProductService, SideChannels,
    UpdateQueues, UpdateRequestProducer,
};
use common::broker::BrokerConnection;
use common::domain::{
    ChangeRepository, InFlightTracker, LiveUpdatePublisher, PlayerRepository,
    PriceChangeRepository, ProductKind, ProductNotifier, ProductRepository,
};
use common::queue::{
    DelayQueueDefinition, QueueDefinition, QueueRegistry, QueueRuntime, ReconnectPolicy,
    RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Queues consumed by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedQueues {
    pub changes: String,
    pub app_info: String,
    pub package_info: String,
    pub prices: String,
    pub profiles: String,
    pub delay: String,
}

pub struct CatalogWorkerConfig {
    pub consumed: ConsumedQueues,
    /// Outgoing refresh requests; consumed by the upstream fetcher
    pub requests: UpdateQueues,
    pub consumer_prefix: String,
    pub batch_size: usize,
    pub batch_wait: Duration,
    pub retry: RetryPolicy,
    pub delay_slice: Duration,
    pub reconnect: ReconnectPolicy,
    pub prices: PriceServiceConfig,
    /// Queue a refresh request for every product named in the change feed
    pub request_refreshes: bool,
}

pub struct CatalogWorkerDependencies {
    pub broker: Arc<dyn BrokerConnection>,
    pub product_repository: Arc<dyn ProductRepository>,
    pub change_repository: Arc<dyn ChangeRepository>,
    pub price_change_repository: Arc<dyn PriceChangeRepository>,
    pub player_repository: Arc<dyn PlayerRepository>,
    pub in_flight: Arc<dyn InFlightTracker>,
    pub live_updates: Arc<dyn LiveUpdatePublisher>,
    pub notifier: Option<Arc<dyn ProductNotifier>>,
}

pub struct CatalogWorker {
    runtime: QueueRuntime,
}

impl CatalogWorker {
    pub async fn new(
        deps: CatalogWorkerDependencies,
        config: CatalogWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!("Initializing catalog worker");

        let side_channels = SideChannels::new(deps.live_updates, deps.notifier);

        let producer = Arc::new(UpdateRequestProducer::new(
            deps.broker.clone(),
            deps.in_flight,
            config.requests.clone(),
        ));
        producer.declare_queues().await?;

        let change_service = Arc::new(ChangeService::new(
            deps.product_repository.clone(),
            deps.change_repository,
            side_channels.clone(),
            config.request_refreshes.then(|| producer.clone()),
        ));
        let product_service = Arc::new(ProductService::new(
            deps.product_repository.clone(),
            side_channels.clone(),
        ));
        let price_service = Arc::new(PriceService::new(
            deps.product_repository,
            deps.price_change_repository,
            side_channels.clone(),
            config.prices.clone(),
        ));
        let player_service = Arc::new(PlayerService::new(deps.player_repository, side_channels));

        let definition = |name: &str| {
            QueueDefinition::new(name)
                .with_consumer_name(format!("{}-{}", config.consumer_prefix, name))
                .with_batch(config.batch_size, config.batch_wait)
                .with_retry(config.retry)
        };

        let mut delay = DelayQueueDefinition::new(&config.consumed.delay, config.delay_slice);
        delay.queue = definition(&config.consumed.delay);

        let mut registry = QueueRegistry::new(delay);
        registry.register_queue(
            definition(&config.consumed.changes),
            ChangeConsumerService::new(change_service),
        )?;
        registry.register_queue(
            definition(&config.consumed.app_info),
            ProductConsumerService::new(ProductKind::App, product_service.clone()),
        )?;
        registry.register_queue(
            definition(&config.consumed.package_info),
            ProductConsumerService::new(ProductKind::Package, product_service),
        )?;
        registry.register_queue(
            definition(&config.consumed.prices),
            PriceConsumerService::new(price_service),
        )?;
        registry.register_queue(
            definition(&config.consumed.profiles),
            PlayerConsumerService::new(player_service),
        )?;

        info!(queues = ?registry.queue_names(), "Catalog worker initialized");

        Ok(Self {
            runtime: QueueRuntime::new(deps.broker, registry, config.reconnect),
        })
    }

    pub fn into_runner_processes(
        self,
    ) -> Vec<
        Box<
            dyn FnOnce(
                    CancellationToken,
                ) -> std::pin::Pin<
                    Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
                > + Send,
        >,
    > {
        vec![Box::new({
            let runtime = self.runtime;
            move |ctx| Box::pin(async move { runtime.run(ctx).await })
        })]
    }
}
