mod config;

use catalog_runner::Runner;
use catalog_worker::catalog_worker::{
    CatalogWorker, CatalogWorkerConfig, CatalogWorkerDependencies, ConsumedQueues,
};
use catalog_worker::domain::{PriceServiceConfig, UpdateQueues};
use catalog_worker::notify::WebhookNotifier;
use common::clickhouse::{
    ClickHouseChangeRepository, ClickHouseClient, ClickHousePriceChangeRepository,
};
use common::domain::ProductNotifier;
use common::nats::{NatsBroker, NatsClient, NatsInFlightTracker, NatsLiveUpdatePublisher};
use common::postgres::{
    PostgresClient, PostgresConfig, PostgresPlayerRepository, PostgresProductRepository,
};
use common::queue::{ReconnectPolicy, RetryPolicy};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use config::ServiceConfig;
use goose::{Driver, MigrationRunner};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting catalog-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let shared = match initialize_shared_dependencies(&config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("Failed to initialize shared dependencies: {}", e);
            std::process::exit(1);
        }
    };

    let dependencies = match build_worker_dependencies(&config, &shared).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("Failed to initialize worker dependencies: {}", e);
            std::process::exit(1);
        }
    };

    let catalog_worker = match CatalogWorker::new(dependencies, build_worker_config(&config)).await
    {
        Ok(worker) => worker,
        Err(e) => {
            error!("Failed to initialize catalog worker: {}", e);
            std::process::exit(1);
        }
    };

    let mut runner = Runner::new();
    for (i, process) in catalog_worker.into_runner_processes().into_iter().enumerate() {
        runner = runner.with_boxed_process(format!("catalog_worker_{}", i), process);
    }

    runner = runner
        .with_closer({
            let nats_for_close = Arc::clone(&shared.nats);
            move || {
                Box::pin(async move {
                    info!("Running cleanup tasks...");
                    if let Err(e) = nats_for_close.close().await {
                        error!(error = %e, "failed to close NATS connection");
                    }

                    // Flushes pending traces and logs
                    shutdown_telemetry(telemetry_providers);

                    info!("Cleanup complete");
                    Ok(())
                })
            }
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

struct SharedDependencies {
    postgres: PostgresClient,
    clickhouse: ClickHouseClient,
    nats: Arc<NatsClient>,
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
) -> anyhow::Result<SharedDependencies> {
    info!("Initializing PostgreSQL...");
    let postgres_config = postgres_config(config);
    run_postgres_migrations(config, &postgres_config).await?;
    let postgres = PostgresClient::new(&postgres_config)?;
    postgres.ping().await?;

    info!("Initializing ClickHouse...");
    run_clickhouse_migrations(config).await?;
    let clickhouse = create_clickhouse_client(config).await?;

    info!("Initializing NATS...");
    let nats = Arc::new(
        NatsClient::connect(
            &config.nats_url,
            Duration::from_secs(config.startup_timeout_secs),
        )
        .await?,
    );

    Ok(SharedDependencies {
        postgres,
        clickhouse,
        nats,
    })
}

fn postgres_config(config: &ServiceConfig) -> PostgresConfig {
    PostgresConfig {
        host: config.postgres_host.clone(),
        port: config.postgres_port,
        database: config.postgres_database.clone(),
        username: config.postgres_username.clone(),
        password: config.postgres_password.clone(),
        max_pool_size: config.postgres_max_pool_size,
    }
}

async fn run_postgres_migrations(
    config: &ServiceConfig,
    postgres_config: &PostgresConfig,
) -> anyhow::Result<()> {
    let runner = MigrationRunner::new(
        config.postgres_goose_binary_path.clone(),
        config.postgres_migrations_dir.clone(),
        Driver::Postgres,
        postgres_config.dsn(),
    );
    runner.run_migrations().await
}

async fn run_clickhouse_migrations(config: &ServiceConfig) -> anyhow::Result<()> {
    let clickhouse_dsn = format!(
        "clickhouse://{}:{}@{}/{}",
        config.clickhouse_username,
        config.clickhouse_password,
        config.clickhouse_native_url,
        config.clickhouse_database
    );
    let runner = MigrationRunner::new(
        config.clickhouse_goose_binary_path.clone(),
        config.clickhouse_migrations_dir.clone(),
        Driver::Clickhouse,
        clickhouse_dsn,
    );
    runner.run_migrations().await
}

async fn create_clickhouse_client(config: &ServiceConfig) -> anyhow::Result<ClickHouseClient> {
    let client = ClickHouseClient::new(
        &config.clickhouse_url,
        &config.clickhouse_database,
        &config.clickhouse_username,
        &config.clickhouse_password,
    );
    client.ping().await?;
    Ok(client)
}

async fn build_worker_dependencies(
    config: &ServiceConfig,
    shared: &SharedDependencies,
) -> anyhow::Result<CatalogWorkerDependencies> {
    let jetstream = shared.nats.jetstream();

    let in_flight = NatsInFlightTracker::new(
        jetstream,
        &config.kv_bucket,
        Duration::from_secs(config.kv_ttl_secs),
    )
    .await?;

    let notifier: Option<Arc<dyn ProductNotifier>> = match &config.notification_webhook_url {
        Some(url) if !url.is_empty() => Some(Arc::new(WebhookNotifier::new(
            url.clone(),
            Duration::from_secs(config.notification_timeout_secs),
        )?)),
        _ => {
            info!("No notification webhook configured, went-free notices disabled");
            None
        }
    };

    Ok(CatalogWorkerDependencies {
        broker: Arc::new(NatsBroker::new(jetstream.clone())),
        product_repository: Arc::new(PostgresProductRepository::new(shared.postgres.clone())),
        change_repository: Arc::new(ClickHouseChangeRepository::new(
            shared.clickhouse.clone(),
            config.clickhouse_changes_table.clone(),
        )),
        price_change_repository: Arc::new(ClickHousePriceChangeRepository::new(
            shared.clickhouse.clone(),
            config.clickhouse_price_changes_table.clone(),
        )),
        player_repository: Arc::new(PostgresPlayerRepository::new(shared.postgres.clone())),
        in_flight: Arc::new(in_flight),
        live_updates: Arc::new(NatsLiveUpdatePublisher::new(
            shared.nats.client().clone(),
            config.live_update_prefix.clone(),
        )),
        notifier,
    })
}

fn build_worker_config(config: &ServiceConfig) -> CatalogWorkerConfig {
    CatalogWorkerConfig {
        consumed: ConsumedQueues {
            changes: config.changes_queue.clone(),
            app_info: config.app_info_queue.clone(),
            package_info: config.package_info_queue.clone(),
            prices: config.prices_queue.clone(),
            profiles: config.profiles_queue.clone(),
            delay: config.delay_queue.clone(),
        },
        requests: UpdateQueues {
            apps: config.app_requests_queue.clone(),
            packages: config.package_requests_queue.clone(),
            players: config.player_requests_queue.clone(),
            groups: config.group_requests_queue.clone(),
        },
        consumer_prefix: config.consumer_prefix.clone(),
        batch_size: config.batch_size,
        batch_wait: Duration::from_millis(config.batch_wait_ms),
        retry: RetryPolicy {
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_secs(config.retry_max_delay_secs),
            max_attempts: config.retry_max_attempts,
            max_age: Duration::from_secs(config.retry_max_age_secs),
        },
        delay_slice: Duration::from_millis(config.delay_slice_ms),
        reconnect: ReconnectPolicy {
            initial_delay: Duration::from_millis(config.reconnect_initial_ms),
            max_delay: Duration::from_secs(config.reconnect_max_secs),
        },
        prices: PriceServiceConfig {
            reference_currency: config.reference_currency.trim().to_uppercase(),
            supported_currencies: config.supported_currency_list(),
        },
        request_refreshes: config.request_refreshes,
    }
}
