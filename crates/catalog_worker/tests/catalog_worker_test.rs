use catalog_worker::{
    CatalogWorker, CatalogWorkerConfig, CatalogWorkerDependencies, ConsumedQueues,
    PriceServiceConfig, UpdateQueues,
};
use common::broker::{BrokerConnection, Envelope, InMemoryBroker};
use common::domain::{
    ChangeFeedMessage, ChangeNotice, ChangeRecord, MockChangeRepository, MockInFlightTracker,
    MockLiveUpdatePublisher, MockPlayerRepository, MockPriceChangeRepository,
    MockProductRepository, PlayerRecord, ProductSummary,
};
use common::queue::{ReconnectPolicy, RetryPolicy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn config() -> CatalogWorkerConfig {
    CatalogWorkerConfig {
        consumed: ConsumedQueues {
            changes: "catalog_changes".to_string(),
            app_info: "catalog_app_info".to_string(),
            package_info: "catalog_package_info".to_string(),
            prices: "catalog_prices".to_string(),
            profiles: "catalog_profiles".to_string(),
            delay: "catalog_delay".to_string(),
        },
        requests: UpdateQueues {
            apps: "catalog_app_requests".to_string(),
            packages: "catalog_package_requests".to_string(),
            players: "catalog_player_requests".to_string(),
            groups: "catalog_group_requests".to_string(),
        },
        consumer_prefix: "catalog-test".to_string(),
        batch_size: 5,
        batch_wait: Duration::from_millis(20),
        retry: RetryPolicy {
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(200),
            max_attempts: 3,
            max_age: Duration::ZERO,
        },
        delay_slice: Duration::from_millis(5),
        reconnect: ReconnectPolicy::default(),
        prices: PriceServiceConfig::default(),
        request_refreshes: true,
    }
}

fn dependencies(
    broker: &InMemoryBroker,
    changes: MockChangeRepository,
) -> CatalogWorkerDependencies {
    let mut products = MockProductRepository::new();
    products.expect_get_products_by_ids().returning(|input| {
        Ok(input
            .ids
            .iter()
            .map(|id| ProductSummary {
                id: *id,
                name: format!("app {id}"),
                ..Default::default()
            })
            .collect())
    });

    let mut in_flight = MockInFlightTracker::new();
    in_flight.expect_check_and_mark_in_flight().never();

    let mut live = MockLiveUpdatePublisher::new();
    live.expect_publish().returning(|_, _| Ok(()));

    CatalogWorkerDependencies {
        broker: Arc::new(broker.clone()),
        product_repository: Arc::new(products),
        change_repository: Arc::new(changes),
        price_change_repository: Arc::new(MockPriceChangeRepository::new()),
        player_repository: Arc::new(MockPlayerRepository::new()),
        in_flight: Arc::new(in_flight),
        live_updates: Arc::new(live),
        notifier: None,
    }
}

async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test]
async fn test_change_feed_is_stored_and_refreshes_requested() {
    let broker = InMemoryBroker::new();

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<ChangeRecord>>();
    let mut changes = MockChangeRepository::new();
    changes.expect_append_changes().returning(move |records| {
        let _ = tx.send(records);
        Ok(())
    });

    let worker = CatalogWorker::new(dependencies(&broker, changes), config())
        .await
        .unwrap();

    let message = ChangeFeedMessage {
        app_changes: vec![
            ChangeNotice {
                id: 10,
                change_number: 5,
            },
            ChangeNotice {
                id: 20,
                change_number: 5,
            },
        ],
        package_changes: vec![ChangeNotice {
            id: 30,
            change_number: 6,
        }],
    };
    broker.declare_queue("catalog_changes").await.unwrap();
    broker
        .publish(
            "catalog_changes",
            Envelope::wrap("catalog_changes", &message)
                .unwrap()
                .encode()
                .unwrap(),
        )
        .await
        .unwrap();

    let ctx = CancellationToken::new();
    for process in worker.into_runner_processes() {
        tokio::spawn(process(ctx.clone()));
    }

    let records = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].change_id, 5);
    assert_eq!(records[0].apps[0].name, "app 10");
    assert_eq!(records[1].packages[0].id, 30);

    assert!(
        wait_until(Duration::from_secs(2), || {
            broker.published_count("catalog_app_requests") == 2
                && broker.published_count("catalog_package_requests") == 1
        })
        .await
    );
    assert!(wait_until(Duration::from_secs(1), || broker.depth("catalog_changes") == 0).await);
    ctx.cancel();

    assert_eq!(broker.published_count("catalog_player_requests"), 0);
}

#[tokio::test]
async fn test_malformed_change_payload_is_dropped() {
    let broker = InMemoryBroker::new();

    let mut changes = MockChangeRepository::new();
    changes.expect_append_changes().never();

    let worker = CatalogWorker::new(dependencies(&broker, changes), config())
        .await
        .unwrap();

    broker.declare_queue("catalog_changes").await.unwrap();
    broker
        .publish(
            "catalog_changes",
            Envelope::new("catalog_changes", serde_json::json!({"app_changes": 12}))
                .encode()
                .unwrap(),
        )
        .await
        .unwrap();

    let ctx = CancellationToken::new();
    for process in worker.into_runner_processes() {
        tokio::spawn(process(ctx.clone()));
    }

    assert!(
        wait_until(Duration::from_secs(2), || {
            broker.acked_count("catalog_changes") == 1
        })
        .await
    );
    ctx.cancel();

    assert_eq!(broker.depth("catalog_changes"), 0);
    assert_eq!(broker.published_count("catalog_delay"), 0);
}

#[tokio::test]
async fn test_profiles_are_stored_and_group_profiles_dropped() {
    let broker = InMemoryBroker::new();

    let (tx, mut rx) = mpsc::unbounded_channel::<PlayerRecord>();
    let mut players = MockPlayerRepository::new();
    players
        .expect_get_player()
        .withf(|id| *id == 76561197960287930)
        .returning(|_| Ok(None));
    players.expect_upsert_player().times(1).returning(move |record| {
        let _ = tx.send(record);
        Ok(())
    });

    let mut deps = dependencies(&broker, MockChangeRepository::new());
    deps.player_repository = Arc::new(players);
    let worker = CatalogWorker::new(deps, config()).await.unwrap();

    broker.declare_queue("catalog_profiles").await.unwrap();
    for (account_id, individual) in [(103582791429521408u64, false), (76561197960287930, true)] {
        let payload = serde_json::json!({
            "ProfileInfo": {
                "SteamID": {
                    "IsValid": true,
                    "IsIndividualAccount": individual,
                    "AccountID": account_id,
                },
                "RealName": "Robin",
                "CountryName": "SE",
            }
        });
        broker
            .publish(
                "catalog_profiles",
                Envelope::new("catalog_profiles", payload).encode().unwrap(),
            )
            .await
            .unwrap();
    }

    let ctx = CancellationToken::new();
    for process in worker.into_runner_processes() {
        tokio::spawn(process(ctx.clone()));
    }

    let record = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.id, 76561197960287930);
    assert_eq!(record.country_code, "SE");

    assert!(
        wait_until(Duration::from_secs(2), || {
            broker.acked_count("catalog_profiles") == 2
        })
        .await
    );
    ctx.cancel();

    assert_eq!(broker.depth("catalog_profiles"), 0);
    assert_eq!(broker.published_count("catalog_delay"), 0);
}
