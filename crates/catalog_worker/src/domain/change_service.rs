use crate::domain::{aggregate, resolve_names, SideChannels, UpdateRequestProducer};
use chrono::{DateTime, Utc};
use common::domain::{
    ChangeFeedMessage, ChangeRecord, ChangeRepository, DomainError, DomainResult,
    ProductRepository, UpdateKind, UpdateRequest,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const CHANGES_TOPIC: &str = "changes";

/// Turns one change-feed message into stored change records.
///
/// Flow:
/// 1. Group notices by change number
/// 2. Resolve product names in one lookup per kind
/// 3. Append to the change store
/// 4. Publish a live update (detached)
/// 5. Request a refresh of every touched product, when a producer is set
pub struct ChangeService {
    product_repository: Arc<dyn ProductRepository>,
    change_repository: Arc<dyn ChangeRepository>,
    side_channels: SideChannels,
    producer: Option<Arc<UpdateRequestProducer>>,
}

impl ChangeService {
    pub fn new(
        product_repository: Arc<dyn ProductRepository>,
        change_repository: Arc<dyn ChangeRepository>,
        side_channels: SideChannels,
        producer: Option<Arc<UpdateRequestProducer>>,
    ) -> Self {
        Self {
            product_repository,
            change_repository,
            side_channels,
            producer,
        }
    }

    #[instrument(
        skip(self, message),
        fields(apps = message.app_changes.len(), packages = message.package_changes.len())
    )]
    pub async fn process_changes(
        &self,
        message: ChangeFeedMessage,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Vec<ChangeRecord>> {
        let mut records = aggregate(&message.app_changes, &message.package_changes, created_at);
        if records.is_empty() {
            debug!("empty change message");
            return Ok(records);
        }

        resolve_names(self.product_repository.as_ref(), &mut records).await?;

        match self.change_repository.append_changes(records.clone()).await {
            Ok(()) => {}
            Err(DomainError::DuplicateRecord(key)) => {
                warn!(key = %key, "changes already stored by an earlier attempt");
            }
            Err(e) => return Err(e),
        }

        info!(changes = records.len(), "changes stored");

        match serde_json::to_value(&records) {
            Ok(payload) => {
                self.side_channels.publish_live(CHANGES_TOPIC, payload);
            }
            Err(e) => warn!(error = %e, "failed to encode change live update"),
        }

        if let Some(producer) = &self.producer {
            for request in refresh_requests(&message) {
                producer.produce(request).await?;
            }
        }

        Ok(records)
    }
}

fn refresh_requests(message: &ChangeFeedMessage) -> Vec<UpdateRequest> {
    let apps = message
        .app_changes
        .iter()
        .map(|n| (UpdateKind::App, n));
    let packages = message
        .package_changes
        .iter()
        .map(|n| (UpdateKind::Package, n));

    apps.chain(packages)
        .filter(|(_, notice)| notice.id > 0)
        .map(|(kind, notice)| {
            UpdateRequest::from_change(kind, u64::from(notice.id), notice.change_number)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UpdateQueues;
    use common::broker::MockBrokerConnection;
    use common::domain::{
        ChangeNotice, MockChangeRepository, MockInFlightTracker, MockLiveUpdatePublisher,
        MockProductRepository, ProductSummary,
    };

    fn message() -> ChangeFeedMessage {
        ChangeFeedMessage {
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
        }
    }

    fn products() -> MockProductRepository {
        let mut products = MockProductRepository::new();
        products.expect_get_products_by_ids().returning(|input| {
            Ok(input
                .ids
                .iter()
                .map(|id| ProductSummary {
                    id: *id,
                    name: format!("product {id}"),
                    ..Default::default()
                })
                .collect())
        });
        products
    }

    fn live() -> MockLiveUpdatePublisher {
        let mut live = MockLiveUpdatePublisher::new();
        live.expect_publish().returning(|_, _| Ok(()));
        live
    }

    fn service(
        changes: MockChangeRepository,
        producer: Option<Arc<UpdateRequestProducer>>,
    ) -> ChangeService {
        ChangeService::new(
            Arc::new(products()),
            Arc::new(changes),
            SideChannels::new(Arc::new(live()), None),
            producer,
        )
    }

    #[tokio::test]
    async fn test_process_changes_stores_named_records() {
        let mut changes = MockChangeRepository::new();
        changes
            .expect_append_changes()
            .withf(|records: &Vec<ChangeRecord>| {
                records.len() == 2
                    && records[0].change_id == 5
                    && records[0].apps[1].name == "product 20"
                    && records[1].packages[0].name == "product 30"
            })
            .times(1)
            .returning(|_| Ok(()));

        let records = service(changes, None)
            .process_changes(message(), Utc::now())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_append_counts_as_success() {
        let mut changes = MockChangeRepository::new();
        changes
            .expect_append_changes()
            .times(1)
            .returning(|_| Err(DomainError::DuplicateRecord("change 5".to_string())));

        let result = service(changes, None)
            .process_changes(message(), Utc::now())
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_store_failure_is_transient() {
        let mut changes = MockChangeRepository::new();
        changes
            .expect_append_changes()
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("clickhouse down"))));

        let err = service(changes, None)
            .process_changes(message(), Utc::now())
            .await
            .unwrap_err();

        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_message_touches_nothing() {
        let mut changes = MockChangeRepository::new();
        changes.expect_append_changes().never();

        let service = ChangeService::new(
            Arc::new(MockProductRepository::new()),
            Arc::new(changes),
            SideChannels::new(Arc::new(MockLiveUpdatePublisher::new()), None),
            None,
        );

        let records = service
            .process_changes(ChangeFeedMessage::default(), Utc::now())
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_requests_are_queued() {
        let mut changes = MockChangeRepository::new();
        changes.expect_append_changes().returning(|_| Ok(()));

        let mut broker = MockBrokerConnection::new();
        broker
            .expect_publish()
            .withf(|queue, _| queue == "catalog_apps")
            .times(2)
            .returning(|_, _| Ok(()));
        broker
            .expect_publish()
            .withf(|queue, _| queue == "catalog_packages")
            .times(1)
            .returning(|_, _| Ok(()));

        let producer = UpdateRequestProducer::new(
            Arc::new(broker),
            Arc::new(MockInFlightTracker::new()),
            UpdateQueues {
                apps: "catalog_apps".to_string(),
                packages: "catalog_packages".to_string(),
                players: "catalog_players".to_string(),
                groups: "catalog_groups".to_string(),
            },
        );

        service(changes, Some(Arc::new(producer)))
            .process_changes(message(), Utc::now())
            .await
            .unwrap();
    }

    #[test]
    fn test_refresh_requests_skip_zero_ids() {
        let message = ChangeFeedMessage {
            app_changes: vec![],
            package_changes: vec![
                ChangeNotice {
                    id: 0,
                    change_number: 7,
                },
                ChangeNotice {
                    id: 54029,
                    change_number: 7,
                },
            ],
        };

        let requests = refresh_requests(&message);
        assert_eq!(
            requests,
            vec![UpdateRequest::from_change(UpdateKind::Package, 54029, 7)]
        );
    }
}
