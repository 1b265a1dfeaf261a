use crate::domain::SideChannels;
use chrono::Utc;
use common::domain::{
    AppRecord, DomainError, DomainResult, PackageRecord, ProductInfoMessage, ProductKind,
    ProductRepository,
};
use keyvalues::{decode_app, decode_package};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductOutcome {
    Stored,
    /// The store already holds a newer change number.
    Stale { stored_change_number: u32 },
}

/// Stores decoded product-info trees for apps and packages.
pub struct ProductService {
    product_repository: Arc<dyn ProductRepository>,
    side_channels: SideChannels,
}

impl ProductService {
    pub fn new(
        product_repository: Arc<dyn ProductRepository>,
        side_channels: SideChannels,
    ) -> Self {
        Self {
            product_repository,
            side_channels,
        }
    }

    #[instrument(
        skip(self, message),
        fields(app_id = message.id, change_number = message.change_number)
    )]
    pub async fn process_app_info(
        &self,
        message: ProductInfoMessage,
    ) -> DomainResult<ProductOutcome> {
        if let Some(outcome) = self.check_stale(ProductKind::App, &message).await? {
            return Ok(outcome);
        }

        let record = AppRecord {
            id: message.id,
            change_number: message.change_number,
            missing_token: message.missing_token,
            sha_hash: message.sha_hash,
            info: decode_app(&message.key_values),
            updated_at: Utc::now(),
        };
        let name = record.info.name.clone().unwrap_or_default();

        self.product_repository.upsert_app(record).await?;
        info!(name = %name, "app stored");

        self.publish(ProductKind::App, message.id, message.change_number);
        Ok(ProductOutcome::Stored)
    }

    #[instrument(
        skip(self, message),
        fields(package_id = message.id, change_number = message.change_number)
    )]
    pub async fn process_package_info(
        &self,
        message: ProductInfoMessage,
    ) -> DomainResult<ProductOutcome> {
        if let Some(outcome) = self.check_stale(ProductKind::Package, &message).await? {
            return Ok(outcome);
        }

        let record = PackageRecord {
            id: message.id,
            change_number: message.change_number,
            missing_token: message.missing_token,
            sha_hash: message.sha_hash,
            info: decode_package(&message.key_values),
            updated_at: Utc::now(),
        };

        self.product_repository.upsert_package(record).await?;
        info!("package stored");

        self.publish(ProductKind::Package, message.id, message.change_number);
        Ok(ProductOutcome::Stored)
    }

    /// Rejects id 0 and reports a stale message when the stored change number is newer.
    async fn check_stale(
        &self,
        kind: ProductKind,
        message: &ProductInfoMessage,
    ) -> DomainResult<Option<ProductOutcome>> {
        if message.id == 0 {
            return Err(DomainError::InvalidProductId(message.id));
        }

        match self
            .product_repository
            .get_change_number(kind, message.id)
            .await?
        {
            Some(stored) if stored > message.change_number => {
                debug!(stored_change_number = stored, "skipping stale product info");
                Ok(Some(ProductOutcome::Stale {
                    stored_change_number: stored,
                }))
            }
            _ => Ok(None),
        }
    }

    fn publish(&self, kind: ProductKind, id: u32, change_number: u32) {
        self.side_channels.publish_live(
            format!("{kind}.{id}"),
            json!({ "kind": kind, "id": id, "change_number": change_number }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{MockLiveUpdatePublisher, MockProductRepository};
    use keyvalues::KeyValue;

    fn app_message(id: u32, change_number: u32) -> ProductInfoMessage {
        ProductInfoMessage {
            id,
            change_number,
            missing_token: false,
            sha_hash: "2e1b".to_string(),
            key_values: KeyValue::branch(
                "appinfo",
                vec![
                    KeyValue::leaf("appid", id.to_string()),
                    KeyValue::branch(
                        "common",
                        vec![
                            KeyValue::leaf("name", "Half-Life 2"),
                            KeyValue::leaf("type", "Game"),
                        ],
                    ),
                ],
            ),
            only_public: false,
        }
    }

    fn live(topic: &'static str) -> MockLiveUpdatePublisher {
        let mut live = MockLiveUpdatePublisher::new();
        live.expect_publish()
            .withf(move |t, _| t == topic)
            .returning(|_, _| Ok(()));
        live
    }

    #[tokio::test]
    async fn test_app_info_is_decoded_and_stored() {
        let mut products = MockProductRepository::new();
        products
            .expect_get_change_number()
            .withf(|kind, id| *kind == ProductKind::App && *id == 220)
            .times(1)
            .returning(|_, _| Ok(Some(11)));
        products
            .expect_upsert_app()
            .withf(|record: &AppRecord| {
                record.id == 220
                    && record.change_number == 12
                    && record.info.common.get("name").map(String::as_str) == Some("Half-Life 2")
                    && record.product_type() == "Game"
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = ProductService::new(
            Arc::new(products),
            SideChannels::new(Arc::new(live("app.220")), None),
        );

        let outcome = service.process_app_info(app_message(220, 12)).await.unwrap();
        assert_eq!(outcome, ProductOutcome::Stored);
    }

    #[tokio::test]
    async fn test_stale_app_info_is_skipped() {
        let mut products = MockProductRepository::new();
        products
            .expect_get_change_number()
            .returning(|_, _| Ok(Some(20)));
        products.expect_upsert_app().never();

        let service = ProductService::new(
            Arc::new(products),
            SideChannels::new(Arc::new(MockLiveUpdatePublisher::new()), None),
        );

        let outcome = service.process_app_info(app_message(220, 12)).await.unwrap();
        assert_eq!(
            outcome,
            ProductOutcome::Stale {
                stored_change_number: 20
            }
        );
    }

    #[tokio::test]
    async fn test_same_change_number_is_reprocessed() {
        let mut products = MockProductRepository::new();
        products
            .expect_get_change_number()
            .returning(|_, _| Ok(Some(12)));
        products.expect_upsert_app().times(1).returning(|_| Ok(()));

        let service = ProductService::new(
            Arc::new(products),
            SideChannels::new(Arc::new(live("app.220")), None),
        );

        let outcome = service.process_app_info(app_message(220, 12)).await.unwrap();
        assert_eq!(outcome, ProductOutcome::Stored);
    }

    #[tokio::test]
    async fn test_package_info_is_stored() {
        let mut products = MockProductRepository::new();
        products
            .expect_get_change_number()
            .withf(|kind, _| *kind == ProductKind::Package)
            .returning(|_, _| Ok(None));
        products
            .expect_upsert_package()
            .withf(|record: &PackageRecord| {
                record.id == 36 && record.info.app_ids == vec![10, 80]
            })
            .times(1)
            .returning(|_| Ok(()));

        let message = ProductInfoMessage {
            id: 36,
            change_number: 3,
            missing_token: false,
            sha_hash: String::new(),
            key_values: KeyValue::branch(
                "36",
                vec![
                    KeyValue::leaf("packageid", "36"),
                    KeyValue::branch(
                        "appids",
                        vec![KeyValue::leaf("0", "10"), KeyValue::leaf("1", "80")],
                    ),
                ],
            ),
            only_public: false,
        };

        let service = ProductService::new(
            Arc::new(products),
            SideChannels::new(Arc::new(live("package.36")), None),
        );

        let outcome = service.process_package_info(message).await.unwrap();
        assert_eq!(outcome, ProductOutcome::Stored);
    }

    #[tokio::test]
    async fn test_zero_id_is_abandoned() {
        let service = ProductService::new(
            Arc::new(MockProductRepository::new()),
            SideChannels::new(Arc::new(MockLiveUpdatePublisher::new()), None),
        );

        let err = service.process_app_info(app_message(0, 1)).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidProductId(0)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_transient() {
        let mut products = MockProductRepository::new();
        products
            .expect_get_change_number()
            .returning(|_, _| Err(DomainError::RepositoryError(anyhow::anyhow!("pool closed"))));

        let service = ProductService::new(
            Arc::new(products),
            SideChannels::new(Arc::new(MockLiveUpdatePublisher::new()), None),
        );

        let err = service.process_app_info(app_message(220, 1)).await.unwrap_err();
        assert!(err.is_transient());
    }
}
