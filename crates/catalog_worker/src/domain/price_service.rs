use crate::domain::{detect_price_delta, went_free, PricedProduct, SideChannels};
use chrono::{DateTime, Utc};
use common::domain::{
    DomainError, DomainResult, GetProductsByIdsInput, PriceChangeEvent, PriceChangeRepository,
    PriceUpdateMessage, ProductField, ProductKind, ProductRepository,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const PRICES_TOPIC: &str = "prices";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceServiceConfig {
    /// Currency the went-free rule looks at
    pub reference_currency: String,
    pub supported_currencies: Vec<String>,
}

impl Default for PriceServiceConfig {
    fn default() -> Self {
        Self {
            reference_currency: "USD".to_string(),
            supported_currencies: vec!["USD".to_string()],
        }
    }
}

/// Applies a product's new price table.
///
/// Events are appended before the stored snapshot moves forward, so a failed
/// attempt is retried against the same `before`. Events carry the message's
/// first-seen time, which keeps a retried append identical to the first one.
pub struct PriceService {
    product_repository: Arc<dyn ProductRepository>,
    price_change_repository: Arc<dyn PriceChangeRepository>,
    side_channels: SideChannels,
    config: PriceServiceConfig,
}

impl PriceService {
    pub fn new(
        product_repository: Arc<dyn ProductRepository>,
        price_change_repository: Arc<dyn PriceChangeRepository>,
        side_channels: SideChannels,
        config: PriceServiceConfig,
    ) -> Self {
        Self {
            product_repository,
            price_change_repository,
            side_channels,
            config,
        }
    }

    #[instrument(skip(self, message), fields(kind = %message.kind, id = message.id))]
    pub async fn process_price_update(
        &self,
        message: PriceUpdateMessage,
        observed_at: DateTime<Utc>,
    ) -> DomainResult<Vec<PriceChangeEvent>> {
        if message.id == 0 {
            return Err(DomainError::InvalidProductId(message.id));
        }

        let product = self.load_product(&message).await?;
        let before = self
            .product_repository
            .get_prices(message.kind, message.id)
            .await?
            .unwrap_or_default();

        let events = detect_price_delta(
            &product,
            &before,
            &message.prices,
            &self.config.supported_currencies,
            observed_at,
        );

        if !events.is_empty() {
            self.price_change_repository
                .append_price_changes(events.clone())
                .await?;
            info!(events = events.len(), "price changes recorded");
        } else {
            debug!("no price change");
        }

        self.product_repository
            .upsert_prices(message.kind, message.id, message.prices.clone())
            .await?;

        if let Some(notice) = went_free(
            &product,
            &before,
            &message.prices,
            &self.config.reference_currency,
        ) {
            info!(name = %notice.name, "product went free");
            self.side_channels.notify_went_free(notice);
        }

        self.side_channels.publish_live(
            PRICES_TOPIC,
            json!({
                "kind": message.kind,
                "id": message.id,
                "prices": message.prices,
            }),
        );

        Ok(events)
    }

    /// Unknown products still get their prices stored, under an empty name.
    async fn load_product(&self, message: &PriceUpdateMessage) -> DomainResult<PricedProduct> {
        let summary = self
            .product_repository
            .get_products_by_ids(GetProductsByIdsInput {
                kind: message.kind,
                ids: vec![message.id],
                fields: vec![
                    ProductField::Name,
                    ProductField::Icon,
                    ProductField::ProductType,
                ],
            })
            .await?
            .into_iter()
            .find(|p| p.id == message.id)
            .unwrap_or_default();

        Ok(PricedProduct {
            id: message.id,
            kind: message.kind,
            name: summary.name,
            icon: summary.icon,
            product_type: match message.kind {
                ProductKind::App => summary.product_type,
                ProductKind::Package => "Package".to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{
        MockLiveUpdatePublisher, MockPriceChangeRepository, MockProductNotifier,
        MockProductRepository, PriceSnapshot, ProductPrice, ProductSummary, WentFreeNotice,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn price(final_price: i64) -> ProductPrice {
        ProductPrice {
            initial: 1999,
            final_price,
            ..Default::default()
        }
    }

    fn config() -> PriceServiceConfig {
        PriceServiceConfig {
            reference_currency: "USD".to_string(),
            supported_currencies: vec!["USD".to_string(), "EUR".to_string()],
        }
    }

    fn products(before: Option<PriceSnapshot>) -> MockProductRepository {
        let mut products = MockProductRepository::new();
        products.expect_get_products_by_ids().returning(|_| {
            Ok(vec![ProductSummary {
                id: 400,
                name: "Portal".to_string(),
                icon: "cfa9".to_string(),
                product_type: "Game".to_string(),
                change_number: 1,
            }])
        });
        products
            .expect_get_prices()
            .return_once(move |_, _| Ok(before));
        products
    }

    fn live() -> MockLiveUpdatePublisher {
        let mut live = MockLiveUpdatePublisher::new();
        live.expect_publish().returning(|_, _| Ok(()));
        live
    }

    fn message(prices: PriceSnapshot) -> PriceUpdateMessage {
        PriceUpdateMessage {
            kind: ProductKind::App,
            id: 400,
            prices,
        }
    }

    #[tokio::test]
    async fn test_price_drop_is_recorded_and_stored() {
        let before = PriceSnapshot::new()
            .with_price("USD", price(1999))
            .with_price("EUR", price(1499));
        let after = PriceSnapshot::new()
            .with_price("USD", price(999))
            .with_price("EUR", price(1499));

        let mut products = products(Some(before));
        products
            .expect_upsert_prices()
            .withf(|kind, id, prices| {
                *kind == ProductKind::App
                    && *id == 400
                    && prices.get("USD").map(|p| p.final_price) == Some(999)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut price_changes = MockPriceChangeRepository::new();
        price_changes
            .expect_append_price_changes()
            .withf(|events: &Vec<PriceChangeEvent>| {
                events.len() == 1 && events[0].currency == "USD" && events[0].name == "Portal"
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = PriceService::new(
            Arc::new(products),
            Arc::new(price_changes),
            SideChannels::new(Arc::new(live()), None),
            config(),
        );

        let events = service
            .process_price_update(message(after), Utc::now())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].difference, -1000);
    }

    #[tokio::test]
    async fn test_unchanged_prices_skip_the_event_store() {
        let snapshot = PriceSnapshot::new().with_price("USD", price(999));

        let mut products = products(Some(snapshot.clone()));
        products.expect_upsert_prices().returning(|_, _, _| Ok(()));

        let mut price_changes = MockPriceChangeRepository::new();
        price_changes.expect_append_price_changes().never();

        let service = PriceService::new(
            Arc::new(products),
            Arc::new(price_changes),
            SideChannels::new(Arc::new(live()), None),
            config(),
        );

        let events = service
            .process_price_update(message(snapshot), Utc::now())
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_event_store_failure_keeps_old_snapshot() {
        let mut products = products(None);
        products.expect_upsert_prices().never();

        let mut price_changes = MockPriceChangeRepository::new();
        price_changes
            .expect_append_price_changes()
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("timeout"))));

        let service = PriceService::new(
            Arc::new(products),
            Arc::new(price_changes),
            SideChannels::new(Arc::new(MockLiveUpdatePublisher::new()), None),
            config(),
        );

        let err = service
            .process_price_update(
                message(PriceSnapshot::new().with_price("USD", price(499))),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_went_free_fires_notification() {
        let before = PriceSnapshot::new().with_price("USD", price(1999));
        let after = PriceSnapshot::new().with_price("USD", price(0));

        let mut products = products(Some(before));
        products.expect_upsert_prices().returning(|_, _, _| Ok(()));

        let mut price_changes = MockPriceChangeRepository::new();
        price_changes
            .expect_append_price_changes()
            .returning(|_| Ok(()));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut notifier = MockProductNotifier::new();
        notifier
            .expect_notify_went_free()
            .times(1)
            .returning(move |notice: WentFreeNotice| {
                let _ = tx.send(notice);
                Ok(())
            });

        let service = PriceService::new(
            Arc::new(products),
            Arc::new(price_changes),
            SideChannels::new(Arc::new(live()), Some(Arc::new(notifier))),
            config(),
        );

        service
            .process_price_update(message(after), Utc::now())
            .await
            .unwrap();

        let notice = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice.id, 400);
        assert_eq!(notice.price_before, 1999);
    }

    #[tokio::test]
    async fn test_zero_id_is_rejected() {
        let service = PriceService::new(
            Arc::new(MockProductRepository::new()),
            Arc::new(MockPriceChangeRepository::new()),
            SideChannels::new(Arc::new(MockLiveUpdatePublisher::new()), None),
            config(),
        );

        let mut message = message(PriceSnapshot::new());
        message.id = 0;

        let err = service
            .process_price_update(message, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidProductId(0)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_retry_after_snapshot_failure_appends_identical_events() {
        let before = PriceSnapshot::new().with_price("USD", price(1999));
        let after = PriceSnapshot::new().with_price("USD", price(999));

        let mut products = MockProductRepository::new();
        products.expect_get_products_by_ids().returning(|_| Ok(vec![]));
        products
            .expect_get_prices()
            .times(2)
            .returning(move |_, _| Ok(Some(before.clone())));
        let mut seq = mockall::Sequence::new();
        products
            .expect_upsert_prices()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(DomainError::RepositoryError(anyhow::anyhow!("timeout"))));
        products
            .expect_upsert_prices()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let appended = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&appended);
        let mut price_changes = MockPriceChangeRepository::new();
        price_changes
            .expect_append_price_changes()
            .times(2)
            .returning(move |events| {
                sink.lock().unwrap().push(events);
                Ok(())
            });

        let service = PriceService::new(
            Arc::new(products),
            Arc::new(price_changes),
            SideChannels::new(Arc::new(live()), None),
            config(),
        );

        let first_seen = Utc::now() - chrono::Duration::minutes(3);
        let err = service
            .process_price_update(message(after.clone()), first_seen)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        service
            .process_price_update(message(after), first_seen)
            .await
            .unwrap();

        let appended = appended.lock().unwrap();
        assert_eq!(appended.len(), 2);
        assert_eq!(appended[0], appended[1]);
        assert_eq!(appended[0][0].created_at, first_seen);
    }
}
