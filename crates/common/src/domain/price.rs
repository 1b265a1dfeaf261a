use crate::domain::{DomainResult, ProductKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPrice {
    pub initial: i64,
    #[serde(rename = "final")]
    pub final_price: i64,
    #[serde(default)]
    pub discount_percent: i32,
    #[serde(default)]
    pub individual: i64,
}

/// Prices of one product keyed by currency code ("USD", "EUR", ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceSnapshot(BTreeMap<String, ProductPrice>);

impl PriceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, currency: &str) -> Option<&ProductPrice> {
        self.0.get(currency)
    }

    pub fn insert(&mut self, currency: impl Into<String>, price: ProductPrice) {
        self.0.insert(currency.into(), price);
    }

    pub fn with_price(mut self, currency: impl Into<String>, price: ProductPrice) -> Self {
        self.insert(currency, price);
        self
    }

    pub fn currencies(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ProductPrice)> for PriceSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, ProductPrice)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Payload of the price-update queue: the product's full current price table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdateMessage {
    pub kind: ProductKind,
    pub id: u32,
    pub prices: PriceSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChangeEvent {
    pub product_id: u32,
    pub kind: ProductKind,
    pub name: String,
    pub icon: String,
    pub currency: String,
    pub price_before: i64,
    pub price_after: i64,
    pub difference: i64,
    /// `None` when the previous price was zero
    pub difference_percent: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Append-only store of price-change events.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PriceChangeRepository: Send + Sync {
    async fn append_price_changes(&self, events: Vec<PriceChangeEvent>) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_wire_format() {
        let raw = r#"{"USD": {"initial": 1999, "final": 999, "discount_percent": 50}}"#;
        let snapshot: PriceSnapshot = serde_json::from_str(raw).unwrap();

        let usd = snapshot.get("USD").unwrap();
        assert_eq!(usd.final_price, 999);
        assert_eq!(usd.individual, 0);
        assert!(snapshot.get("EUR").is_none());
        assert_eq!(snapshot.currencies().collect::<Vec<_>>(), vec!["USD"]);
    }
}
