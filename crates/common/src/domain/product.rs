use crate::domain::{DomainResult, PriceSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyvalues::{AppInfo, KeyValue, PackageInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    App,
    Package,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Package => "package",
        }
    }
}

impl std::fmt::Display for ProductKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Columns a caller may ask for when reading products by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductField {
    Name,
    Icon,
    ProductType,
    ChangeNumber,
}

impl ProductField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Icon => "icon",
            Self::ProductType => "product_type",
            Self::ChangeNumber => "change_number",
        }
    }
}

/// Projection of a stored product. Fields that were not requested keep their
/// default value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductSummary {
    pub id: u32,
    pub name: String,
    pub icon: String,
    /// "Game", "DLC", ... for apps; "Package" for packages
    pub product_type: String,
    pub change_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetProductsByIdsInput {
    pub kind: ProductKind,
    pub ids: Vec<u32>,
    pub fields: Vec<ProductField>,
}

/// Product-info message as delivered by the upstream catalog client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductInfoMessage {
    #[serde(rename = "ID")]
    pub id: u32,
    pub change_number: u32,
    #[serde(default)]
    pub missing_token: bool,
    #[serde(rename = "SHAHash", default)]
    pub sha_hash: String,
    pub key_values: KeyValue,
    #[serde(default)]
    pub only_public: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRecord {
    pub id: u32,
    pub change_number: u32,
    pub missing_token: bool,
    pub sha_hash: String,
    pub info: AppInfo,
    pub updated_at: DateTime<Utc>,
}

impl AppRecord {
    pub fn product_type(&self) -> &str {
        self.info.common.get("type").map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub id: u32,
    pub change_number: u32,
    pub missing_token: bool,
    pub sha_hash: String,
    pub info: PackageInfo,
    pub updated_at: DateTime<Utc>,
}

/// Relational store of products, their decoded metadata and current prices.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Ids that do not exist are absent from the result
    async fn get_products_by_ids(
        &self,
        input: GetProductsByIdsInput,
    ) -> DomainResult<Vec<ProductSummary>>;

    async fn get_change_number(&self, kind: ProductKind, id: u32) -> DomainResult<Option<u32>>;

    async fn upsert_app(&self, record: AppRecord) -> DomainResult<()>;

    async fn upsert_package(&self, record: PackageRecord) -> DomainResult<()>;

    /// `None` when the product has never been stored
    async fn get_prices(&self, kind: ProductKind, id: u32) -> DomainResult<Option<PriceSnapshot>>;

    async fn upsert_prices(
        &self,
        kind: ProductKind,
        id: u32,
        prices: PriceSnapshot,
    ) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_info_message_wire_names() {
        let raw = r#"{
            "ID": 440,
            "ChangeNumber": 12,
            "MissingToken": false,
            "SHAHash": "abc",
            "KeyValues": {"Name": "appinfo", "Children": [{"Name": "appid", "Value": "440"}]},
            "OnlyPublic": true
        }"#;

        let message: ProductInfoMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.id, 440);
        assert_eq!(message.change_number, 12);
        assert_eq!(message.sha_hash, "abc");
        assert!(message.only_public);
        assert_eq!(message.key_values.get("appid").and_then(|n| n.as_str()), Some("440"));
    }

    #[test]
    fn test_product_kind_serde() {
        assert_eq!(serde_json::to_string(&ProductKind::Package).unwrap(), "\"package\"");
        assert_eq!(ProductKind::App.to_string(), "app");
    }
}
