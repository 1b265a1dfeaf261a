use crate::clickhouse::ClickHouseClient;
use crate::domain::{DomainError, DomainResult, PriceChangeEvent, PriceChangeRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct PriceChangeRow {
    pub product_id: u32,
    pub kind: String,
    pub name: String,
    pub icon: String,
    pub currency: String,
    pub price_before: i64,
    pub price_after: i64,
    pub difference: i64,
    pub difference_percent: Option<f64>,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub created_at: DateTime<Utc>,
}

impl From<&PriceChangeEvent> for PriceChangeRow {
    fn from(event: &PriceChangeEvent) -> Self {
        Self {
            product_id: event.product_id,
            kind: event.kind.as_str().to_string(),
            name: event.name.clone(),
            icon: event.icon.clone(),
            currency: event.currency.clone(),
            price_before: event.price_before,
            price_after: event.price_after,
            difference: event.difference,
            difference_percent: event.difference_percent,
            created_at: event.created_at,
        }
    }
}

#[derive(Clone)]
pub struct ClickHousePriceChangeRepository {
    client: ClickHouseClient,
    table: String,
}

impl ClickHousePriceChangeRepository {
    pub fn new(client: ClickHouseClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl PriceChangeRepository for ClickHousePriceChangeRepository {
    async fn append_price_changes(&self, events: Vec<PriceChangeEvent>) -> DomainResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        let rows: Vec<PriceChangeRow> = events.iter().map(PriceChangeRow::from).collect();

        let mut insert = self
            .client
            .get_client()
            .insert::<PriceChangeRow>(&self.table)
            .await
            .map_err(|e| {
                error!("failed to create ClickHouse inserter: {}", e);
                DomainError::RepositoryError(e.into())
            })?;

        for row in &rows {
            insert.write(row).await.map_err(|e| {
                error!("failed to write price change row to ClickHouse: {}", e);
                DomainError::RepositoryError(e.into())
            })?;
        }

        insert.end().await.map_err(|e| {
            error!("failed to finalize ClickHouse insert: {}", e);
            DomainError::RepositoryError(e.into())
        })?;

        debug!(rows_inserted = rows.len(), table = %self.table, "stored price changes");
        Ok(())
    }
}
