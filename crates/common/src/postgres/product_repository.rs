use crate::domain::{
    AppRecord, DomainError, DomainResult, GetProductsByIdsInput, PackageRecord, PriceSnapshot,
    ProductField, ProductKind, ProductRepository, ProductSummary,
};
use crate::postgres::PostgresClient;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use tracing::{debug, instrument};

fn table(kind: ProductKind) -> &'static str {
    match kind {
        ProductKind::App => "apps",
        ProductKind::Package => "packages",
    }
}

/// `SELECT id, <projection> FROM <table> WHERE id = ANY($1)`; columns come from
/// the `ProductField` whitelist only.
fn select_by_ids(kind: ProductKind, fields: &[ProductField]) -> String {
    let mut columns = vec!["id"];
    for field in fields {
        let column = field.column();
        if !columns.contains(&column) {
            columns.push(column);
        }
    }
    format!(
        "SELECT {} FROM {} WHERE id = ANY($1)",
        columns.join(", "),
        table(kind)
    )
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value).unwrap_or_default()
}

/// Columns absent from the projection fall back to their defaults.
impl From<&Row> for ProductSummary {
    fn from(row: &Row) -> Self {
        ProductSummary {
            id: row.try_get::<_, i64>("id").map(to_u32).unwrap_or_default(),
            name: row.try_get("name").unwrap_or_default(),
            icon: row.try_get("icon").unwrap_or_default(),
            product_type: row.try_get("product_type").unwrap_or_default(),
            change_number: row
                .try_get::<_, i64>("change_number")
                .map(to_u32)
                .unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct PostgresProductRepository {
    client: PostgresClient,
}

impl PostgresProductRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProductRepository for PostgresProductRepository {
    #[instrument(skip(self, input), fields(kind = %input.kind, ids = input.ids.len()))]
    async fn get_products_by_ids(
        &self,
        input: GetProductsByIdsInput,
    ) -> DomainResult<Vec<ProductSummary>> {
        if input.ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.client.get_connection().await?;
        let ids: Vec<i64> = input.ids.iter().map(|id| i64::from(*id)).collect();

        let rows = conn
            .query(&select_by_ids(input.kind, &input.fields), &[&ids])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(found = rows.len(), "loaded products");
        Ok(rows.iter().map(ProductSummary::from).collect())
    }

    async fn get_change_number(&self, kind: ProductKind, id: u32) -> DomainResult<Option<u32>> {
        let conn = self.client.get_connection().await?;

        let row = conn
            .query_opt(
                &format!("SELECT change_number FROM {} WHERE id = $1", table(kind)),
                &[&i64::from(id)],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| to_u32(row.get::<_, i64>("change_number"))))
    }

    #[instrument(
        skip(self, record),
        fields(app_id = record.id, change_number = record.change_number)
    )]
    async fn upsert_app(&self, record: AppRecord) -> DomainResult<()> {
        let conn = self.client.get_connection().await?;

        let name = record
            .info
            .name
            .clone()
            .unwrap_or_else(|| record.info.common.get("name").cloned().unwrap_or_default());
        let icon = record.info.common.get("icon").cloned().unwrap_or_default();
        let info = serde_json::to_value(&record.info).context("failed to encode app info")?;

        conn.execute(
            "INSERT INTO apps (id, change_number, name, icon, product_type, missing_token, sha_hash, info, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (id) DO UPDATE SET
                change_number = EXCLUDED.change_number,
                name = EXCLUDED.name,
                icon = EXCLUDED.icon,
                product_type = EXCLUDED.product_type,
                missing_token = EXCLUDED.missing_token,
                sha_hash = EXCLUDED.sha_hash,
                info = EXCLUDED.info,
                updated_at = EXCLUDED.updated_at",
            &[
                &i64::from(record.id),
                &i64::from(record.change_number),
                &name,
                &icon,
                &record.product_type(),
                &record.missing_token,
                &record.sha_hash,
                &info,
                &record.updated_at,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("app upserted");
        Ok(())
    }

    #[instrument(
        skip(self, record),
        fields(package_id = record.id, change_number = record.change_number)
    )]
    async fn upsert_package(&self, record: PackageRecord) -> DomainResult<()> {
        let conn = self.client.get_connection().await?;

        let info = serde_json::to_value(&record.info).context("failed to encode package info")?;

        conn.execute(
            "INSERT INTO packages (id, change_number, missing_token, sha_hash, info, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
                change_number = EXCLUDED.change_number,
                missing_token = EXCLUDED.missing_token,
                sha_hash = EXCLUDED.sha_hash,
                info = EXCLUDED.info,
                updated_at = EXCLUDED.updated_at",
            &[
                &i64::from(record.id),
                &i64::from(record.change_number),
                &record.missing_token,
                &record.sha_hash,
                &info,
                &record.updated_at,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("package upserted");
        Ok(())
    }

    async fn get_prices(&self, kind: ProductKind, id: u32) -> DomainResult<Option<PriceSnapshot>> {
        let conn = self.client.get_connection().await?;

        let row = conn
            .query_opt(
                &format!("SELECT prices FROM {} WHERE id = $1", table(kind)),
                &[&i64::from(id)],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let prices: serde_json::Value = row.get("prices");
        let snapshot = serde_json::from_value(prices)
            .with_context(|| format!("stored prices for {kind} {id} are malformed"))?;
        Ok(Some(snapshot))
    }

    #[instrument(skip(self, prices), fields(kind = %kind, id = id))]
    async fn upsert_prices(
        &self,
        kind: ProductKind,
        id: u32,
        prices: PriceSnapshot,
    ) -> DomainResult<()> {
        let conn = self.client.get_connection().await?;

        let prices = serde_json::to_value(&prices).context("failed to encode prices")?;

        conn.execute(
            &format!(
                "INSERT INTO {} (id, prices, updated_at) VALUES ($1, $2, $3)
                 ON CONFLICT (id) DO UPDATE SET prices = EXCLUDED.prices, updated_at = EXCLUDED.updated_at",
                table(kind)
            ),
            &[&i64::from(id), &prices, &Utc::now()],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(())
    }
}
