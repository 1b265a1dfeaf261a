use crate::clickhouse::ClickHouseClient;
use crate::domain::{ChangeEntity, ChangeRecord, ChangeRepository, DomainError, DomainResult};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct ChangeRow {
    pub change_id: u32,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub created_at: DateTime<Utc>,
    /// JSON array of `{id, name}`
    pub apps: String,
    pub packages: String,
}

impl TryFrom<&ChangeRecord> for ChangeRow {
    type Error = serde_json::Error;

    fn try_from(record: &ChangeRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            change_id: record.change_id,
            created_at: record.created_at,
            apps: serde_json::to_string(&record.apps)?,
            packages: serde_json::to_string(&record.packages)?,
        })
    }
}

impl TryFrom<ChangeRow> for ChangeRecord {
    type Error = serde_json::Error;

    fn try_from(row: ChangeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            change_id: row.change_id,
            created_at: row.created_at,
            apps: serde_json::from_str::<Vec<ChangeEntity>>(&row.apps)?,
            packages: serde_json::from_str::<Vec<ChangeEntity>>(&row.packages)?,
        })
    }
}

#[derive(Clone)]
pub struct ClickHouseChangeRepository {
    client: ClickHouseClient,
    table: String,
}

impl ClickHouseChangeRepository {
    pub fn new(client: ClickHouseClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl ChangeRepository for ClickHouseChangeRepository {
    async fn append_changes(&self, changes: Vec<ChangeRecord>) -> DomainResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let rows = changes
            .iter()
            .map(ChangeRow::try_from)
            .collect::<Result<Vec<_>, _>>()
            .context("failed to encode change row")?;

        let mut insert = self
            .client
            .get_client()
            .insert::<ChangeRow>(&self.table)
            .await
            .map_err(|e| {
                error!("failed to create ClickHouse inserter: {}", e);
                DomainError::RepositoryError(e.into())
            })?;

        for row in &rows {
            insert.write(row).await.map_err(|e| {
                error!("failed to write change row to ClickHouse: {}", e);
                DomainError::RepositoryError(e.into())
            })?;
        }

        insert.end().await.map_err(|e| {
            error!("failed to finalize ClickHouse insert: {}", e);
            DomainError::RepositoryError(e.into())
        })?;

        debug!(rows_inserted = rows.len(), table = %self.table, "stored changes");
        Ok(())
    }
}
