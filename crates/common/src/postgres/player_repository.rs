use crate::domain::{DomainError, DomainResult, PlayerRecord, PlayerRepository};
use crate::postgres::PostgresClient;
use anyhow::Context;
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::{debug, instrument};

fn to_column(id: u64) -> DomainResult<i64> {
    i64::try_from(id).map_err(|_| DomainError::InvalidPlayerId(format!("id out of range: {id}")))
}

impl TryFrom<&Row> for PlayerRecord {
    type Error = anyhow::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        let id: i64 = row.try_get("id")?;
        Ok(PlayerRecord {
            id: u64::try_from(id).context("stored player id is negative")?,
            real_name: row.try_get("real_name")?,
            state_code: row.try_get("state_code")?,
            country_code: row.try_get("country_code")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone)]
pub struct PostgresPlayerRepository {
    client: PostgresClient,
}

impl PostgresPlayerRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlayerRepository for PostgresPlayerRepository {
    async fn get_player(&self, id: u64) -> DomainResult<Option<PlayerRecord>> {
        let conn = self.client.get_connection().await?;

        let row = conn
            .query_opt(
                "SELECT id, real_name, state_code, country_code, created_at, updated_at
                 FROM players WHERE id = $1",
                &[&to_column(id)?],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref()
            .map(PlayerRecord::try_from)
            .transpose()
            .map_err(DomainError::RepositoryError)
    }

    #[instrument(skip(self, record), fields(player_id = record.id))]
    async fn upsert_player(&self, record: PlayerRecord) -> DomainResult<()> {
        let conn = self.client.get_connection().await?;

        conn.execute(
            "INSERT INTO players (id, real_name, state_code, country_code, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
                real_name = EXCLUDED.real_name,
                state_code = EXCLUDED.state_code,
                country_code = EXCLUDED.country_code,
                updated_at = EXCLUDED.updated_at",
            &[
                &to_column(record.id)?,
                &record.real_name,
                &record.state_code,
                &record.country_code,
                &record.created_at,
                &record.updated_at,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("player upserted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_column_rejects_ids_past_bigint() {
        assert_eq!(to_column(76561197960287930).unwrap(), 76561197960287930);
        assert!(matches!(
            to_column(u64::MAX),
            Err(DomainError::InvalidPlayerId(_))
        ));
    }
}
