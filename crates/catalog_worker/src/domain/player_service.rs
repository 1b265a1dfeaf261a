use crate::domain::SideChannels;
use chrono::Utc;
use common::domain::{DomainResult, PlayerRecord, PlayerRepository, ProfileInfo};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Stores the public profile fields of individual accounts.
pub struct PlayerService {
    player_repository: Arc<dyn PlayerRepository>,
    side_channels: SideChannels,
}

impl PlayerService {
    pub fn new(player_repository: Arc<dyn PlayerRepository>, side_channels: SideChannels) -> Self {
        Self {
            player_repository,
            side_channels,
        }
    }

    #[instrument(skip(self, profile), fields(account_id = profile.account.account_id))]
    pub async fn process_profile(&self, profile: ProfileInfo) -> DomainResult<PlayerRecord> {
        let id = profile.account.player_id()?;
        let now = Utc::now();

        let mut record = match self.player_repository.get_player(id).await? {
            Some(existing) => existing,
            None => {
                debug!("new player");
                PlayerRecord::new(id, now)
            }
        };
        record.real_name = profile.real_name;
        record.state_code = profile.state_name;
        record.country_code = profile.country_name;
        record.updated_at = now;

        self.player_repository.upsert_player(record.clone()).await?;
        info!("player stored");

        self.side_channels
            .publish_live(format!("player.{id}"), json!({ "id": id }));
        Ok(record)
    }
}
