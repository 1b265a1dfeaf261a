use crate::domain::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account identity as resolved by the upstream profile lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountIdentity {
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub is_individual_account: bool,
    #[serde(rename = "AccountID", default)]
    pub account_id: u64,
}

impl AccountIdentity {
    /// Only valid individual accounts have a player page.
    pub fn player_id(&self) -> DomainResult<u64> {
        if !self.is_valid || self.account_id == 0 {
            return Err(DomainError::InvalidPlayerId(format!(
                "not a valid account id: {}",
                self.account_id
            )));
        }
        if !self.is_individual_account {
            return Err(DomainError::InvalidPlayerId(format!(
                "not an individual account: {}",
                self.account_id
            )));
        }
        if i64::try_from(self.account_id).is_err() {
            return Err(DomainError::InvalidPlayerId(format!(
                "account id out of range: {}",
                self.account_id
            )));
        }
        Ok(self.account_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProfileInfo {
    #[serde(rename = "SteamID")]
    pub account: AccountIdentity,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub state_name: String,
    #[serde(default)]
    pub country_name: String,
}

/// Profile message as delivered by the upstream client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProfileMessage {
    pub profile_info: ProfileInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub id: u64,
    pub real_name: String,
    pub state_code: String,
    pub country_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlayerRecord {
    pub fn new(id: u64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            real_name: String::new(),
            state_code: String::new(),
            country_code: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PlayerRepository: Send + Sync {
    /// `None` when the player has never been stored
    async fn get_player(&self, id: u64) -> DomainResult<Option<PlayerRecord>>;

    async fn upsert_player(&self, record: PlayerRecord) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(is_valid: bool, is_individual_account: bool, account_id: u64) -> AccountIdentity {
        AccountIdentity {
            is_valid,
            is_individual_account,
            account_id,
        }
    }

    #[test]
    fn test_profile_message_wire_names() {
        let raw = r#"{
            "ProfileInfo": {
                "Result": 1,
                "SteamID": {
                    "IsValid": true,
                    "IsIndividualAccount": true,
                    "IsClanAccount": false,
                    "AccountID": 76561197960287930
                },
                "RealName": "Gabe",
                "StateName": "WA",
                "CountryName": "US",
                "Headline": ""
            }
        }"#;

        let message: ProfileMessage = serde_json::from_str(raw).unwrap();
        let info = message.profile_info;
        assert_eq!(info.account.player_id().unwrap(), 76561197960287930);
        assert_eq!(info.real_name, "Gabe");
        assert_eq!(info.state_name, "WA");
        assert_eq!(info.country_name, "US");
    }

    #[test]
    fn test_player_id_rejects_unusable_accounts() {
        assert!(identity(true, true, 42).player_id().is_ok());

        for account in [
            identity(false, true, 42),
            identity(true, false, 42),
            identity(true, true, 0),
            identity(true, true, u64::MAX),
        ] {
            let err = account.player_id().unwrap_err();
            assert!(matches!(err, DomainError::InvalidPlayerId(_)));
            assert!(!err.is_transient());
        }
    }
}
