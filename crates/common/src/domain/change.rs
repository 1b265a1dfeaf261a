use crate::domain::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw change-feed notice: a product touched by a given change number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub id: u32,
    pub change_number: u32,
}

/// Payload of the change-feed queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFeedMessage {
    #[serde(default)]
    pub app_changes: Vec<ChangeNotice>,
    #[serde(default)]
    pub package_changes: Vec<ChangeNotice>,
}

impl ChangeFeedMessage {
    pub fn is_empty(&self) -> bool {
        self.app_changes.is_empty() && self.package_changes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntity {
    pub id: u32,
    /// Empty when the product is not stored yet
    pub name: String,
}

impl ChangeEntity {
    pub fn unnamed(id: u32) -> Self {
        Self {
            id,
            name: String::new(),
        }
    }
}

/// All products touched by one upstream change number. Append-only once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub change_id: u32,
    pub created_at: DateTime<Utc>,
    pub apps: Vec<ChangeEntity>,
    pub packages: Vec<ChangeEntity>,
}

/// Append-only store of change records.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ChangeRepository: Send + Sync {
    /// Re-appending a stored change id must not duplicate it; stores that
    /// reject the write instead fail with `DuplicateRecord`
    async fn append_changes(&self, changes: Vec<ChangeRecord>) -> DomainResult<()>;
}
