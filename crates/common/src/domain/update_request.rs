use crate::domain::DomainError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    App,
    Package,
    Player,
    Group,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Package => "package",
            Self::Player => "player",
            Self::Group => "group",
        }
    }
}

/// Request to refresh one entity from upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub kind: UpdateKind,
    pub id: u64,
    /// Set when the request comes from the change feed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_number: Option<u32>,
}

impl UpdateRequest {
    pub fn new(kind: UpdateKind, id: u64) -> Self {
        Self {
            kind,
            id,
            change_number: None,
        }
    }

    pub fn from_change(kind: UpdateKind, id: u64, change_number: u32) -> Self {
        Self {
            kind,
            id,
            change_number: Some(change_number),
        }
    }

    /// Key used for in-flight deduplication
    pub fn dedup_key(&self) -> String {
        format!("{}.{}", self.kind.as_str(), self.id)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let valid = match self.kind {
            UpdateKind::App | UpdateKind::Package => self.id > 0 && self.id <= u64::from(u32::MAX),
            UpdateKind::Player | UpdateKind::Group => self.id > 0,
        };
        if valid {
            Ok(())
        } else {
            Err(DomainError::InvalidUpdateRequest(format!(
                "invalid {} id {}",
                self.kind.as_str(),
                self.id
            )))
        }
    }
}
