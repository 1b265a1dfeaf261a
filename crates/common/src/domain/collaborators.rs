use crate::domain::ProductKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fire-and-forget channel towards connected viewers.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LiveUpdatePublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> anyhow::Result<()>;
}

/// Atomic check-and-set against a shared store.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait InFlightTracker: Send + Sync {
    /// Returns `true` when `key` was already marked; marks it otherwise.
    async fn check_and_mark_in_flight(&self, key: &str) -> anyhow::Result<bool>;

    /// Clears a mark so the next check for `key` succeeds again.
    async fn release(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WentFreeNotice {
    pub kind: ProductKind,
    pub id: u32,
    pub name: String,
    pub currency: String,
    pub price_before: i64,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    /// The same notice was already posted; callers ignore this.
    #[error("duplicate notification")]
    Duplicate,

    #[error("notification failed: {0}")]
    Failed(#[from] anyhow::Error),
}

/// External broadcast of notable product events.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ProductNotifier: Send + Sync {
    async fn notify_went_free(&self, notice: WentFreeNotice) -> Result<(), NotifyError>;
}
