use common::domain::{LiveUpdatePublisher, NotifyError, ProductNotifier, WentFreeNotice};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Best-effort outputs that never gate acknowledgement.
///
/// Every call spawns a detached task that logs its own failure. The returned
/// handle exists for tests; production callers drop it.
#[derive(Clone)]
pub struct SideChannels {
    live: Arc<dyn LiveUpdatePublisher>,
    notifier: Option<Arc<dyn ProductNotifier>>,
}

impl SideChannels {
    pub fn new(
        live: Arc<dyn LiveUpdatePublisher>,
        notifier: Option<Arc<dyn ProductNotifier>>,
    ) -> Self {
        Self { live, notifier }
    }

    pub fn publish_live(
        &self,
        topic: impl Into<String>,
        payload: serde_json::Value,
    ) -> JoinHandle<()> {
        let live = Arc::clone(&self.live);
        let topic = topic.into();

        tokio::spawn(
            async move {
                match live.publish(&topic, payload).await {
                    Ok(()) => debug!(topic = %topic, "live update published"),
                    Err(e) => warn!(topic = %topic, error = %e, "live update failed"),
                }
            }
            .in_current_span(),
        )
    }

    /// `None` when no notifier is configured.
    pub fn notify_went_free(&self, notice: WentFreeNotice) -> Option<JoinHandle<()>> {
        let notifier = Arc::clone(self.notifier.as_ref()?);

        Some(tokio::spawn(
            async move {
                let (kind, id) = (notice.kind, notice.id);
                match notifier.notify_went_free(notice).await {
                    Ok(()) => info!(kind = %kind, id, "went-free notification posted"),
                    Err(NotifyError::Duplicate) => {
                        debug!(kind = %kind, id, "went-free notification already posted")
                    }
                    Err(e) => error!(kind = %kind, id, error = %e, "went-free notification failed"),
                }
            }
            .in_current_span(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{MockLiveUpdatePublisher, MockProductNotifier, ProductKind};

    fn notice() -> WentFreeNotice {
        WentFreeNotice {
            kind: ProductKind::App,
            id: 440,
            name: "Team Fortress 2".to_string(),
            currency: "USD".to_string(),
            price_before: 1999,
        }
    }

    #[tokio::test]
    async fn test_live_failure_is_contained() {
        let mut live = MockLiveUpdatePublisher::new();
        live.expect_publish()
            .withf(|topic, _| topic == "changes")
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("nats unavailable")));

        let channels = SideChannels::new(Arc::new(live), None);
        let handle = channels.publish_live("changes", serde_json::json!({}));

        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_without_notifier_nothing_is_spawned() {
        let channels = SideChannels::new(Arc::new(MockLiveUpdatePublisher::new()), None);
        assert!(channels.notify_went_free(notice()).is_none());
    }

    #[tokio::test]
    async fn test_duplicate_notification_is_ignored() {
        let mut notifier = MockProductNotifier::new();
        notifier
            .expect_notify_went_free()
            .withf(|n| n.id == 440 && n.price_before == 1999)
            .times(1)
            .returning(|_| Err(NotifyError::Duplicate));

        let channels = SideChannels::new(
            Arc::new(MockLiveUpdatePublisher::new()),
            Some(Arc::new(notifier)),
        );

        let handle = channels.notify_went_free(notice()).unwrap();
        assert!(handle.await.is_ok());
    }
}
