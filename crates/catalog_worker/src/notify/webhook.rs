use anyhow::anyhow;
use async_trait::async_trait;
use common::domain::{NotifyError, ProductNotifier, WentFreeNotice};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: String,
    kind: &'a str,
    id: u32,
    name: &'a str,
    currency: &'a str,
    price_before: i64,
}

/// Posts notable product events as JSON to a webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("failed to build webhook client: {e}"))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

/// "19.99 USD" from minor units.
fn format_price(minor_units: i64, currency: &str) -> String {
    format!(
        "{}.{:02} {}",
        minor_units / 100,
        (minor_units % 100).abs(),
        currency
    )
}

fn went_free_text(notice: &WentFreeNotice) -> String {
    let name = if notice.name.is_empty() {
        format!("{} {}", notice.kind, notice.id)
    } else {
        notice.name.clone()
    };
    format!(
        "{name} is now free (was {})",
        format_price(notice.price_before, &notice.currency)
    )
}

/// Maps a rejected post to the notifier error; the receiver reports reposts
/// either with 409 or with "duplicate" in the body.
fn classify_rejection(status: StatusCode, body: &str) -> NotifyError {
    if status == StatusCode::CONFLICT || body.to_ascii_lowercase().contains("duplicate") {
        NotifyError::Duplicate
    } else {
        NotifyError::Failed(anyhow!("webhook returned {status}: {body}"))
    }
}

#[async_trait]
impl ProductNotifier for WebhookNotifier {
    #[instrument(skip(self, notice), fields(kind = %notice.kind, id = notice.id))]
    async fn notify_went_free(&self, notice: WentFreeNotice) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            text: went_free_text(&notice),
            kind: notice.kind.as_str(),
            id: notice.id,
            name: &notice.name,
            currency: &notice.currency,
            price_before: notice.price_before,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("failed to post to webhook: {e}"))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = %status, "webhook accepted notification");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_rejection(status, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::ProductKind;

    fn notice(name: &str) -> WentFreeNotice {
        WentFreeNotice {
            kind: ProductKind::App,
            id: 620,
            name: name.to_string(),
            currency: "USD".to_string(),
            price_before: 1999,
        }
    }

    #[test]
    fn test_went_free_text() {
        assert_eq!(
            went_free_text(&notice("Portal 2")),
            "Portal 2 is now free (was 19.99 USD)"
        );
        assert_eq!(went_free_text(&notice("")), "app 620 is now free (was 19.99 USD)");
        assert_eq!(format_price(5, "EUR"), "0.05 EUR");
    }

    #[test]
    fn test_classify_rejection() {
        assert!(matches!(
            classify_rejection(StatusCode::CONFLICT, ""),
            NotifyError::Duplicate
        ));
        assert!(matches!(
            classify_rejection(StatusCode::FORBIDDEN, "Status is a Duplicate."),
            NotifyError::Duplicate
        ));
        assert!(matches!(
            classify_rejection(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            NotifyError::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_webhook_fails() {
        let notifier =
            WebhookNotifier::new("http://127.0.0.1:1/hook", Duration::from_millis(500)).unwrap();

        let result = notifier.notify_went_free(notice("Portal 2")).await;
        assert!(matches!(result, Err(NotifyError::Failed(_))));
    }
}
