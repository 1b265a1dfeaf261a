use crate::domain::ChangeService;
use common::domain::ChangeFeedMessage;
use common::queue::{ConsumeRequest, HandlerOutcome};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, error, warn};

/// Tower service for the change-feed queue.
///
/// Records are stamped with the envelope's first-seen time, so a retried
/// message keeps the time it was first produced.
#[derive(Clone)]
pub struct ChangeConsumerService {
    domain_service: Arc<ChangeService>,
}

impl ChangeConsumerService {
    pub fn new(domain_service: Arc<ChangeService>) -> Self {
        Self { domain_service }
    }
}

impl Service<ConsumeRequest> for ChangeConsumerService {
    type Response = HandlerOutcome;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<HandlerOutcome, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let domain_service = Arc::clone(&self.domain_service);

        Box::pin(async move {
            let message: ChangeFeedMessage = match req.payload_as() {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, queue = %req.queue, "malformed change message");
                    return Ok(HandlerOutcome::abandon(format!("decode error: {e}")));
                }
            };

            match domain_service
                .process_changes(message, req.envelope.first_seen)
                .await
            {
                Ok(records) => {
                    debug!(records = records.len(), "processed change message");
                    Ok(HandlerOutcome::Success)
                }
                Err(e) => {
                    warn!(error = %e, attempt = req.attempt(), "failed to process change message");
                    Ok(HandlerOutcome::from_error(&e))
                }
            }
        })
    }
}
