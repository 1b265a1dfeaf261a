use crate::domain::PriceService;
use common::domain::PriceUpdateMessage;
use common::queue::{ConsumeRequest, HandlerOutcome};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{error, warn};

/// Tower service for the price-update queue.
#[derive(Clone)]
pub struct PriceConsumerService {
    domain_service: Arc<PriceService>,
}

impl PriceConsumerService {
    pub fn new(domain_service: Arc<PriceService>) -> Self {
        Self { domain_service }
    }
}

impl Service<ConsumeRequest> for PriceConsumerService {
    type Response = HandlerOutcome;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<HandlerOutcome, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let domain_service = Arc::clone(&self.domain_service);

        Box::pin(async move {
            let message: PriceUpdateMessage = match req.payload_as() {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, queue = %req.queue, "malformed price message");
                    return Ok(HandlerOutcome::abandon(format!("decode error: {e}")));
                }
            };

            let (kind, id) = (message.kind, message.id);
            match domain_service
                .process_price_update(message, req.envelope.first_seen)
                .await
            {
                Ok(_) => Ok(HandlerOutcome::Success),
                Err(e) => {
                    warn!(error = %e, kind = %kind, id, "failed to process price update");
                    Ok(HandlerOutcome::from_error(&e))
                }
            }
        })
    }
}
