use crate::domain::{ProductOutcome, ProductService};
use common::domain::{ProductInfoMessage, ProductKind};
use common::queue::{ConsumeRequest, HandlerOutcome};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, error, warn};

/// Tower service for the app and package product-info queues.
#[derive(Clone)]
pub struct ProductConsumerService {
    kind: ProductKind,
    domain_service: Arc<ProductService>,
}

impl ProductConsumerService {
    pub fn new(kind: ProductKind, domain_service: Arc<ProductService>) -> Self {
        Self {
            kind,
            domain_service,
        }
    }
}

impl Service<ConsumeRequest> for ProductConsumerService {
    type Response = HandlerOutcome;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<HandlerOutcome, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let domain_service = Arc::clone(&self.domain_service);
        let kind = self.kind;

        Box::pin(async move {
            let message: ProductInfoMessage = match req.payload_as() {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, queue = %req.queue, kind = %kind, "malformed product info");
                    return Ok(HandlerOutcome::abandon(format!("decode error: {e}")));
                }
            };

            let id = message.id;
            let result = match kind {
                ProductKind::App => domain_service.process_app_info(message).await,
                ProductKind::Package => domain_service.process_package_info(message).await,
            };

            match result {
                Ok(ProductOutcome::Stored) => Ok(HandlerOutcome::Success),
                Ok(ProductOutcome::Stale {
                    stored_change_number,
                }) => {
                    debug!(
                        kind = %kind,
                        id,
                        stored_change_number,
                        "stale product info acknowledged"
                    );
                    Ok(HandlerOutcome::Success)
                }
                Err(e) => {
                    warn!(error = %e, kind = %kind, id, "failed to process product info");
                    Ok(HandlerOutcome::from_error(&e))
                }
            }
        })
    }
}
