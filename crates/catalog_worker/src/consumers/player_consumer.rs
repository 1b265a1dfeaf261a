use crate::domain::PlayerService;
use common::domain::ProfileMessage;
use common::queue::{ConsumeRequest, HandlerOutcome};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{error, warn};

/// Tower service for the player profile queue.
#[derive(Clone)]
pub struct PlayerConsumerService {
    domain_service: Arc<PlayerService>,
}

impl PlayerConsumerService {
    pub fn new(domain_service: Arc<PlayerService>) -> Self {
        Self { domain_service }
    }
}

impl Service<ConsumeRequest> for PlayerConsumerService {
    type Response = HandlerOutcome;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<HandlerOutcome, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let domain_service = Arc::clone(&self.domain_service);

        Box::pin(async move {
            let message: ProfileMessage = match req.payload_as() {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, queue = %req.queue, "malformed profile message");
                    return Ok(HandlerOutcome::abandon(format!("decode error: {e}")));
                }
            };

            let account_id = message.profile_info.account.account_id;
            match domain_service.process_profile(message.profile_info).await {
                Ok(_) => Ok(HandlerOutcome::Success),
                Err(e) => {
                    warn!(error = %e, account_id, "failed to process profile");
                    Ok(HandlerOutcome::from_error(&e))
                }
            }
        })
    }
}
