use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::queue::{ConsumeRequest, HandlerOutcome};
use tower::{Layer, Service};
use tracing::{error, info, warn, Instrument, Span};

/// Tower layer logging one line per consumed envelope
#[derive(Clone, Default)]
pub struct ConsumeLoggingLayer;

impl ConsumeLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for ConsumeLoggingLayer {
    type Service = ConsumeLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        ConsumeLoggingService { inner: service }
    }
}

#[derive(Clone)]
pub struct ConsumeLoggingService<S> {
    inner: S,
}

impl<S> Service<ConsumeRequest> for ConsumeLoggingService<S>
where
    S: Service<ConsumeRequest, Response = HandlerOutcome> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let queue = req.queue.clone();
        let attempt = req.attempt();
        let start = Instant::now();
        let mut inner = self.inner.clone();

        let span = Span::current();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let duration_ms = start.elapsed().as_millis();

                match &result {
                    Ok(HandlerOutcome::Success) => {
                        info!(
                            queue = %queue,
                            attempt,
                            outcome = "success",
                            duration_ms = %duration_ms,
                            "consumed from {queue} in {duration_ms}ms [success]"
                        );
                    }
                    Ok(outcome @ (HandlerOutcome::TransientFailure(reason)
                    | HandlerOutcome::Abandon(reason))) => {
                        let outcome = outcome.label();
                        warn!(
                            queue = %queue,
                            attempt,
                            outcome = %outcome,
                            reason = %reason,
                            duration_ms = %duration_ms,
                            "consumed from {queue} in {duration_ms}ms [{outcome}]"
                        );
                    }
                    Err(e) => {
                        error!(
                            queue = %queue,
                            attempt,
                            duration_ms = %duration_ms,
                            error = %e,
                            "failed to consume from {queue} in {duration_ms}ms: {e}"
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
