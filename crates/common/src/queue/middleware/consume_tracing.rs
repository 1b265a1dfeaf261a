use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::nats::extract_trace_context;
use crate::queue::{ConsumeRequest, HandlerOutcome};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Tower layer opening one consumer span per envelope, parented on the
/// publisher's trace context when the transport carried one.
#[derive(Clone, Default)]
pub struct ConsumeTracingLayer;

impl ConsumeTracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for ConsumeTracingLayer {
    type Service = ConsumeTracingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        ConsumeTracingService { inner: service }
    }
}

#[derive(Clone)]
pub struct ConsumeTracingService<S> {
    inner: S,
}

impl<S> Service<ConsumeRequest> for ConsumeTracingService<S>
where
    S: Service<ConsumeRequest, Response = HandlerOutcome> + Clone + Send + 'static,
    S::Error: Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let span = info_span!(
            target: "queue",
            "queue_consume",
            otel.name = %format!("{} process", req.queue),
            otel.kind = "consumer",
            messaging.system = "nats",
            messaging.operation = "process",
            messaging.destination.name = %req.queue,
            messaging.message.attempt = req.attempt(),
        );

        if let Some(headers) = &req.headers {
            span.set_parent(extract_trace_context(headers));
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await }.instrument(span))
    }
}
