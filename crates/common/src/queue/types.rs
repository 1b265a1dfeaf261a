use crate::broker::Envelope;
use crate::domain::{DomainError, DomainResult};
use async_nats::HeaderMap;
use serde::de::DeserializeOwned;

/// Request handed to a queue handler: one decoded envelope.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    /// The semantic queue the envelope was consumed from
    pub queue: String,
    pub envelope: Envelope,
    /// Transport headers, used for trace context propagation
    pub headers: Option<HeaderMap>,
}

impl ConsumeRequest {
    pub fn new(queue: impl Into<String>, envelope: Envelope, headers: Option<HeaderMap>) -> Self {
        Self {
            queue: queue.into(),
            envelope,
            headers,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.envelope.attempt
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        self.envelope.payload_as()
    }
}

/// What a handler decided about a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Processed; acknowledge.
    Success,
    /// Might succeed later; route through the delay/retry subsystem.
    TransientFailure(String),
    /// Can never succeed; acknowledge and drop.
    Abandon(String),
}

impl HandlerOutcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientFailure(reason.into())
    }

    pub fn abandon(reason: impl Into<String>) -> Self {
        Self::Abandon(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TransientFailure(_) => "transient_failure",
            Self::Abandon(_) => "abandon",
        }
    }

    /// Classifies a domain result: transient errors retry, everything else is abandoned.
    pub fn from_result(result: DomainResult<()>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(err) => Self::from_error(&err),
        }
    }

    pub fn from_error(err: &DomainError) -> Self {
        if err.is_transient() {
            Self::TransientFailure(err.to_string())
        } else {
            Self::Abandon(err.to_string())
        }
    }
}
