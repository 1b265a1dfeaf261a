use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("envelope attempt must be at least 1, got {0}")]
    InvalidAttempt(u32),

    #[error("envelope has no original queue")]
    MissingQueue,
}

/// Transport wrapper around a domain message.
///
/// Retry bookkeeping travels in the body so it survives moves between the
/// original queue and the delay queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub payload: serde_json::Value,
    pub first_seen: DateTime<Utc>,
    pub attempt: u32,
    pub original_queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl Envelope {
    /// First production of a message: attempt 1, first seen now.
    pub fn new(original_queue: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::first_seen_at(original_queue, payload, Utc::now())
    }

    pub fn first_seen_at(
        original_queue: impl Into<String>,
        payload: serde_json::Value,
        first_seen: DateTime<Utc>,
    ) -> Self {
        Self {
            payload,
            first_seen,
            attempt: 1,
            original_queue: original_queue.into(),
            next_attempt_at: None,
        }
    }

    pub fn wrap<T: Serialize>(
        original_queue: impl Into<String>,
        message: &T,
    ) -> Result<Self, EnvelopeError> {
        Ok(Self::new(original_queue, serde_json::to_value(message)?))
    }

    pub fn decode(body: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Envelope = serde_json::from_slice(body)?;
        if envelope.attempt == 0 {
            return Err(EnvelopeError::InvalidAttempt(envelope.attempt));
        }
        if envelope.original_queue.is_empty() {
            return Err(EnvelopeError::MissingQueue);
        }
        Ok(envelope)
    }

    pub fn encode(&self) -> Result<Bytes, EnvelopeError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Time since first production; never negative.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.first_seen).max(chrono::Duration::zero())
    }
}
