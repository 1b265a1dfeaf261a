use crate::broker::Envelope;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Per-queue retry bounds and backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 0 disables the attempt bound
    pub max_attempts: u32,
    /// Zero disables the age bound
    pub max_age: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(6 * 60 * 60),
            max_attempts: 0,
            max_age: Duration::ZERO,
        }
    }
}

/// Why an envelope is dropped instead of retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    Attempts { attempt: u32, max_attempts: u32 },
    Age { age: Duration, max_age: Duration },
}

impl std::fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attempts {
                attempt,
                max_attempts,
            } => write!(f, "attempt {attempt} exceeds max attempts {max_attempts}"),
            Self::Age { age, max_age } => {
                write!(f, "age {}s exceeds max age {}s", age.as_secs(), max_age.as_secs())
            }
        }
    }
}

/// Where an envelope goes next.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Drop(Exhaustion),
    /// Due now: back onto its original queue.
    Requeue(Envelope),
    /// Not due yet: onto the delay queue.
    Delay(Envelope),
}

impl RetryPolicy {
    /// `base × 2^(attempt−1)`, capped at `max_delay`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn exhaustion(&self, envelope: &Envelope, now: DateTime<Utc>) -> Option<Exhaustion> {
        if self.max_attempts > 0 && envelope.attempt > self.max_attempts {
            return Some(Exhaustion::Attempts {
                attempt: envelope.attempt,
                max_attempts: self.max_attempts,
            });
        }

        if !self.max_age.is_zero() {
            let age = envelope.age(now).to_std().unwrap_or_default();
            if age > self.max_age {
                return Some(Exhaustion::Age {
                    age,
                    max_age: self.max_age,
                });
            }
        }

        None
    }

    /// A handler failed: count the attempt, check bounds, schedule the next try.
    pub fn plan_retry(&self, mut envelope: Envelope, now: DateTime<Utc>) -> RetryDecision {
        let failed_attempt = envelope.attempt;
        envelope.attempt = failed_attempt.saturating_add(1);

        if let Some(exhaustion) = self.exhaustion(&envelope, now) {
            return RetryDecision::Drop(exhaustion);
        }

        let delay = chrono::Duration::from_std(self.backoff_for(failed_attempt))
            .unwrap_or(chrono::Duration::MAX);
        let next_attempt_at = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);

        if next_attempt_at <= now {
            envelope.next_attempt_at = None;
            RetryDecision::Requeue(envelope)
        } else {
            envelope.next_attempt_at = Some(next_attempt_at);
            RetryDecision::Delay(envelope)
        }
    }

    /// One pass through the delay queue. The attempt counter is left alone.
    pub fn reevaluate(&self, mut envelope: Envelope, now: DateTime<Utc>) -> RetryDecision {
        if let Some(exhaustion) = self.exhaustion(&envelope, now) {
            return RetryDecision::Drop(exhaustion);
        }

        match envelope.next_attempt_at {
            Some(due) if due > now => RetryDecision::Delay(envelope),
            _ => {
                envelope.next_attempt_at = None;
                RetryDecision::Requeue(envelope)
            }
        }
    }
}
