//! Retry timing for delivery attempts.
//!
//! [`RetryPolicy`] is a pure mapping from a failure classification to the
//! delay before a record becomes eligible again. Delays are fixed rather
//! than exponential: a live message is re-rendered on a fixed cadence
//! anyway, so a failed attempt simply rejoins that cadence. The one
//! escalation is the invalid-routing-target case, which waits much longer
//! because the condition may or may not clear on its own.

use std::time::Duration;

use crate::error::FailureClass;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Cadence for re-rendering a live message after a successful attempt.
    pub update_interval: Duration,

    /// Delay after a transient or unknown failure.
    pub retry_delay: Duration,

    /// Escalated delay for an invalid routing target.
    pub invalid_target_delay: Duration,

    /// Upper bound on additive random jitter applied to retry delays.
    /// Zero disables jitter.
    pub retry_jitter_ms: u64,
}

impl Default for RetryPolicy {
    /// Defaults:
    /// - update interval: 5 minutes
    /// - retry delay: 5 minutes
    /// - invalid-target delay: 6 hours
    /// - jitter: none
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(5 * 60),
            retry_delay: Duration::from_secs(5 * 60),
            invalid_target_delay: Duration::from_secs(6 * 60 * 60),
            retry_jitter_ms: 0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next eligible attempt after a failed operation.
    ///
    /// Permanent classifications never reach this (their records are
    /// removed); they fall back to the plain retry delay if they do.
    pub fn backoff(&self, class: &FailureClass, invalid_target: bool) -> Duration {
        let base = if invalid_target {
            self.invalid_target_delay
        } else {
            match class {
                FailureClass::TransientTransport { .. }
                | FailureClass::Unknown { .. }
                | FailureClass::PermanentDestination { .. }
                | FailureClass::PermanentMessage { .. } => self.retry_delay,
            }
        };
        base + jitter_delay(self.retry_jitter_ms)
    }
}

fn jitter_delay(jitter_ms: u64) -> Duration {
    if jitter_ms == 0 {
        return Duration::from_millis(0);
    }
    let jitter = fastrand::u64(0..=jitter_ms);
    Duration::from_millis(jitter)
}
