//! Bounded exponential-backoff retry for remote calls.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::classify::{classify, ClassifiedError};
use crate::util::with_timeout;
use crate::{twlog_debug, twlog_warn, Error};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_JITTER_MS: u64 = 500;

/// Retry limits for one call site.
///
/// Immutable once built; the `with_*` helpers return a modified copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each later one.
    pub base_delay_ms: u64,
    /// Ceiling for the exponential part of the delay.
    pub max_delay_ms: u64,
    /// Upper bound (exclusive) of the uniform random delay added to each wait.
    pub jitter_ms: u64,
    /// Per-attempt timeout. A timed-out attempt fails with [`Error::Timeout`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_ms: DEFAULT_JITTER_MS,
            attempt_timeout_ms: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }

    pub fn with_delays(self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            ..self
        }
    }

    pub fn with_jitter(self, jitter_ms: u64) -> Self {
        Self { jitter_ms, ..self }
    }

    pub fn with_attempt_timeout(self, timeout: Duration) -> Self {
        Self {
            attempt_timeout_ms: Some(timeout.as_millis() as u64),
            ..self
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> u64 {
        backoff_delay(attempt, self.base_delay_ms, self.max_delay_ms, self.jitter_ms)
    }
}

/// `min(base * 2^(attempt-1), max) + uniform[0, jitter)`, in milliseconds.
///
/// Attempt 1 uses the un-doubled base. Overflow saturates at `max`.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64, jitter_ms: u64) -> u64 {
    let exponent = attempt.saturating_sub(1);
    let exponential = 1u64
        .checked_shl(exponent)
        .map(|factor| base_ms.saturating_mul(factor))
        .unwrap_or(u64::MAX);
    let capped = exponential.min(max_ms);

    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..jitter_ms)
    };
    capped.saturating_add(jitter)
}

/// Details passed to a [`RetryObserver`] before each wait.
pub struct RetryNotice<'a> {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: &'a dyn fmt::Display,
    pub classified: ClassifiedError,
    pub delay: Duration,
}

/// Hook fired synchronously before each backoff wait.
pub trait RetryObserver {
    fn on_retry(&self, notice: &RetryNotice<'_>);
}

impl<F> RetryObserver for F
where
    F: Fn(&RetryNotice<'_>),
{
    fn on_retry(&self, notice: &RetryNotice<'_>) {
        self(notice)
    }
}

/// Observer that ignores every notice.
pub struct NoopObserver;

impl RetryObserver for NoopObserver {
    fn on_retry(&self, _notice: &RetryNotice<'_>) {}
}

/// Run `operation` until it succeeds, fails terminally, or exhausts the policy.
///
/// The final error is the last underlying one, never wrapped. Non-recoverable
/// failures propagate on first occurrence with zero retries. The only
/// suspension between attempts is the backoff wait.
pub async fn execute_with_retry<T, E, F, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
    observer: &dyn RetryObserver,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + From<Error>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = match policy.attempt_timeout_ms {
            Some(ms) => with_timeout(Duration::from_millis(ms), operation()).await,
            None => operation().await,
        };

        let error = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    twlog_debug!("retry: succeeded on attempt {}/{}", attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let classified = classify(&error);
        if !classified.recoverable {
            twlog_debug!(
                "retry: {} error is terminal, not retrying: {}",
                classified.kind,
                error
            );
            return Err(error);
        }

        if attempt >= max_attempts {
            twlog_warn!(
                "retry: giving up after {} attempts ({}): {}",
                attempt,
                classified.kind,
                error
            );
            return Err(error);
        }

        let delay_ms = classified
            .retry_after_ms
            .unwrap_or_else(|| policy.delay_for(attempt));
        let delay = Duration::from_millis(delay_ms);

        twlog_debug!(
            "retry: attempt {}/{} failed ({}), waiting {}ms: {}",
            attempt,
            max_attempts,
            classified.kind,
            delay_ms,
            error
        );
        observer.on_retry(&RetryNotice {
            attempt,
            max_attempts,
            error: &error,
            classified,
            delay,
        });

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Like [`execute_with_retry`] but returns `None` for any final failure.
pub async fn safe_execute_with_retry<T, E, F, Fut>(operation: F, policy: &RetryPolicy) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + From<Error>,
{
    execute_with_retry(operation, policy, &NoopObserver)
        .await
        .ok()
}
