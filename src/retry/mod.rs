//! Resilience for remote calls: failure classification and backoff retry.
//!
//! A call is wrapped by [`execute_with_retry`], which invokes it, classifies
//! failures with [`classify`], and either waits and retries or gives up with
//! the original error.

mod backoff;
mod classify;

pub use backoff::{
    backoff_delay, execute_with_retry, safe_execute_with_retry, NoopObserver, RetryNotice,
    RetryObserver, RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_JITTER_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_MS,
};
pub use classify::{classify, classify_message, is_recoverable, ClassifiedError, ErrorKind};
