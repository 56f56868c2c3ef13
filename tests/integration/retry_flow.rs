//! Retry behaviour around simulated remote calls.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use taskward::retry::{
    classify, execute_with_retry, safe_execute_with_retry, ErrorKind, NoopObserver, RetryNotice,
};
use taskward::Error;

use crate::fixtures::{fast_policy, slow_remote, FlakyRemote};

#[tokio::test(start_paused = true)]
async fn test_bad_gateway_twice_then_success() {
    let remote = &FlakyRemote::new(2, "HTTP 502: Bad Gateway");
    let policy = fast_policy(3);

    let result = execute_with_retry(move || remote.call(), &policy, &NoopObserver).await;

    assert_eq!(result.unwrap(), "response #3");
    assert_eq!(remote.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_is_not_retried() {
    let remote = &FlakyRemote::new(5, "HTTP 404: Not Found");
    let start = Instant::now();

    let err = execute_with_retry(move || remote.call(), &fast_policy(5), &NoopObserver)
        .await
        .unwrap_err();

    assert_eq!(remote.calls(), 1);
    assert_eq!(err.to_string(), "HTTP 404: Not Found");
    assert_eq!(classify(&err).kind, ErrorKind::NotFound);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_returns_last_error_unwrapped() {
    let remote = &FlakyRemote::new(10, "socket hang up");

    let err = execute_with_retry(move || remote.call(), &fast_policy(4), &NoopObserver)
        .await
        .unwrap_err();

    assert_eq!(remote.calls(), 4);
    assert!(matches!(err, Error::Remote(ref m) if m == "socket hang up"));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_waits_grow_between_attempts() {
    let remote = &FlakyRemote::new(3, "ECONNRESET");
    let delays = Mutex::new(Vec::new());
    let observer = |notice: &RetryNotice<'_>| {
        delays.lock().unwrap().push(notice.delay);
    };
    let start = Instant::now();

    execute_with_retry(move || remote.call(), &fast_policy(4), &observer)
        .await
        .unwrap();

    let delays = delays.into_inner().unwrap();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400)
        ]
    );
    assert_eq!(start.elapsed(), Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_waits_for_retry_after() {
    let remote = &FlakyRemote::new(1, "API rate limit exceeded, retry-after: 5");
    let start = Instant::now();

    let result = execute_with_retry(move || remote.call(), &fast_policy(3), &NoopObserver).await;

    assert!(result.is_ok());
    assert_eq!(remote.calls(), 2);
    assert_eq!(start.elapsed(), Duration::from_millis(5_000));
}

#[tokio::test(start_paused = true)]
async fn test_hung_attempt_times_out_and_is_retried() {
    let policy = fast_policy(2).with_attempt_timeout(Duration::from_secs(1));
    let attempts = Mutex::new(0u32);

    let result = execute_with_retry(
        || {
            let mut n = attempts.lock().unwrap();
            *n += 1;
            let delay = if *n == 1 {
                Duration::from_secs(60)
            } else {
                Duration::ZERO
            };
            slow_remote(delay)
        },
        &policy,
        &NoopObserver,
    )
    .await;

    assert_eq!(result.unwrap(), "late");
    assert_eq!(*attempts.lock().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_safe_variant_swallows_terminal_failure() {
    let remote = &FlakyRemote::new(1, "HTTP 401: Bad credentials");
    let result = safe_execute_with_retry(move || remote.call(), &fast_policy(3)).await;
    assert!(result.is_none());
    assert_eq!(remote.calls(), 1);
}
