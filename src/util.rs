//! Shared utility functions.

use std::future::Future;
use std::time::Duration;

use tokio::task::spawn_blocking;
use tokio::time::timeout;

use crate::{Error, Result};

pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?
}

/// Await `fut`, failing with [`Error::Timeout`] once `duration` elapses.
///
/// The error type only needs to absorb a crate [`Error`], so remote-call
/// adapters with their own error types can still be bounded.
pub async fn with_timeout<F, T, E>(duration: Duration, fut: F) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: From<Error>,
{
    match timeout(duration, fut).await {
        Ok(inner) => inner,
        Err(_) => Err(E::from(Error::Timeout(duration))),
    }
}
