//! Caller-side deadlines for pipeline steps.
//!
//! Agents have no built-in cancellation. Wrap `assign`/`run`/`sequence` calls
//! to bound their latency; an expired deadline surfaces as
//! [`HyvError::Timeout`] and is handled like any other step failure.

use std::future::Future;
use std::time::Duration;

use crate::error::HyvError;

/// Wrap a future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, HyvError>>,
) -> Result<T, HyvError> {
    tokio::time::timeout(duration, future)
        .await
        .unwrap_or_else(|_| Err(HyvError::Timeout(duration.as_millis() as u64)))
}

/// Method-call form of [`with_timeout`].
pub trait TimeoutExt<T>: Future<Output = Result<T, HyvError>> + Sized {
    fn within(self, duration: Duration) -> impl Future<Output = Result<T, HyvError>> {
        with_timeout(duration, self)
    }
}

impl<T, F> TimeoutExt<T> for F where F: Future<Output = Result<T, HyvError>> {}
