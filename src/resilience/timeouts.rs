//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound the TLS handshake and the backend dial
//! - Keep timeout errors distinct from the I/O errors of the wrapped call

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// The wrapped operation did not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{operation} timed out after {after:?}")]
pub struct TimeoutError {
    pub operation: &'static str,
    pub after: Duration,
}

/// Run `fut` with a deadline, naming the operation for the error message.
pub async fn with_timeout<F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| TimeoutError { operation, after })
}
