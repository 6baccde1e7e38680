//! Timeouts for work that must finish after cancellation.

use crate::{ErrorClass, ErrorCode, ErrorEnvelope, Result};
use std::future::Future;
use std::time::Duration;

/// Bound a future by `timeout` without observing any cancellation token.
///
/// Used for shutdown work that must still run after the process token fired.
pub async fn timeout_detached<T, F>(timeout: Duration, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or_else(|_| Err(timeout_error(operation, timeout)))
}

fn timeout_error(operation: &'static str, timeout: Duration) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::timeout(),
        format!("operation timed out after {}ms: {operation}", timeout.as_millis()),
        ErrorClass::Retriable,
    )
    .with_metadata("operation", operation)
}
