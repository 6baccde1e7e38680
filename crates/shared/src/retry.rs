//! Bounded retry with capped backoff and cancellation-aware sleeps.

use crate::{ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::Duration;

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts (including the first try).
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// A policy that waits the same delay between every attempt.
    #[must_use]
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let delay_ms = duration_millis(delay);
        Self {
            max_attempts,
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
        }
    }

    /// Delay applied after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(self, attempt: u32) -> Duration {
        let pow = attempt.saturating_sub(1).min(30);
        let grown = self.base_delay_ms.saturating_mul(1u64 << pow);
        Duration::from_millis(grown.min(self.max_delay_ms))
    }
}

const fn duration_millis(delay: Duration) -> u64 {
    let millis = delay.as_millis();
    if millis > u64::MAX as u128 {
        u64::MAX
    } else {
        millis as u64
    }
}

/// Retry with a callback invoked on each retriable failure before sleeping.
///
/// Non-retriable errors and exhaustion of `max_attempts` return the last error.
pub async fn retry_async_with_observer<T, F, Fut, Obs>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    op: &mut F,
    mut on_retry: Obs,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    Obs: FnMut(u32, &ErrorEnvelope),
{
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        ctx.ensure_not_cancelled(operation)?;

        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.class.is_retriable() || attempt >= policy.max_attempts {
                    return Err(error.with_metadata("attempts", attempt.to_string()));
                }

                on_retry(attempt, &error);
                sleep_with_cancellation(ctx, policy.delay_after(attempt), operation).await?;
            },
        }
    }
}

async fn sleep_with_cancellation(
    ctx: &RequestContext,
    delay: Duration,
    operation: &'static str,
) -> Result<()> {
    tokio::select! {
        () = ctx.cancelled() => Err(
            ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
        ),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorClass, ErrorCode};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ErrorEnvelope {
        ErrorEnvelope::unexpected(ErrorCode::timeout(), "timeout", ErrorClass::Retriable)
    }

    #[test]
    fn fixed_policy_never_grows() {
        let policy = RetryPolicy::fixed(4, Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(3), Duration::from_secs(1));
    }

    #[test]
    fn capped_policy_doubles_until_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 35,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(10));
        assert_eq!(policy.delay_after(2), Duration::from_millis(20));
        assert_eq!(policy.delay_after(3), Duration::from_millis(35));
    }

    #[tokio::test]
    async fn retry_stops_after_success() -> Result<()> {
        let ctx = RequestContext::new_request();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_task = Arc::clone(&calls);

        let result = retry_async_with_observer(
            &ctx,
            RetryPolicy::fixed(4, Duration::from_millis(1)),
            "test",
            &mut || async {
                let attempt = calls_task.fetch_add(1, Ordering::Relaxed) + 1;
                if attempt < 3 { Err(transient()) } else { Ok(attempt) }
            },
            |_, _| {},
        )
        .await?;

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        Ok(())
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let ctx = RequestContext::new_request();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_task = Arc::clone(&calls);
        let mut observed = Vec::new();

        let result: Result<()> = retry_async_with_observer(
            &ctx,
            RetryPolicy::fixed(4, Duration::from_millis(1)),
            "test",
            &mut || async {
                calls_task.fetch_add(1, Ordering::Relaxed);
                Err(transient())
            },
            |attempt, _| observed.push(attempt),
        )
        .await;

        let error = result.err().map(|error| error.metadata.get("attempts").cloned());
        assert_eq!(error, Some(Some("4".to_owned())));
        assert_eq!(calls.load(Ordering::Relaxed), 4);
        assert_eq!(observed, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn non_retriable_errors_fail_fast() {
        let ctx = RequestContext::new_request();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_task = Arc::clone(&calls);

        let result: Result<()> = retry_async_with_observer(
            &ctx,
            RetryPolicy::fixed(4, Duration::from_millis(1)),
            "test",
            &mut || async {
                calls_task.fetch_add(1, Ordering::Relaxed);
                Err(ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad"))
            },
            |_, _| {},
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
