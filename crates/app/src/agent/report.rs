//! Batch signing and delivery with retry and fallback.

use metricity_domain::{Metric, attach_signature};
use metricity_ports::{DeliveryTarget, LogLevel, LoggerPort, MetricsTransport, TargetRole, log_fields};
use metricity_shared::{RequestContext, Result, RetryPolicy, SecretString, retry_async_with_observer};
use std::sync::Arc;

/// Attempts against the primary collector.
pub const PRIMARY_ATTEMPTS: u32 = 4;

/// Sign every metric in place when a key is configured.
pub fn sign_batch(batch: &mut [Metric], key: Option<&SecretString>) -> Result<()> {
    if let Some(key) = key {
        for metric in batch {
            attach_signature(metric, key)?;
        }
    }
    Ok(())
}

/// Where and how a batch is delivered.
#[derive(Debug, Clone)]
pub struct DeliveryPlan {
    /// Collector tried first.
    pub primary: DeliveryTarget,
    /// Collector tried once after the primary's attempts are spent.
    pub fallback: Option<DeliveryTarget>,
    /// Schedule for the primary.
    pub retry: RetryPolicy,
}

/// Deliver `batch`, returning the role of the collector that accepted it.
///
/// The primary gets `plan.retry.max_attempts` attempts; the fallback, when
/// configured, gets one. The last error is returned when both are exhausted.
pub async fn deliver(
    ctx: &RequestContext,
    transport: &dyn MetricsTransport,
    plan: &DeliveryPlan,
    batch: Arc<[Metric]>,
    logger: Option<&dyn LoggerPort>,
) -> Result<TargetRole> {
    let mut send_primary = || transport.send_batch(ctx, plan.primary.clone(), Arc::clone(&batch));
    let primary = retry_async_with_observer(
        ctx,
        plan.retry,
        "agent.deliver.primary",
        &mut send_primary,
        |attempt, error| {
            if let Some(logger) = logger {
                logger.failure(
                    LogLevel::Warn,
                    "agent.report.attempt_failed",
                    error,
                    Some(log_fields([
                        ("attempt", attempt.into()),
                        ("target", TargetRole::Primary.to_string().into()),
                    ])),
                );
            }
        },
    )
    .await;

    let primary_error = match primary {
        Ok(()) => return Ok(TargetRole::Primary),
        Err(error) if error.is_cancelled() => return Err(error),
        Err(error) => error,
    };

    let Some(fallback) = plan.fallback.clone() else {
        return Err(primary_error);
    };
    if let Some(logger) = logger {
        logger.failure(
            LogLevel::Warn,
            "agent.report.fallback",
            &primary_error,
            Some(log_fields([("url", (&*fallback.base_url).into())])),
        );
    }
    transport.send_batch(ctx, fallback, batch).await?;
    Ok(TargetRole::Fallback)
}
