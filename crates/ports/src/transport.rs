//! Metric delivery boundary contract.

use crate::BoxFuture;
use metricity_domain::Metric;
use metricity_shared::{RequestContext, Result};
use std::fmt;
use std::sync::Arc;

/// Role of a delivery endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRole {
    /// Tried first, with retries.
    Primary,
    /// Tried once after the primary's retry budget is spent.
    Fallback,
}

impl fmt::Display for TargetRole {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => formatter.write_str("primary"),
            Self::Fallback => formatter.write_str("fallback"),
        }
    }
}

/// A collector endpoint, as a base URL such as `http://127.0.0.1:8080/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    /// Primary or fallback.
    pub role: TargetRole,
    /// Base URL of the collector.
    pub base_url: Arc<str>,
}

impl DeliveryTarget {
    /// Build a target.
    pub fn new(role: TargetRole, base_url: impl Into<Arc<str>>) -> Self {
        Self {
            role,
            base_url: base_url.into(),
        }
    }
}

/// Boundary contract for shipping one batch to one collector.
///
/// Implementations classify every network failure and non-success response
/// as retriable; the caller owns the retry schedule.
pub trait MetricsTransport: Send + Sync {
    /// Send `batch` to `target` once.
    fn send_batch(
        &self,
        ctx: &RequestContext,
        target: DeliveryTarget,
        batch: Arc<[Metric]>,
    ) -> BoxFuture<'_, Result<()>>;
}
