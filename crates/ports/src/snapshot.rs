//! Persisted snapshot boundary contract.

use crate::BoxFuture;
use metricity_domain::Metric;
use metricity_shared::{RequestContext, Result};

/// Durable full-state snapshot of a metric store.
pub trait SnapshotStore: Send + Sync {
    /// True when every successful single-key update must be persisted
    /// immediately (the configured save interval is zero).
    fn sync_on_write(&self) -> bool;

    /// Read the whole persisted set. A missing or empty snapshot yields no metrics.
    fn load(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>>;

    /// Overwrite the persisted set with `metrics`.
    fn save_all(&self, ctx: &RequestContext, metrics: Vec<Metric>) -> BoxFuture<'_, Result<()>>;

    /// Merge one metric into the persisted set, replacing the entry with the
    /// same id and kind or appending it.
    fn save_one(&self, ctx: &RequestContext, metric: Metric) -> BoxFuture<'_, Result<()>>;
}
