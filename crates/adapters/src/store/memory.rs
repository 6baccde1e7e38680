//! In-memory metric store.

use metricity_domain::{
    Metric, MetricError, MetricKind, accumulate, format_gauge, parse_counter, parse_gauge,
    seed_metrics,
};
use metricity_ports::{BoxFuture, MetricStore, StoreError, StoreVariant};
use metricity_shared::{ErrorEnvelope, RequestContext, Result};
use std::collections::HashMap;
use tokio::sync::{RwLock, RwLockWriteGuard};

/// Write guard over one namespace, held by callers that must finish a
/// side effect before the next writer to that namespace runs.
pub(crate) type NamespaceGuard<'a, V> = RwLockWriteGuard<'a, HashMap<Box<str>, V>>;

/// Two independent namespaces, each behind its own reader/writer lock.
///
/// Batches take both write locks, counters first, so they never deadlock
/// against single-key writers that hold only one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: RwLock<HashMap<Box<str>, i64>>,
    gauges: RwLock<HashMap<Box<str>, f64>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with the known runtime gauges and
    /// `PollCount`, all at zero.
    #[must_use]
    pub fn seeded() -> Self {
        let mut counters = HashMap::new();
        let mut gauges = HashMap::new();
        for metric in seed_metrics() {
            match metric.kind {
                MetricKind::Counter => {
                    counters.insert(metric.id, metric.delta.unwrap_or_default());
                },
                MetricKind::Gauge => {
                    gauges.insert(metric.id, metric.value.unwrap_or_default());
                },
            }
        }
        Self {
            counters: RwLock::new(counters),
            gauges: RwLock::new(gauges),
        }
    }

    pub(crate) async fn set_gauge(&self, id: &str, raw: &str) -> Result<f64> {
        self.set_gauge_locked(id, raw).await.map(|(value, _)| value)
    }

    /// Replace a gauge and keep the gauge namespace locked.
    pub(crate) async fn set_gauge_locked(
        &self,
        id: &str,
        raw: &str,
    ) -> Result<(f64, NamespaceGuard<'_, f64>)> {
        let value = parse_gauge(id, raw)?;
        let mut gauges = self.gauges.write().await;
        gauges.insert(id.into(), value);
        Ok((value, gauges))
    }

    pub(crate) async fn add_counter(&self, id: &str, raw: &str) -> Result<i64> {
        self.add_counter_locked(id, raw).await.map(|(total, _)| total)
    }

    /// Add to a counter and keep the counter namespace locked.
    pub(crate) async fn add_counter_locked(
        &self,
        id: &str,
        raw: &str,
    ) -> Result<(i64, NamespaceGuard<'_, i64>)> {
        let delta = parse_counter(id, raw)?;
        let mut counters = self.counters.write().await;
        let total = accumulate(id, counters.get(id).copied().unwrap_or_default(), delta)?;
        counters.insert(id.into(), total);
        Ok((total, counters))
    }

    pub(crate) async fn apply_batch(&self, metrics: &[Metric]) -> Result<()> {
        self.apply_batch_locked(metrics).await.map(|_| ())
    }

    /// Apply a batch and keep both namespaces locked.
    pub(crate) async fn apply_batch_locked(
        &self,
        metrics: &[Metric],
    ) -> Result<(NamespaceGuard<'_, i64>, NamespaceGuard<'_, f64>)> {
        let mut counters = self.counters.write().await;
        let mut gauges = self.gauges.write().await;

        let mut next_counters: HashMap<&str, i64> = HashMap::new();
        let mut next_gauges: HashMap<&str, f64> = HashMap::new();
        for metric in metrics {
            metric.validate_for_update()?;
            match (metric.kind, metric.delta, metric.value) {
                (MetricKind::Counter, Some(delta), _) => {
                    let current = match next_counters.get(metric.id.as_ref()) {
                        Some(staged) => *staged,
                        None => counters.get(&metric.id).copied().unwrap_or_default(),
                    };
                    next_counters.insert(&metric.id, accumulate(&metric.id, current, delta)?);
                },
                (MetricKind::Gauge, _, Some(value)) => {
                    next_gauges.insert(&metric.id, value);
                },
                _ => {
                    return Err(MetricError::MissingValue {
                        id: metric.id.to_string(),
                        kind: metric.kind.as_str(),
                    }
                    .into());
                },
            }
        }

        for (id, total) in next_counters {
            counters.insert(id.into(), total);
        }
        for (id, value) in next_gauges {
            gauges.insert(id.into(), value);
        }
        Ok((counters, gauges))
    }

    pub(crate) async fn gauge(&self, id: &str) -> Result<String> {
        self.gauges
            .read()
            .await
            .get(id)
            .map(|value| format_gauge(*value))
            .ok_or_else(|| StoreError::not_found(MetricKind::Gauge, id).into())
    }

    pub(crate) async fn counter(&self, id: &str) -> Result<String> {
        self.counters
            .read()
            .await
            .get(id)
            .map(ToString::to_string)
            .ok_or_else(|| StoreError::not_found(MetricKind::Counter, id).into())
    }

    pub(crate) async fn gauges_snapshot(&self) -> Vec<Metric> {
        self.gauges
            .read()
            .await
            .iter()
            .map(|(id, value)| Metric::gauge(id.clone(), *value))
            .collect()
    }

    pub(crate) async fn counters_snapshot(&self) -> Vec<Metric> {
        self.counters
            .read()
            .await
            .iter()
            .map(|(id, total)| Metric::counter(id.clone(), *total))
            .collect()
    }
}

impl MetricStore for MemoryStore {
    fn variant(&self) -> StoreVariant {
        StoreVariant::Memory
    }

    fn update_gauge(
        &self,
        ctx: &RequestContext,
        id: Box<str>,
        raw: Box<str>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.update_gauge")?;
            self.set_gauge(&id, &raw).await.map(|_| ())
        })
    }

    fn update_counter(
        &self,
        ctx: &RequestContext,
        id: Box<str>,
        raw: Box<str>,
    ) -> BoxFuture<'_, Result<i64>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.update_counter")?;
            self.add_counter(&id, &raw).await
        })
    }

    fn update_batch(
        &self,
        ctx: &RequestContext,
        metrics: Vec<Metric>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.update_batch")?;
            self.apply_batch(&metrics).await
        })
    }

    fn get_gauge(&self, ctx: &RequestContext, id: Box<str>) -> BoxFuture<'_, Result<String>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.get_gauge")?;
            self.gauge(&id).await
        })
    }

    fn get_counter(&self, ctx: &RequestContext, id: Box<str>) -> BoxFuture<'_, Result<String>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.get_counter")?;
            self.counter(&id).await
        })
    }

    fn all_gauges(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.all_gauges")?;
            Ok(self.gauges_snapshot().await)
        })
    }

    fn all_counters(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.all_counters")?;
            Ok(self.counters_snapshot().await)
        })
    }

    fn ping(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok::<(), ErrorEnvelope>(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricity_domain::KNOWN_GAUGE_IDS;

    #[tokio::test]
    async fn seeded_store_reports_zeroes() -> Result<()> {
        let store = MemoryStore::seeded();
        let ctx = RequestContext::new_request();

        assert_eq!(store.get_counter(&ctx, "PollCount".into()).await?, "0");
        for id in KNOWN_GAUGE_IDS {
            assert_eq!(store.get_gauge(&ctx, id.into()).await?, "0");
        }
        assert_eq!(store.all_gauges(&ctx).await?.len(), KNOWN_GAUGE_IDS.len());
        Ok(())
    }

    #[tokio::test]
    async fn namespaces_are_independent() -> Result<()> {
        let store = MemoryStore::new();
        let ctx = RequestContext::new_request();

        store.update_gauge(&ctx, "Shared".into(), "1.5".into()).await?;
        store.update_counter(&ctx, "Shared".into(), "4".into()).await?;

        assert_eq!(store.get_gauge(&ctx, "Shared".into()).await?, "1.5");
        assert_eq!(store.get_counter(&ctx, "Shared".into()).await?, "4");
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_counters_in_one_batch_accumulate() -> Result<()> {
        let store = MemoryStore::new();
        let ctx = RequestContext::new_request();

        store
            .update_batch(
                &ctx,
                vec![
                    Metric::counter("Requests", 2),
                    Metric::counter("Requests", 3),
                    Metric::gauge("Temp", 1.0),
                    Metric::gauge("Temp", 2.0),
                ],
            )
            .await?;

        assert_eq!(store.get_counter(&ctx, "Requests".into()).await?, "5");
        assert_eq!(store.get_gauge(&ctx, "Temp".into()).await?, "2");
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let store = MemoryStore::new();
        let ctx = RequestContext::new_request();
        ctx.cancel();

        let error = store
            .update_gauge(&ctx, "Temp".into(), "1".into())
            .await
            .err();
        assert!(error.is_some_and(|error| error.is_cancelled()));
    }
}
