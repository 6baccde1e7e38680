//! Store boundary used by the HTTP handlers.
//!
//! Decoded metrics are validated and, when a key is configured, their
//! signatures checked before anything reaches the store. Responses carrying
//! a value are signed with the same key.

use metricity_domain::{
    Metric, MetricError, MetricKind, attach_signature, format_gauge, parse_counter, parse_gauge,
    verify,
};
use metricity_ports::{LogLevel, LoggerPort, MetricStore, log_fields};
use metricity_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString};
use std::sync::Arc;

/// Dependencies required by the metrics service.
#[derive(Clone)]
pub struct MetricsServiceDeps {
    /// Backing store.
    pub store: Arc<dyn MetricStore>,
    /// Signing key; `None` disables signing and verification.
    pub key: Option<SecretString>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Validates, verifies and dispatches metric updates and reads.
#[derive(Clone)]
pub struct MetricsService {
    deps: MetricsServiceDeps,
}

impl MetricsService {
    /// Build the service.
    #[must_use]
    pub const fn new(deps: MetricsServiceDeps) -> Self {
        Self { deps }
    }

    /// Backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.deps.store
    }

    /// Apply one decoded metric.
    ///
    /// Returns the metric as stored: counters carry the new running total.
    pub async fn update_metric(&self, ctx: &RequestContext, metric: Metric) -> Result<Metric> {
        metric.validate_for_update()?;
        self.check_signature(&metric)?;

        let stored = match (metric.kind, metric.delta, metric.value) {
            (MetricKind::Counter, Some(delta), _) => {
                let total = self
                    .deps
                    .store
                    .update_counter(ctx, metric.id.clone(), delta.to_string().into())
                    .await?;
                Metric::counter(metric.id, total)
            },
            (MetricKind::Gauge, _, Some(value)) => {
                self.deps
                    .store
                    .update_gauge(ctx, metric.id.clone(), format_gauge(value).into())
                    .await?;
                Metric::gauge(metric.id, value)
            },
            _ => return Err(missing_value(&metric)),
        };
        self.signed(stored)
    }

    /// Apply an update addressed as `/{kind}/{id}/{raw}`.
    pub async fn update_path(
        &self,
        ctx: &RequestContext,
        kind: &str,
        id: &str,
        raw: &str,
    ) -> Result<()> {
        let kind = MetricKind::parse(kind)?;
        if id.trim().is_empty() {
            return Err(MetricError::EmptyId.into());
        }
        match kind {
            MetricKind::Counter => self
                .deps
                .store
                .update_counter(ctx, id.into(), raw.into())
                .await
                .map(|_| ()),
            MetricKind::Gauge => self.deps.store.update_gauge(ctx, id.into(), raw.into()).await,
        }
    }

    /// Apply a batch all-or-nothing and return it unchanged.
    ///
    /// Every entry is validated and verified before the store sees any of them.
    pub async fn update_batch(
        &self,
        ctx: &RequestContext,
        metrics: Vec<Metric>,
    ) -> Result<Vec<Metric>> {
        for metric in &metrics {
            metric.validate_for_update()?;
            self.check_signature(metric)?;
        }
        self.deps.store.update_batch(ctx, metrics.clone()).await?;
        Ok(metrics)
    }

    /// Fill a `{id, type}` query with the current value.
    pub async fn get_metric(&self, ctx: &RequestContext, query: Metric) -> Result<Metric> {
        if query.id.trim().is_empty() {
            return Err(MetricError::EmptyId.into());
        }
        let raw = self.read(ctx, query.kind, query.id.clone()).await?;
        let metric = match query.kind {
            MetricKind::Counter => {
                let total = parse_counter(&query.id, &raw).map_err(|error| corrupt_value(&error))?;
                Metric::counter(query.id, total)
            },
            MetricKind::Gauge => {
                let value = parse_gauge(&query.id, &raw).map_err(|error| corrupt_value(&error))?;
                Metric::gauge(query.id, value)
            },
        };
        self.signed(metric)
    }

    /// Current value rendered as plain text.
    pub async fn get_raw(&self, ctx: &RequestContext, kind: &str, id: &str) -> Result<String> {
        let kind = MetricKind::parse(kind)?;
        self.read(ctx, kind, id.into()).await
    }

    /// Check that the store answers.
    pub async fn ping(&self, ctx: &RequestContext) -> Result<()> {
        self.deps.store.ping(ctx).await
    }

    async fn read(&self, ctx: &RequestContext, kind: MetricKind, id: Box<str>) -> Result<String> {
        match kind {
            MetricKind::Counter => self.deps.store.get_counter(ctx, id).await,
            MetricKind::Gauge => self.deps.store.get_gauge(ctx, id).await,
        }
    }

    fn check_signature(&self, metric: &Metric) -> Result<()> {
        let Some(key) = self.deps.key.as_ref() else {
            return Ok(());
        };
        verify(metric, key).map_err(|error| {
            let envelope = ErrorEnvelope::from(error);
            if let Some(logger) = self.deps.logger.as_ref() {
                logger.failure(
                    LogLevel::Warn,
                    "service.signature.rejected",
                    &envelope,
                    Some(log_fields([
                        ("id", (&*metric.id).into()),
                        ("kind", metric.kind.as_str().into()),
                    ])),
                );
            }
            envelope
        })
    }

    fn signed(&self, mut metric: Metric) -> Result<Metric> {
        if let Some(key) = self.deps.key.as_ref() {
            attach_signature(&mut metric, key)?;
        }
        Ok(metric)
    }
}

fn missing_value(metric: &Metric) -> ErrorEnvelope {
    MetricError::MissingValue {
        id: metric.id.to_string(),
        kind: metric.kind.as_str(),
    }
    .into()
}

fn corrupt_value(error: &MetricError) -> ErrorEnvelope {
    ErrorEnvelope::invariant(
        ErrorCode::new("store", "corrupt_value"),
        format!("stored value is unreadable: {error}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricity_domain::sign;
    use metricity_ports::{BoxFuture, StoreVariant};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Minimal store: counters add, gauges replace, batches apply in order.
    #[derive(Default)]
    struct TableStore {
        counters: Mutex<HashMap<Box<str>, i64>>,
        gauges: Mutex<HashMap<Box<str>, String>>,
    }

    impl MetricStore for TableStore {
        fn variant(&self) -> StoreVariant {
            StoreVariant::Memory
        }

        fn update_gauge(
            &self,
            _ctx: &RequestContext,
            id: Box<str>,
            raw: Box<str>,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                parse_gauge(&id, &raw)?;
                self.gauges.lock().expect("lock").insert(id, raw.into());
                Ok(())
            })
        }

        fn update_counter(
            &self,
            _ctx: &RequestContext,
            id: Box<str>,
            raw: Box<str>,
        ) -> BoxFuture<'_, Result<i64>> {
            Box::pin(async move {
                let delta = parse_counter(&id, &raw)?;
                let mut counters = self.counters.lock().expect("lock");
                let total = counters.entry(id).or_default();
                *total += delta;
                Ok(*total)
            })
        }

        fn update_batch(
            &self,
            _ctx: &RequestContext,
            metrics: Vec<Metric>,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                for metric in metrics {
                    if let Some(delta) = metric.delta {
                        *self.counters.lock().expect("lock").entry(metric.id).or_default() += delta;
                    } else if let Some(value) = metric.value {
                        self.gauges
                            .lock()
                            .expect("lock")
                            .insert(metric.id, format_gauge(value));
                    }
                }
                Ok(())
            })
        }

        fn get_gauge(&self, _ctx: &RequestContext, id: Box<str>) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move {
                self.gauges
                    .lock()
                    .expect("lock")
                    .get(&id)
                    .cloned()
                    .ok_or_else(not_found)
            })
        }

        fn get_counter(
            &self,
            _ctx: &RequestContext,
            id: Box<str>,
        ) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move {
                self.counters
                    .lock()
                    .expect("lock")
                    .get(&id)
                    .map(ToString::to_string)
                    .ok_or_else(not_found)
            })
        }

        fn all_gauges(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn all_counters(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn ping(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn not_found() -> ErrorEnvelope {
        ErrorEnvelope::expected(ErrorCode::new("store", "not_found"), "missing")
    }

    fn service(key: Option<&str>) -> MetricsService {
        MetricsService::new(MetricsServiceDeps {
            store: Arc::new(TableStore::default()),
            key: key.map(SecretString::from),
            logger: None,
        })
    }

    #[tokio::test]
    async fn counter_updates_return_running_total() -> Result<()> {
        let ctx = RequestContext::new_request();
        let service = service(None);

        service.update_metric(&ctx, Metric::counter("Requests", 5)).await?;
        let stored = service.update_metric(&ctx, Metric::counter("Requests", 3)).await?;

        assert_eq!(stored.delta, Some(8));
        assert_eq!(service.get_raw(&ctx, "counter", "Requests").await?, "8");
        Ok(())
    }

    #[tokio::test]
    async fn keyed_service_rejects_bad_signatures_without_writing() -> Result<()> {
        let ctx = RequestContext::new_request();
        let service = service(Some("secret"));
        let mut metric = Metric::gauge("Temp", 1.5);
        metric.signature = Some("00ff".into());

        let error = service.update_metric(&ctx, metric).await.err();

        assert!(error.is_some_and(|error| error.code.is("metric", "signature_mismatch")));
        assert!(service.get_raw(&ctx, "gauge", "Temp").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn keyed_service_signs_responses() -> Result<()> {
        let ctx = RequestContext::new_request();
        let key = SecretString::from("secret");
        let service = service(Some("secret"));
        let mut metric = Metric::gauge("Temp", 2.75);
        attach_signature(&mut metric, &key)?;

        service.update_metric(&ctx, metric).await?;
        let read = service
            .get_metric(&ctx, Metric::query("Temp", MetricKind::Gauge))
            .await?;

        assert_eq!(read.value, Some(2.75));
        assert_eq!(read.signature.as_deref(), Some(sign(&read, &key)?.as_str()));
        Ok(())
    }

    #[tokio::test]
    async fn unkeyed_service_ignores_any_signature() -> Result<()> {
        let ctx = RequestContext::new_request();
        let service = service(None);
        let mut metric = Metric::counter("Requests", 1);
        metric.signature = Some(String::new().into_boxed_str());

        let stored = service.update_metric(&ctx, metric).await?;
        assert_eq!(stored.signature, None);
        Ok(())
    }

    #[tokio::test]
    async fn batch_with_one_bad_signature_applies_nothing() -> Result<()> {
        let ctx = RequestContext::new_request();
        let key = SecretString::from("secret");
        let service = service(Some("secret"));
        let mut good = Metric::counter("Requests", 2);
        attach_signature(&mut good, &key)?;
        let bad = Metric::counter("Requests", 3);

        let result = service.update_batch(&ctx, vec![good, bad]).await;

        assert!(result.is_err());
        assert!(service.get_raw(&ctx, "counter", "Requests").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn path_updates_reject_unknown_kinds() {
        let ctx = RequestContext::new_request();
        let error = service(None)
            .update_path(&ctx, "histogram", "Latency", "3")
            .await
            .err();

        assert!(error.is_some_and(|error| error.code.is("metric", "unknown_kind")));
    }

    #[tokio::test]
    async fn path_updates_parse_raw_values() -> Result<()> {
        let ctx = RequestContext::new_request();
        let service = service(None);

        service.update_path(&ctx, "gauge", "Temp", "1.5").await?;
        service.update_path(&ctx, "gauge", "Temp", "2.75").await?;
        let bad = service.update_path(&ctx, "counter", "Requests", "1.5").await;

        assert_eq!(service.get_raw(&ctx, "gauge", "Temp").await?, "2.75");
        assert!(bad.is_err_and(|error| error.code.is("metric", "parse_value")));
        Ok(())
    }
}
