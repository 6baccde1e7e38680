//! Memory store mirrored to a snapshot file.

use super::memory::MemoryStore;
use metricity_domain::Metric;
use metricity_ports::{
    BoxFuture, LogFields, LogLevel, LoggerPort, MetricStore, SnapshotStore, StoreVariant,
    log_fields,
};
use metricity_shared::{ErrorEnvelope, RequestContext, Result};
use serde_json::json;
use std::sync::Arc;

/// Memory stays authoritative; the snapshot is written through on every
/// successful update when the snapshot asks for it.
pub struct FileStore {
    memory: MemoryStore,
    snapshot: Arc<dyn SnapshotStore>,
    logger: Arc<dyn LoggerPort>,
}

impl FileStore {
    /// Pair a seeded memory store with `snapshot`.
    #[must_use]
    pub fn new(snapshot: Arc<dyn SnapshotStore>, logger: Arc<dyn LoggerPort>) -> Self {
        Self {
            memory: MemoryStore::seeded(),
            snapshot,
            logger,
        }
    }

    async fn persist_one(&self, ctx: &RequestContext, metric: Metric) {
        let id = metric.id.clone();
        let kind = metric.kind;
        if let Err(error) = self.snapshot.save_one(ctx, metric).await {
            self.log_persist_failure(
                &error,
                log_fields([("id", json!(id)), ("kind", json!(kind.as_str()))]),
            );
        }
    }

    async fn persist_all(&self, ctx: &RequestContext, metrics: Vec<Metric>) {
        let count = metrics.len();
        if let Err(error) = self.snapshot.save_all(ctx, metrics).await {
            self.log_persist_failure(&error, log_fields([("count", json!(count))]));
        }
    }

    fn log_persist_failure(&self, error: &ErrorEnvelope, fields: LogFields) {
        self.logger
            .failure(LogLevel::Error, "store.persist.failed", error, Some(fields));
    }
}

impl MetricStore for FileStore {
    fn variant(&self) -> StoreVariant {
        StoreVariant::File
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
            if !self.snapshot.sync_on_write() {
                return self.memory.set_gauge(&id, &raw).await.map(|_| ());
            }
            // The namespace stays locked until the file holds this value.
            let (value, _gauges) = self.memory.set_gauge_locked(&id, &raw).await?;
            self.persist_one(&ctx, Metric::gauge(id, value)).await;
            Ok(())
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
            if !self.snapshot.sync_on_write() {
                return self.memory.add_counter(&id, &raw).await;
            }
            let (total, _counters) = self.memory.add_counter_locked(&id, &raw).await?;
            self.persist_one(&ctx, Metric::counter(id, total)).await;
            Ok(total)
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
            if !self.snapshot.sync_on_write() {
                return self.memory.apply_batch(&metrics).await;
            }
            let (counters, gauges) = self.memory.apply_batch_locked(&metrics).await?;
            let state = counters
                .iter()
                .map(|(id, total)| Metric::counter(id.clone(), *total))
                .chain(gauges.iter().map(|(id, value)| Metric::gauge(id.clone(), *value)))
                .collect();
            self.persist_all(&ctx, state).await;
            Ok(())
        })
    }

    fn get_gauge(&self, ctx: &RequestContext, id: Box<str>) -> BoxFuture<'_, Result<String>> {
        self.memory.get_gauge(ctx, id)
    }

    fn get_counter(&self, ctx: &RequestContext, id: Box<str>) -> BoxFuture<'_, Result<String>> {
        self.memory.get_counter(ctx, id)
    }

    fn all_gauges(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>> {
        self.memory.all_gauges(ctx)
    }

    fn all_counters(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>> {
        self.memory.all_counters(ctx)
    }

    fn ping(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        self.memory.ping(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_sink::MemorySink;
    use crate::logger::JsonLogger;
    use metricity_shared::{ErrorClass, ErrorCode};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingSnapshot {
        sync: bool,
        fail: AtomicBool,
        singles: Mutex<Vec<Metric>>,
        full_saves: Mutex<Vec<usize>>,
    }

    impl SnapshotStore for RecordingSnapshot {
        fn sync_on_write(&self) -> bool {
            self.sync
        }

        fn load(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn save_all(
            &self,
            _ctx: &RequestContext,
            metrics: Vec<Metric>,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.full_saves
                    .lock()
                    .map_err(|_| ErrorEnvelope::invariant(ErrorCode::internal(), "poisoned"))?
                    .push(metrics.len());
                Ok(())
            })
        }

        fn save_one(&self, _ctx: &RequestContext, metric: Metric) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if self.fail.load(Ordering::SeqCst) {
                    return Err(ErrorEnvelope::unexpected(
                        ErrorCode::new("store", "persistence"),
                        "disk full",
                        ErrorClass::NonRetriable,
                    ));
                }
                self.singles
                    .lock()
                    .map_err(|_| ErrorEnvelope::invariant(ErrorCode::internal(), "poisoned"))?
                    .push(metric);
                Ok(())
            })
        }
    }

    fn store_with(snapshot: Arc<RecordingSnapshot>) -> (FileStore, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let logger = Arc::new(JsonLogger::new(sink.clone()));
        (FileStore::new(snapshot, logger), sink)
    }

    #[tokio::test]
    async fn sync_mode_persists_the_updated_metric() -> Result<()> {
        let snapshot = Arc::new(RecordingSnapshot {
            sync: true,
            ..RecordingSnapshot::default()
        });
        let (store, _) = store_with(Arc::clone(&snapshot));
        let ctx = RequestContext::new_request();

        store.update_counter(&ctx, "Requests".into(), "5".into()).await?;
        store.update_counter(&ctx, "Requests".into(), "3".into()).await?;

        let singles = snapshot.singles.lock().map(|items| items.clone()).unwrap_or_default();
        assert_eq!(singles.last(), Some(&Metric::counter("Requests", 8)));
        Ok(())
    }

    #[tokio::test]
    async fn interval_mode_skips_write_through() -> Result<()> {
        let snapshot = Arc::new(RecordingSnapshot::default());
        let (store, _) = store_with(Arc::clone(&snapshot));
        let ctx = RequestContext::new_request();

        store.update_gauge(&ctx, "Temp".into(), "1.5".into()).await?;
        store
            .update_batch(&ctx, vec![Metric::gauge("Temp", 2.0)])
            .await?;

        assert!(snapshot.singles.lock().map(|items| items.is_empty()).unwrap_or(false));
        assert!(snapshot.full_saves.lock().map(|items| items.is_empty()).unwrap_or(false));
        Ok(())
    }

    #[tokio::test]
    async fn sync_batch_persists_full_state() -> Result<()> {
        let snapshot = Arc::new(RecordingSnapshot {
            sync: true,
            ..RecordingSnapshot::default()
        });
        let (store, _) = store_with(Arc::clone(&snapshot));
        let ctx = RequestContext::new_request();

        store
            .update_batch(&ctx, vec![Metric::gauge("Temp", 2.0)])
            .await?;

        let expected = store.all_gauges(&ctx).await?.len() + store.all_counters(&ctx).await?.len();
        let saves = snapshot.full_saves.lock().map(|items| items.clone()).unwrap_or_default();
        assert_eq!(saves, vec![expected]);
        Ok(())
    }

    #[tokio::test]
    async fn persistence_failure_is_logged_not_returned() -> Result<()> {
        let snapshot = Arc::new(RecordingSnapshot {
            sync: true,
            ..RecordingSnapshot::default()
        });
        snapshot.fail.store(true, Ordering::SeqCst);
        let (store, sink) = store_with(Arc::clone(&snapshot));
        let ctx = RequestContext::new_request();

        store.update_gauge(&ctx, "Temp".into(), "2.75".into()).await?;

        assert_eq!(store.get_gauge(&ctx, "Temp".into()).await?, "2.75");
        let lines = sink.take_json();
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0].get("event").and_then(serde_json::Value::as_str),
            Some("store.persist.failed")
        );
        Ok(())
    }
}
