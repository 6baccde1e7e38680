//! Durability bridge between a metric store and its snapshot file.
//!
//! Restores once before traffic is accepted, saves on a clock, and makes a
//! final bounded save when the process context is cancelled.

use metricity_domain::{Metric, MetricKind};
use metricity_ports::{LogLevel, LoggerPort, MetricStore, SnapshotStore, log_fields};
use metricity_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result, timeout_detached};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Default bound on the shutdown save.
pub const DEFAULT_FINAL_SAVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing and restore switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurabilitySettings {
    /// Period between saves; zero disables the clock.
    pub interval: Duration,
    /// Replay the snapshot into the store on startup.
    pub restore: bool,
    /// Bound on the save made after cancellation.
    pub final_save_timeout: Duration,
}

impl Default for DurabilitySettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            restore: true,
            final_save_timeout: DEFAULT_FINAL_SAVE_TIMEOUT,
        }
    }
}

/// Dependencies required by the bridge.
#[derive(Clone)]
pub struct DurabilityDeps {
    /// Store whose state is persisted.
    pub store: Arc<dyn MetricStore>,
    /// Snapshot file.
    pub snapshot: Arc<dyn SnapshotStore>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Periodic save and one-shot restore for a store.
pub struct DurabilityBridge {
    deps: DurabilityDeps,
    settings: DurabilitySettings,
    restored: AtomicBool,
}

impl DurabilityBridge {
    /// Build a bridge.
    #[must_use]
    pub const fn new(deps: DurabilityDeps, settings: DurabilitySettings) -> Self {
        Self {
            deps,
            settings,
            restored: AtomicBool::new(false),
        }
    }

    /// Configured settings.
    #[must_use]
    pub const fn settings(&self) -> DurabilitySettings {
        self.settings
    }

    /// Replay the snapshot into the store.
    ///
    /// Returns the number of metrics replayed. An unreadable snapshot is
    /// logged and restores nothing; entries the store rejects are skipped.
    /// May run only once per bridge.
    #[tracing::instrument(name = "durability.restore", skip_all)]
    pub async fn restore(&self, ctx: &RequestContext) -> Result<usize> {
        if self.restored.swap(true, Ordering::SeqCst) {
            return Err(ErrorEnvelope::invariant(
                ErrorCode::new("durability", "already_restored"),
                "snapshot restore may run only once",
            ));
        }
        if !self.settings.restore {
            return Ok(0);
        }

        let metrics = match self.deps.snapshot.load(ctx).await {
            Ok(metrics) => metrics,
            Err(error) => {
                // An unreadable snapshot starts the server empty.
                self.log_failure("durability.restore.failed", &error);
                return Ok(0);
            },
        };
        let mut replayed = 0usize;
        for metric in metrics {
            let id = metric.id.clone();
            match self.replay(ctx, metric).await {
                Ok(()) => replayed += 1,
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => {
                    if let Some(logger) = self.deps.logger.as_ref() {
                        logger.failure(
                            LogLevel::Warn,
                            "durability.restore.entry_skipped",
                            &error,
                            Some(log_fields([("id", id.as_ref().into())])),
                        );
                    }
                },
            }
        }

        if let Some(logger) = self.deps.logger.as_ref() {
            logger.info(
                "durability.restore.completed",
                "Snapshot restored",
                Some(log_fields([("metrics", replayed.into())])),
            );
        }
        Ok(replayed)
    }

    /// Write the full store state to the snapshot.
    ///
    /// Returns the number of metrics written.
    #[tracing::instrument(name = "durability.save", skip_all)]
    pub async fn save(&self, ctx: &RequestContext) -> Result<usize> {
        let mut metrics = self.deps.store.all_counters(ctx).await?;
        metrics.extend(self.deps.store.all_gauges(ctx).await?);
        let count = metrics.len();
        self.deps.snapshot.save_all(ctx, metrics).await?;
        Ok(count)
    }

    /// Save on every tick until `ctx` is cancelled, then save once more.
    ///
    /// Failures are logged; serving continues.
    pub async fn run(&self, ctx: &RequestContext) {
        if !self.settings.interval.is_zero() {
            let mut ticker = tokio::time::interval(self.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = ctx.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = self.save(ctx).await {
                            self.log_failure("durability.save.failed", &error);
                        }
                    }
                }
            }
        } else {
            ctx.cancelled().await;
        }

        // The process context is already cancelled; save on a fresh one.
        let final_ctx = RequestContext::new_request();
        let saved = timeout_detached(
            self.settings.final_save_timeout,
            "durability.final_save",
            self.save(&final_ctx),
        )
        .await;
        match saved {
            Ok(count) => {
                if let Some(logger) = self.deps.logger.as_ref() {
                    logger.info(
                        "durability.final_save.completed",
                        "Final snapshot written",
                        Some(log_fields([("metrics", count.into())])),
                    );
                }
            },
            Err(error) => self.log_failure("durability.final_save.failed", &error),
        }
    }

    async fn replay(&self, ctx: &RequestContext, metric: Metric) -> Result<()> {
        let Some(raw) = metric.raw_value() else {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("durability", "invalid_snapshot"),
                format!("snapshot entry {} carries no value", metric.id),
            ));
        };
        match metric.kind {
            MetricKind::Counter => self
                .deps
                .store
                .update_counter(ctx, metric.id, raw.into())
                .await
                .map(|_| ()),
            MetricKind::Gauge => self.deps.store.update_gauge(ctx, metric.id, raw.into()).await,
        }
    }

    fn log_failure(&self, event: &str, error: &ErrorEnvelope) {
        if let Some(logger) = self.deps.logger.as_ref() {
            logger.failure(LogLevel::Error, event, error, None);
        }
    }
}
