//! Collector agent: a sampling clock and a reporting clock over one sample set.
//!
//! Sampling and report snapshotting serialize through the sample-set mutex;
//! network I/O happens after the lock is released.

mod report;
mod samples;

pub use report::{DeliveryPlan, PRIMARY_ATTEMPTS, deliver, sign_batch};
pub use samples::SampleSet;

use metricity_domain::Metric;
use metricity_ports::{LogLevel, LoggerPort, MetricsTransport, RuntimeStatsSource, TargetRole, log_fields};
use metricity_shared::{RequestContext, Result, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

/// Agent clocks, delivery plan and signing key.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Period of the sampling clock.
    pub poll_interval: Duration,
    /// Period of the reporting clock.
    pub report_interval: Duration,
    /// Targets and retry schedule.
    pub delivery: DeliveryPlan,
    /// Signing key; `None` sends unsigned batches.
    pub key: Option<SecretString>,
}

/// Dependencies required by the agent.
#[derive(Clone)]
pub struct AgentDeps {
    /// Runtime statistics source.
    pub stats: Arc<dyn RuntimeStatsSource>,
    /// Batch delivery.
    pub transport: Arc<dyn MetricsTransport>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Collector agent owning its sample set.
pub struct Agent {
    deps: AgentDeps,
    settings: AgentSettings,
    samples: Mutex<SampleSet>,
}

impl Agent {
    /// Build an agent with an empty sample set.
    #[must_use]
    pub fn new(deps: AgentDeps, settings: AgentSettings) -> Self {
        Self {
            deps,
            settings,
            samples: Mutex::new(SampleSet::new()),
        }
    }

    /// Configured settings.
    #[must_use]
    pub const fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Take one sample. Never fails.
    pub async fn sample_once(&self) {
        let stats = self.deps.stats.read();
        let random_value = rand::random::<f64>();
        self.samples.lock().await.record(&stats, random_value);
    }

    /// Copy of the current sample set.
    pub async fn samples(&self) -> SampleSet {
        self.samples.lock().await.clone()
    }

    /// Snapshot, sign and deliver the current sample set.
    ///
    /// Returns the role of the collector that accepted the batch.
    #[tracing::instrument(name = "agent.report", skip_all)]
    pub async fn report_once(&self, ctx: &RequestContext) -> Result<TargetRole> {
        let mut batch = self.samples.lock().await.to_batch();
        sign_batch(&mut batch, self.settings.key.as_ref())?;
        let batch: Arc<[Metric]> = Arc::from(batch);
        let size = batch.len();

        let role = deliver(
            ctx,
            self.deps.transport.as_ref(),
            &self.settings.delivery,
            batch,
            self.deps.logger.as_deref(),
        )
        .await?;

        if let Some(logger) = self.deps.logger.as_ref() {
            logger.debug(
                "agent.report.delivered",
                "Batch delivered",
                Some(log_fields([
                    ("metrics", size.into()),
                    ("target", role.to_string().into()),
                ])),
            );
        }
        Ok(role)
    }

    /// Run the sampling and reporting clocks until `ctx` is cancelled.
    ///
    /// Report failures are logged and the next tick tries again.
    pub async fn run(&self, ctx: &RequestContext) {
        tokio::join!(self.sampling_loop(ctx), self.reporting_loop(ctx));
    }

    async fn sampling_loop(&self, ctx: &RequestContext) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = ctx.cancelled() => return,
                _ = ticker.tick() => self.sample_once().await,
            }
        }
    }

    async fn reporting_loop(&self, ctx: &RequestContext) {
        let mut ticker = tokio::time::interval(self.settings.report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = ctx.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(error) = self.report_once(ctx).await {
                        if error.is_cancelled() {
                            return;
                        }
                        if let Some(logger) = self.deps.logger.as_ref() {
                            logger.failure(LogLevel::Error, "agent.report.failed", &error, None);
                        }
                    }
                }
            }
        }
    }
}
