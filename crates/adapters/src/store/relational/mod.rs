//! SQL-backed metric store.
//!
//! One `metrics` table keyed by `(metric_id, kind)`. Each namespace has its
//! own reader/writer lock held across the whole statement sequence, so the
//! check-then-write single updates never race on the same id.

#[cfg(feature = "store-postgres")]
mod postgres;
mod sqlite;

use metricity_domain::{Metric, MetricKind, format_gauge, parse_counter, parse_gauge, seed_metrics};
use metricity_ports::{BoxFuture, MetricStore, StoreError, StoreVariant};
use metricity_shared::{ErrorEnvelope, RequestContext, Result, SecretString};
use tokio::sync::RwLock;

pub(super) const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS metrics (
    metric_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    counter BIGINT NULL,
    gauge DOUBLE PRECISION NULL,
    PRIMARY KEY (metric_id, kind)
)";

/// Stored value of a metric row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum StoredValue {
    Counter(i64),
    Gauge(f64),
}

impl StoredValue {
    fn into_metric(self, id: String) -> Metric {
        match self {
            Self::Counter(total) => Metric::counter(id, total),
            Self::Gauge(value) => Metric::gauge(id, value),
        }
    }

    fn render(self) -> String {
        match self {
            Self::Counter(total) => total.to_string(),
            Self::Gauge(value) => format_gauge(value),
        }
    }
}

enum Backend {
    Sqlite(sqlite::SqliteMetrics),
    #[cfg(feature = "store-postgres")]
    Postgres(postgres::PostgresMetrics),
}

impl Backend {
    async fn set_gauge(&self, id: String, value: f64) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.set_gauge(id, value).await,
            #[cfg(feature = "store-postgres")]
            Self::Postgres(db) => db.set_gauge(&id, value).await,
        }
    }

    async fn add_counter(&self, id: String, delta: i64) -> Result<i64> {
        match self {
            Self::Sqlite(db) => db.add_counter(id, delta).await,
            #[cfg(feature = "store-postgres")]
            Self::Postgres(db) => db.add_counter(&id, delta).await,
        }
    }

    async fn apply_batch(&self, metrics: Vec<Metric>) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.apply_batch(metrics).await,
            #[cfg(feature = "store-postgres")]
            Self::Postgres(db) => db.apply_batch(&metrics).await,
        }
    }

    async fn get(&self, kind: MetricKind, id: String) -> Result<Option<StoredValue>> {
        match self {
            Self::Sqlite(db) => db.get(kind, id).await,
            #[cfg(feature = "store-postgres")]
            Self::Postgres(db) => db.get(kind, &id).await,
        }
    }

    async fn all(&self, kind: MetricKind) -> Result<Vec<Metric>> {
        match self {
            Self::Sqlite(db) => db.all(kind).await,
            #[cfg(feature = "store-postgres")]
            Self::Postgres(db) => db.all(kind).await,
        }
    }

    async fn ping(&self) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.ping().await,
            #[cfg(feature = "store-postgres")]
            Self::Postgres(db) => db.ping().await,
        }
    }
}

/// Metric store persisted in SQLite or PostgreSQL.
pub struct RelationalStore {
    backend: Backend,
    counters: RwLock<()>,
    gauges: RwLock<()>,
}

impl RelationalStore {
    /// Connect using `dsn`, create the table if needed and seed the known ids.
    ///
    /// `sqlite::memory:`, `sqlite://<path>` and `sqlite:<path>` open SQLite;
    /// `postgres://` and `postgresql://` open PostgreSQL when the
    /// `store-postgres` feature is on.
    pub async fn connect(dsn: &SecretString) -> Result<Self> {
        let dsn = dsn.expose();
        let backend = if let Some(location) = dsn.strip_prefix("sqlite:") {
            Backend::Sqlite(sqlite::SqliteMetrics::open(location).await?)
        } else if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
            connect_postgres(dsn).await?
        } else {
            return Err(database_error("unsupported database DSN scheme"));
        };

        Ok(Self {
            backend,
            counters: RwLock::new(()),
            gauges: RwLock::new(()),
        })
    }
}

#[cfg(feature = "store-postgres")]
async fn connect_postgres(dsn: &str) -> Result<Backend> {
    Ok(Backend::Postgres(postgres::PostgresMetrics::connect(dsn).await?))
}

#[cfg(not(feature = "store-postgres"))]
async fn connect_postgres(_dsn: &str) -> Result<Backend> {
    Err(database_error("postgres store not enabled"))
}

impl MetricStore for RelationalStore {
    fn variant(&self) -> StoreVariant {
        StoreVariant::Relational
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
            let value = parse_gauge(&id, &raw)?;
            let _guard = self.gauges.write().await;
            self.backend.set_gauge(id.into(), value).await
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
            let delta = parse_counter(&id, &raw)?;
            let _guard = self.counters.write().await;
            self.backend.add_counter(id.into(), delta).await
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
            let _counters = self.counters.write().await;
            let _gauges = self.gauges.write().await;
            self.backend.apply_batch(metrics).await
        })
    }

    fn get_gauge(&self, ctx: &RequestContext, id: Box<str>) -> BoxFuture<'_, Result<String>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.get_gauge")?;
            let _guard = self.gauges.read().await;
            self.read_one(MetricKind::Gauge, id).await
        })
    }

    fn get_counter(&self, ctx: &RequestContext, id: Box<str>) -> BoxFuture<'_, Result<String>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.get_counter")?;
            let _guard = self.counters.read().await;
            self.read_one(MetricKind::Counter, id).await
        })
    }

    fn all_gauges(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.all_gauges")?;
            let _guard = self.gauges.read().await;
            self.backend.all(MetricKind::Gauge).await
        })
    }

    fn all_counters(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.all_counters")?;
            let _guard = self.counters.read().await;
            self.backend.all(MetricKind::Counter).await
        })
    }

    fn ping(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.ping")?;
            self.backend.ping().await
        })
    }
}

impl RelationalStore {
    async fn read_one(&self, kind: MetricKind, id: Box<str>) -> Result<String> {
        let id = String::from(id);
        match self.backend.get(kind, id.clone()).await? {
            Some(value) => Ok(value.render()),
            None => Err(StoreError::not_found(kind, id).into()),
        }
    }
}

/// Seed rows inserted on startup; existing rows are left untouched.
pub(super) fn seed_rows() -> impl Iterator<Item = (Box<str>, StoredValue)> {
    seed_metrics().into_iter().map(|metric| {
        let value = match metric.kind {
            MetricKind::Counter => StoredValue::Counter(metric.delta.unwrap_or_default()),
            MetricKind::Gauge => StoredValue::Gauge(metric.value.unwrap_or_default()),
        };
        (metric.id, value)
    })
}

/// Split a validated update into its stored form.
pub(super) fn batch_value(metric: &Metric) -> Result<StoredValue> {
    metric.validate_for_update()?;
    match (metric.kind, metric.delta, metric.value) {
        (MetricKind::Counter, Some(delta), _) => Ok(StoredValue::Counter(delta)),
        (MetricKind::Gauge, _, Some(value)) => Ok(StoredValue::Gauge(value)),
        _ => Err(database_error("metric carries no value")),
    }
}

pub(super) fn database_error(message: &str) -> ErrorEnvelope {
    StoreError::database(message).into()
}
