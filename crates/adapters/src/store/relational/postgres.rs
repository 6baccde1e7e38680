use super::{CREATE_TABLE, StoredValue, batch_value, database_error, seed_rows};
use metricity_domain::{Metric, MetricKind, accumulate};
use metricity_shared::{ErrorEnvelope, Result};
use sqlx::{Postgres, Row};

const SEED: &str = "INSERT INTO metrics (metric_id, kind, counter, gauge) VALUES ($1, $2, $3, $4)
    ON CONFLICT (metric_id, kind) DO NOTHING";
const UPSERT_GAUGE: &str = "INSERT INTO metrics (metric_id, kind, gauge) VALUES ($1, 'gauge', $2)
    ON CONFLICT (metric_id, kind) DO UPDATE SET gauge = EXCLUDED.gauge";
const UPSERT_COUNTER: &str = "INSERT INTO metrics (metric_id, kind, counter) VALUES ($1, 'counter', $2)
    ON CONFLICT (metric_id, kind) DO UPDATE SET counter = EXCLUDED.counter";
const SELECT_COUNTER: &str = "SELECT counter FROM metrics WHERE metric_id = $1 AND kind = 'counter'";

#[derive(Debug)]
pub(super) struct PostgresMetrics {
    pool: sqlx::Pool<Postgres>,
}

impl PostgresMetrics {
    pub(super) async fn connect(dsn: &str) -> Result<Self> {
        let pool = sqlx::Pool::<Postgres>::connect(dsn)
            .await
            .map_err(|error| pg_error("postgres connect failed", &error))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|error| pg_error("postgres schema failed", &error))?;

        for (id, value) in seed_rows() {
            let (kind, counter, gauge) = match value {
                StoredValue::Counter(total) => (MetricKind::Counter, Some(total), None),
                StoredValue::Gauge(value) => (MetricKind::Gauge, None, Some(value)),
            };
            sqlx::query(SEED)
                .bind(&*id)
                .bind(kind.as_str())
                .bind(counter)
                .bind(gauge)
                .execute(&self.pool)
                .await
                .map_err(|error| pg_error("postgres seed failed", &error))?;
        }
        Ok(())
    }

    pub(super) async fn set_gauge(&self, id: &str, value: f64) -> Result<()> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM metrics WHERE metric_id = $1 AND kind = 'gauge'",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| pg_error("postgres existence check failed", &error))?;

        let statement = if exists > 0 {
            "UPDATE metrics SET gauge = $2 WHERE metric_id = $1 AND kind = 'gauge'"
        } else {
            "INSERT INTO metrics (metric_id, kind, gauge) VALUES ($1, 'gauge', $2)"
        };
        sqlx::query(statement)
            .bind(id)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|error| pg_error("postgres gauge write failed", &error))?;
        Ok(())
    }

    pub(super) async fn add_counter(&self, id: &str, delta: i64) -> Result<i64> {
        let current: Option<Option<i64>> = sqlx::query_scalar(SELECT_COUNTER)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| pg_error("postgres counter read failed", &error))?;

        let total = accumulate(id, current.flatten().unwrap_or_default(), delta)?;
        let statement = if current.is_some() {
            "UPDATE metrics SET counter = $2 WHERE metric_id = $1 AND kind = 'counter'"
        } else {
            "INSERT INTO metrics (metric_id, kind, counter) VALUES ($1, 'counter', $2)"
        };
        sqlx::query(statement)
            .bind(id)
            .bind(total)
            .execute(&self.pool)
            .await
            .map_err(|error| pg_error("postgres counter write failed", &error))?;
        Ok(total)
    }

    pub(super) async fn apply_batch(&self, metrics: &[Metric]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| pg_error("postgres begin failed", &error))?;

        for metric in metrics {
            let id: &str = &metric.id;
            let value = match batch_value(metric) {
                Ok(value) => value,
                Err(error) => {
                    rollback(tx).await;
                    return Err(error);
                },
            };
            let written = match value {
                StoredValue::Gauge(value) => {
                    sqlx::query(UPSERT_GAUGE).bind(id).bind(value).execute(&mut *tx).await
                },
                StoredValue::Counter(delta) => {
                    let current = sqlx::query_scalar::<_, Option<i64>>(SELECT_COUNTER)
                        .bind(id)
                        .fetch_optional(&mut *tx)
                        .await;
                    let current = match current {
                        Ok(current) => current.flatten().unwrap_or_default(),
                        Err(error) => {
                            rollback(tx).await;
                            return Err(pg_error("postgres counter read failed", &error));
                        },
                    };
                    let total = match accumulate(id, current, delta) {
                        Ok(total) => total,
                        Err(error) => {
                            rollback(tx).await;
                            return Err(error.into());
                        },
                    };
                    sqlx::query(UPSERT_COUNTER).bind(id).bind(total).execute(&mut *tx).await
                },
            };
            if let Err(error) = written {
                rollback(tx).await;
                return Err(pg_error("postgres batch upsert failed", &error).with_metadata("id", id));
            }
        }

        tx.commit()
            .await
            .map_err(|error| pg_error("postgres commit failed", &error))
    }

    pub(super) async fn get(&self, kind: MetricKind, id: &str) -> Result<Option<StoredValue>> {
        let row = sqlx::query(
            "SELECT counter, gauge FROM metrics WHERE metric_id = $1 AND kind = $2",
        )
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| pg_error("postgres read failed", &error))?;

        row.map(|row| stored_value(kind, &row)).transpose()
    }

    pub(super) async fn all(&self, kind: MetricKind) -> Result<Vec<Metric>> {
        let rows = sqlx::query("SELECT metric_id, counter, gauge FROM metrics WHERE kind = $1")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| pg_error("postgres scan failed", &error))?;

        rows.iter()
            .map(|row| {
                let id: String = row
                    .try_get("metric_id")
                    .map_err(|error| pg_error("postgres decode failed", &error))?;
                Ok(stored_value(kind, row)?.into_metric(id))
            })
            .collect()
    }

    pub(super) async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|error| pg_error("postgres ping failed", &error))
    }
}

fn stored_value(kind: MetricKind, row: &sqlx::postgres::PgRow) -> Result<StoredValue> {
    let value = match kind {
        MetricKind::Counter => row
            .try_get::<Option<i64>, _>("counter")
            .map(|total| StoredValue::Counter(total.unwrap_or_default())),
        MetricKind::Gauge => row
            .try_get::<Option<f64>, _>("gauge")
            .map(|value| StoredValue::Gauge(value.unwrap_or_default())),
    };
    value.map_err(|error| pg_error("postgres decode failed", &error))
}

async fn rollback(tx: sqlx::Transaction<'_, Postgres>) {
    // A failed rollback is discarded along with the connection.
    let _ = tx.rollback().await;
}

fn pg_error(context: &str, error: &sqlx::Error) -> ErrorEnvelope {
    database_error(&format!("{context}: {error}"))
}
