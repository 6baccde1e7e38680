use super::{CREATE_TABLE, StoredValue, batch_value, database_error, seed_rows};
use metricity_domain::{Metric, MetricKind, accumulate};
use metricity_shared::{ErrorEnvelope, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task::spawn_blocking;

const SEED: &str = "INSERT INTO metrics (metric_id, kind, counter, gauge) VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT (metric_id, kind) DO NOTHING";
const UPSERT_GAUGE: &str = "INSERT INTO metrics (metric_id, kind, gauge) VALUES (?1, 'gauge', ?2)
    ON CONFLICT (metric_id, kind) DO UPDATE SET gauge = excluded.gauge";
const UPSERT_COUNTER: &str = "INSERT INTO metrics (metric_id, kind, counter) VALUES (?1, 'counter', ?2)
    ON CONFLICT (metric_id, kind) DO UPDATE SET counter = excluded.counter";
const SELECT_COUNTER: &str = "SELECT counter FROM metrics WHERE metric_id = ?1 AND kind = 'counter'";

/// SQLite connection shared by blocking tasks.
#[derive(Debug, Clone)]
pub(super) struct SqliteMetrics {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetrics {
    pub(super) async fn open(location: &str) -> Result<Self> {
        let location = location.trim_start_matches("//").to_owned();
        let conn = spawn_blocking(move || open_connection(&location))
            .await
            .map_err(|error| database_error(&format!("sqlite open task failed: {error}")))??;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| database_error("sqlite connection lock poisoned"))?;
            op(&mut guard)
        })
        .await
        .map_err(|error| database_error(&format!("sqlite task failed: {error}")))?
    }

    pub(super) async fn set_gauge(&self, id: String, value: f64) -> Result<()> {
        self.run(move |conn| {
            let exists = row_exists(conn, &id, MetricKind::Gauge)?;
            let statement = if exists {
                "UPDATE metrics SET gauge = ?2 WHERE metric_id = ?1 AND kind = 'gauge'"
            } else {
                "INSERT INTO metrics (metric_id, kind, gauge) VALUES (?1, 'gauge', ?2)"
            };
            conn.execute(statement, params![id, value])
                .map_err(|error| sql_error("sqlite gauge write failed", &error))?;
            Ok(())
        })
        .await
    }

    pub(super) async fn add_counter(&self, id: String, delta: i64) -> Result<i64> {
        self.run(move |conn| {
            let current: Option<Option<i64>> = conn
                .query_row(SELECT_COUNTER, [&id], |row| row.get(0))
                .optional()
                .map_err(|error| sql_error("sqlite counter read failed", &error))?;

            let total = accumulate(&id, current.flatten().unwrap_or_default(), delta)?;
            let statement = if current.is_some() {
                "UPDATE metrics SET counter = ?2 WHERE metric_id = ?1 AND kind = 'counter'"
            } else {
                "INSERT INTO metrics (metric_id, kind, counter) VALUES (?1, 'counter', ?2)"
            };
            conn.execute(statement, params![id, total])
                .map_err(|error| sql_error("sqlite counter write failed", &error))?;
            Ok(total)
        })
        .await
    }

    pub(super) async fn apply_batch(&self, metrics: Vec<Metric>) -> Result<()> {
        self.run(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|error| sql_error("sqlite begin failed", &error))?;
            // Returning early drops `tx`, which rolls the transaction back.
            {
                let mut read_counter = tx
                    .prepare_cached(SELECT_COUNTER)
                    .map_err(|error| sql_error("sqlite prepare failed", &error))?;
                let mut upsert_counter = tx
                    .prepare_cached(UPSERT_COUNTER)
                    .map_err(|error| sql_error("sqlite prepare failed", &error))?;
                let mut upsert_gauge = tx
                    .prepare_cached(UPSERT_GAUGE)
                    .map_err(|error| sql_error("sqlite prepare failed", &error))?;

                for metric in &metrics {
                    let id: &str = &metric.id;
                    let written = match batch_value(metric)? {
                        StoredValue::Gauge(value) => upsert_gauge.execute(params![id, value]),
                        StoredValue::Counter(delta) => {
                            let current: Option<Option<i64>> = read_counter
                                .query_row([id], |row| row.get(0))
                                .optional()
                                .map_err(|error| sql_error("sqlite counter read failed", &error))?;
                            let total = accumulate(id, current.flatten().unwrap_or_default(), delta)?;
                            upsert_counter.execute(params![id, total])
                        },
                    };
                    written.map_err(|error| {
                        sql_error("sqlite batch upsert failed", &error).with_metadata("id", id)
                    })?;
                }
            }
            tx.commit()
                .map_err(|error| sql_error("sqlite commit failed", &error))
        })
        .await
    }

    pub(super) async fn get(&self, kind: MetricKind, id: String) -> Result<Option<StoredValue>> {
        self.run(move |conn| {
            let value = match kind {
                MetricKind::Counter => conn
                    .query_row(
                        "SELECT counter FROM metrics WHERE metric_id = ?1 AND kind = 'counter'",
                        [&id],
                        |row| row.get::<_, Option<i64>>(0),
                    )
                    .optional()
                    .map(|row| row.map(|total| StoredValue::Counter(total.unwrap_or_default()))),
                MetricKind::Gauge => conn
                    .query_row(
                        "SELECT gauge FROM metrics WHERE metric_id = ?1 AND kind = 'gauge'",
                        [&id],
                        |row| row.get::<_, Option<f64>>(0),
                    )
                    .optional()
                    .map(|row| row.map(|value| StoredValue::Gauge(value.unwrap_or_default()))),
            };
            value.map_err(|error| sql_error("sqlite read failed", &error))
        })
        .await
    }

    pub(super) async fn all(&self, kind: MetricKind) -> Result<Vec<Metric>> {
        self.run(move |conn| {
            let mut statement = conn
                .prepare("SELECT metric_id, counter, gauge FROM metrics WHERE kind = ?1")
                .map_err(|error| sql_error("sqlite scan prepare failed", &error))?;
            let rows = statement
                .query_map([kind.as_str()], |row| {
                    let id: String = row.get(0)?;
                    let counter: Option<i64> = row.get(1)?;
                    let gauge: Option<f64> = row.get(2)?;
                    Ok((id, counter, gauge))
                })
                .map_err(|error| sql_error("sqlite scan failed", &error))?;

            let mut metrics = Vec::new();
            for row in rows {
                let (id, counter, gauge) =
                    row.map_err(|error| sql_error("sqlite scan row failed", &error))?;
                let value = match kind {
                    MetricKind::Counter => StoredValue::Counter(counter.unwrap_or_default()),
                    MetricKind::Gauge => StoredValue::Gauge(gauge.unwrap_or_default()),
                };
                metrics.push(value.into_metric(id));
            }
            Ok(metrics)
        })
        .await
    }

    pub(super) async fn ping(&self) -> Result<()> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(|error| sql_error("sqlite ping failed", &error))
        })
        .await
    }
}

fn open_connection(location: &str) -> Result<Connection> {
    let conn = if location.is_empty() || location == ":memory:" {
        Connection::open_in_memory()
    } else {
        let path = Path::new(location);
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|error| database_error(&format!("sqlite mkdir failed: {error}")))?;
        }
        Connection::open(path)
    }
    .map_err(|error| sql_error("sqlite open failed", &error))?;

    conn.execute_batch(CREATE_TABLE)
        .map_err(|error| sql_error("sqlite schema failed", &error))?;
    for (id, value) in seed_rows() {
        let (kind, counter, gauge) = match value {
            StoredValue::Counter(total) => (MetricKind::Counter, Some(total), None),
            StoredValue::Gauge(value) => (MetricKind::Gauge, None, Some(value)),
        };
        conn.execute(SEED, params![&*id, kind.as_str(), counter, gauge])
            .map_err(|error| sql_error("sqlite seed failed", &error))?;
    }
    Ok(conn)
}

fn row_exists(conn: &Connection, id: &str, kind: MetricKind) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM metrics WHERE metric_id = ?1 AND kind = ?2",
            params![id, kind.as_str()],
            |row| row.get(0),
        )
        .map_err(|error| sql_error("sqlite existence check failed", &error))?;
    Ok(count > 0)
}

fn sql_error(context: &str, error: &rusqlite::Error) -> ErrorEnvelope {
    database_error(&format!("{context}: {error}"))
}
