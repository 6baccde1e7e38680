//! JSON snapshot file backing the file store and the durability bridge.
//!
//! The file holds one pretty-printed JSON array of metrics. Every save
//! rewrites it completely while holding an exclusive OS lock.

use fs2::FileExt;
use metricity_domain::{Metric, decode_batch};
use metricity_ports::{BoxFuture, SnapshotStore, StoreError};
use metricity_shared::{ErrorEnvelope, RequestContext, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

/// Snapshot file at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshot {
    path: Arc<Path>,
    interval: Duration,
    gate: Arc<Mutex<()>>,
}

impl JsonFileSnapshot {
    /// Open (creating if absent) the snapshot file.
    ///
    /// A zero `interval` turns on write-through persistence.
    pub fn open(path: impl Into<PathBuf>, interval: Duration) -> Result<Self> {
        let path: PathBuf = path.into();
        open_file(&path)?;
        Ok(Self {
            path: Arc::from(path),
            interval,
            gate: Arc::new(Mutex::new(())),
        })
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Vec<Metric>> {
        let path = Arc::clone(&self.path);
        spawn_blocking(move || read_metrics(&path))
            .await
            .map_err(|error| persistence_error(&format!("snapshot task failed: {error}")))?
    }

    async fn write(&self, metrics: Vec<Metric>) -> Result<()> {
        let path = Arc::clone(&self.path);
        spawn_blocking(move || write_metrics(&path, &metrics))
            .await
            .map_err(|error| persistence_error(&format!("snapshot task failed: {error}")))?
    }
}

impl SnapshotStore for JsonFileSnapshot {
    fn sync_on_write(&self) -> bool {
        self.interval.is_zero()
    }

    fn load(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("snapshot.load")?;
            let _guard = self.gate.lock().await;
            self.read().await
        })
    }

    fn save_all(&self, _ctx: &RequestContext, metrics: Vec<Metric>) -> BoxFuture<'_, Result<()>> {
        // Saves run during shutdown too, so they ignore cancellation.
        Box::pin(async move {
            let _guard = self.gate.lock().await;
            self.write(metrics).await
        })
    }

    fn save_one(&self, _ctx: &RequestContext, metric: Metric) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let _guard = self.gate.lock().await;
            let mut metrics = self.read().await?;
            match metrics
                .iter_mut()
                .find(|stored| stored.id == metric.id && stored.kind == metric.kind)
            {
                Some(stored) => *stored = metric,
                None => metrics.push(metric),
            }
            self.write(metrics).await
        })
    }
}

fn open_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|error| io_error(path, "mkdir", &error))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|error| io_error(path, "open", &error))
}

fn read_metrics(path: &Path) -> Result<Vec<Metric>> {
    let mut file = open_file(path)?;
    FileExt::lock_shared(&file).map_err(|error| io_error(path, "lock", &error))?;
    let mut contents = Vec::new();
    let read = file.read_to_end(&mut contents);
    let _ = FileExt::unlock(&file);
    read.map_err(|error| io_error(path, "read", &error))?;

    if contents.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    decode_batch(&contents)
        .map_err(|error| persistence_error(&format!("snapshot decode failed: {error}")))
}

fn write_metrics(path: &Path, metrics: &[Metric]) -> Result<()> {
    let encoded = encode_pretty(metrics)?;
    let mut file = open_file(path)?;
    FileExt::lock_exclusive(&file).map_err(|error| io_error(path, "lock", &error))?;
    let written = truncate_and_write(&mut file, &encoded);
    let _ = FileExt::unlock(&file);
    written.map_err(|error| io_error(path, "write", &error))
}

fn truncate_and_write(file: &mut File, contents: &[u8]) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(contents)?;
    file.sync_all()
}

fn encode_pretty(metrics: &[Metric]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    metrics
        .serialize(&mut serializer)
        .map_err(|error| persistence_error(&format!("snapshot encode failed: {error}")))?;
    Ok(buffer)
}

fn io_error(path: &Path, step: &str, error: &std::io::Error) -> ErrorEnvelope {
    persistence_error(&format!("snapshot {step} failed: {error}"))
        .with_metadata("path", path.display().to_string())
}

fn persistence_error(message: &str) -> ErrorEnvelope {
    StoreError::persistence(message).into()
}
